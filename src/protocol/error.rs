use super::frame::S7ReturnCode;
use std::{fmt, result::Result as StdResult};
use thiserror::Error as ThisError;

/// Unified S7 result type
pub type Result<T> = StdResult<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect timeout")]
    ErrConnectTimeout,

    #[error("request timeout")]
    ErrRequestTimeout,

    #[error("invalid frame")]
    ErrInvalidFrame,

    /// The response answered a different function than the request asked for.
    /// The stream is out of step with our requests and must be re-established.
    #[error("unexpected function: expected {expected:#04x}, got {actual:#04x}")]
    ErrUnexpectedFunction { expected: u8, actual: u8 },

    #[error("unexpected PDU")]
    ErrUnexpectedPdu,

    #[error("invalid address: {0}")]
    ErrInvalidAddress(String),

    #[error("can not use closed connection")]
    ErrUseClosedConnection,

    #[error("device is not connected")]
    ErrNotConnected,

    #[error("invalid configuration for: {0}")]
    InvalidConfiguration(&'static str),

    /// Protocol contract violated (e.g., reserved/invalid field values)
    #[error("protocol violation: {context}")]
    ProtocolViolation { context: &'static str },

    /// Input does not have enough bytes to complete the operation
    #[error("insufficient data: needed {needed} bytes, available {available} bytes")]
    InsufficientData { needed: usize, available: usize },

    #[error("response carries {received} bytes but {requested} were requested")]
    ResponseTooLong { requested: usize, received: usize },

    /// Header-level error reported by the PLC in an Ack/AckData PDU.
    #[allow(clippy::enum_variant_names)]
    #[error("S7 error: {code}")]
    S7Error { code: ErrorCode },

    /// Item-level return code other than success.
    #[error("item error: {code:?}")]
    ItemError { code: S7ReturnCode },

    /// TSAP-specific: Rack value is out of allowed range (0..=7)
    #[error("Rack value {0} is out of range (0..=7)")]
    InvalidRack(u8),

    /// TSAP-specific: Slot value is out of allowed range (0..=31)
    #[error("Slot value {0} is out of range (0..=31)")]
    InvalidSlot(u8),

    #[error("device task has shut down")]
    DeviceClosed,
}

/// Coarse error taxonomy used by the device to decide between retrying,
/// reconnecting and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Socket level failure; the attempt is lost and the link is re-established.
    Transport,
    /// The byte stream no longer lines up with our requests.
    Desync,
    /// The PLC rejected the request; the link stays up.
    Plc,
    /// Bad address or configuration; never retried.
    Config,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Io(_)
            | Error::ErrConnectTimeout
            | Error::ErrRequestTimeout
            | Error::ErrUseClosedConnection
            | Error::ErrNotConnected
            | Error::DeviceClosed => ErrorClass::Transport,
            Error::ErrInvalidFrame
            | Error::ErrUnexpectedFunction { .. }
            | Error::ErrUnexpectedPdu
            | Error::ProtocolViolation { .. }
            | Error::InsufficientData { .. }
            | Error::ResponseTooLong { .. } => ErrorClass::Desync,
            Error::S7Error { .. } | Error::ItemError { .. } => ErrorClass::Plc,
            Error::ErrInvalidAddress(_)
            | Error::InvalidConfiguration(_)
            | Error::InvalidRack(_)
            | Error::InvalidSlot(_) => ErrorClass::Config,
        }
    }

    /// Transport and desynchronization failures both invalidate the link.
    #[inline]
    pub fn requires_reconnect(&self) -> bool {
        matches!(self.class(), ErrorClass::Transport | ErrorClass::Desync)
    }

    #[inline]
    pub fn is_unexpected_function(&self) -> bool {
        matches!(self, Error::ErrUnexpectedFunction { .. })
    }
}

/// Error class/code pair carried in the Ack/AckData header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    /// Invalid block number
    InvalidBlockNumber,
    /// Invalid request length
    InvalidRequestLength,
    /// Invalid parameter
    InvalidParams,
    /// Invalid block type
    InvalidBlockType,
    /// Service cannot run while the object is in its current state
    ServiceNotAllowedInCurrentState,
    /// Service unknown to the remote module or malformed frame
    ServiceNotImplementedOrFrameError,
    /// Object type mismatch
    ObjectTypeMismatch,
    /// CPU resources exhausted or busy
    ResourcesInsufficientOrCpuBusy,
    /// Requested PDU size is not acceptable
    InvalidPduSize,
    /// Address is invalid for this CPU
    InvalidAddress,
    /// Requested system status list is not available
    SzlNotAvailable,
    Unknown(u16),
}

impl From<u16> for ErrorCode {
    fn from(value: u16) -> Self {
        match value {
            0x0000 => ErrorCode::Success,
            0x0110 => ErrorCode::InvalidBlockNumber,
            0x0111 => ErrorCode::InvalidRequestLength,
            0x0112 => ErrorCode::InvalidParams,
            0x0113 => ErrorCode::InvalidBlockType,
            0x8001 => ErrorCode::ServiceNotAllowedInCurrentState,
            0x8104 => ErrorCode::ServiceNotImplementedOrFrameError,
            0x8204 => ErrorCode::ObjectTypeMismatch,
            0x8302 => ErrorCode::ResourcesInsufficientOrCpuBusy,
            0x8500 => ErrorCode::InvalidPduSize,
            0x8702 => ErrorCode::InvalidAddress,
            0xD401 => ErrorCode::SzlNotAvailable,
            other => ErrorCode::Unknown(other),
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(value: ErrorCode) -> Self {
        match value {
            ErrorCode::Success => 0x0000,
            ErrorCode::InvalidBlockNumber => 0x0110,
            ErrorCode::InvalidRequestLength => 0x0111,
            ErrorCode::InvalidParams => 0x0112,
            ErrorCode::InvalidBlockType => 0x0113,
            ErrorCode::ServiceNotAllowedInCurrentState => 0x8001,
            ErrorCode::ServiceNotImplementedOrFrameError => 0x8104,
            ErrorCode::ObjectTypeMismatch => 0x8204,
            ErrorCode::ResourcesInsufficientOrCpuBusy => 0x8302,
            ErrorCode::InvalidPduSize => 0x8500,
            ErrorCode::InvalidAddress => 0x8702,
            ErrorCode::SzlNotAvailable => 0xD401,
            ErrorCode::Unknown(v) => v,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#06x})", self, u16::from(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_roundtrip_and_unknown() {
        for raw in [0x0000u16, 0x8104, 0x8500, 0xD401, 0x1234] {
            assert_eq!(u16::from(ErrorCode::from(raw)), raw);
        }
        assert_eq!(ErrorCode::from(0x1234), ErrorCode::Unknown(0x1234));
    }

    #[test]
    fn test_classification() {
        let io = Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert_eq!(io.class(), ErrorClass::Transport);
        assert!(io.requires_reconnect());

        let desync = Error::ErrUnexpectedFunction {
            expected: 0x04,
            actual: 0x05,
        };
        assert_eq!(desync.class(), ErrorClass::Desync);
        assert!(desync.is_unexpected_function());
        assert!(desync.requires_reconnect());

        let plc = Error::ItemError {
            code: S7ReturnCode::AddressOutOfRange,
        };
        assert_eq!(plc.class(), ErrorClass::Plc);
        assert!(!plc.requires_reconnect());

        let cfg = Error::ErrInvalidAddress("XY1".into());
        assert_eq!(cfg.class(), ErrorClass::Config);
        assert!(!cfg.requires_reconnect());
    }
}
