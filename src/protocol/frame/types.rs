/// COTP TPDU type values (subset)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CotpType {
    /// Connection Request
    Cr = 0xE0,
    /// Connection Confirm
    Cc = 0xD0,
    /// Disconnection Request
    Dr = 0x80,
    /// Data
    D = 0xF0,
}

impl TryFrom<u8> for CotpType {
    type Error = ();

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0xE0 => Ok(CotpType::Cr),
            0xD0 => Ok(CotpType::Cc),
            0x80 => Ok(CotpType::Dr),
            0xF0 => Ok(CotpType::D),
            _ => Err(()),
        }
    }
}

/// S7 PDU kinds (ROSCTR)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7PduType {
    Job = 0x01,
    Ack = 0x02,
    AckData = 0x03,
    UserData = 0x07,
}

impl S7PduType {
    /// Ack and AckData carry the extra 2-byte error field in the header.
    #[inline]
    pub fn is_response(self) -> bool {
        matches!(self, S7PduType::Ack | S7PduType::AckData)
    }

    #[inline]
    pub fn header_len(self) -> usize {
        if self.is_response() {
            12
        } else {
            10
        }
    }
}

impl TryFrom<u8> for S7PduType {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0x01 => Ok(S7PduType::Job),
            0x02 => Ok(S7PduType::Ack),
            0x03 => Ok(S7PduType::AckData),
            0x07 => Ok(S7PduType::UserData),
            _ => Err(()),
        }
    }
}

/// S7 Function codes used by this client
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7Function {
    ReadVar = 0x04,
    WriteVar = 0x05,
    SetupCommunication = 0xF0,
}

/// Variable specification syntax id
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7SyntaxId {
    /// Address data S7-Any pointer-like
    S7Any = 0x10,
}

/// S7 Memory/Area codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum S7Area {
    /// Inputs
    I = 0x81,
    /// Outputs
    O = 0x82,
    /// Merkers
    M = 0x83,
    /// Data Blocks (DB)
    DB = 0x84,
    /// Counters
    C = 0x1C,
    /// Timers
    T = 0x1D,
}

impl S7Area {
    /// Timers and counters are addressed by element number, not by bit offset.
    #[inline]
    pub fn is_timer_or_counter(self) -> bool {
        matches!(self, S7Area::T | S7Area::C)
    }
}

impl TryFrom<u8> for S7Area {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0x81 => Ok(S7Area::I),
            0x82 => Ok(S7Area::O),
            0x83 => Ok(S7Area::M),
            0x84 => Ok(S7Area::DB),
            0x1C => Ok(S7Area::C),
            0x1D => Ok(S7Area::T),
            _ => Err(()),
        }
    }
}

/// Transport size codes used in variable specifications
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7TransportSize {
    Bit = 0x01,
    Byte = 0x02,
    Word = 0x04,
    DWord = 0x06,
    Real = 0x08,
    Counter = 0x1C,
    Timer = 0x1D,
}

impl S7TransportSize {
    /// Bytes per element on the wire.
    #[inline]
    pub fn element_bytes(self) -> usize {
        match self {
            S7TransportSize::Bit | S7TransportSize::Byte => 1,
            S7TransportSize::Word | S7TransportSize::Counter | S7TransportSize::Timer => 2,
            S7TransportSize::DWord | S7TransportSize::Real => 4,
        }
    }

    /// Transport size to use for a byte-range request in `area`.
    #[inline]
    pub fn for_area(area: S7Area) -> Self {
        match area {
            S7Area::T => S7TransportSize::Timer,
            S7Area::C => S7TransportSize::Counter,
            _ => S7TransportSize::Byte,
        }
    }
}

impl TryFrom<u8> for S7TransportSize {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        use S7TransportSize::*;
        Ok(match v {
            0x01 => Bit,
            0x02 => Byte,
            0x04 => Word,
            0x06 => DWord,
            0x08 => Real,
            0x1C => Counter,
            0x1D => Timer,
            _ => Err(())?,
        })
    }
}

/// Return code present in AckData data items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7ReturnCode {
    Reserved,
    Success,
    HardwareFault,
    AccessDenied,
    AddressOutOfRange,
    DataTypeNotSupported,
    DataTypeInconsistent,
    ObjectDoesNotExist,
    ObjectNotAvailable,
    Unknown(u8),
}

impl From<u8> for S7ReturnCode {
    fn from(v: u8) -> Self {
        match v {
            0x00 => S7ReturnCode::Reserved,
            0xFF => S7ReturnCode::Success,
            0x01 => S7ReturnCode::HardwareFault,
            0x03 => S7ReturnCode::AccessDenied,
            0x05 => S7ReturnCode::AddressOutOfRange,
            0x06 => S7ReturnCode::DataTypeNotSupported,
            0x07 => S7ReturnCode::DataTypeInconsistent,
            0x0A => S7ReturnCode::ObjectDoesNotExist,
            0x0B => S7ReturnCode::ObjectNotAvailable,
            other => S7ReturnCode::Unknown(other),
        }
    }
}

impl From<S7ReturnCode> for u8 {
    fn from(value: S7ReturnCode) -> Self {
        match value {
            S7ReturnCode::Reserved => 0x00,
            S7ReturnCode::Success => 0xFF,
            S7ReturnCode::HardwareFault => 0x01,
            S7ReturnCode::AccessDenied => 0x03,
            S7ReturnCode::AddressOutOfRange => 0x05,
            S7ReturnCode::DataTypeNotSupported => 0x06,
            S7ReturnCode::DataTypeInconsistent => 0x07,
            S7ReturnCode::ObjectDoesNotExist => 0x0A,
            S7ReturnCode::ObjectNotAvailable => 0x0B,
            S7ReturnCode::Unknown(v) => v,
        }
    }
}

/// Data variable type carried in front of each data item
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7DataVariableType {
    /// No data
    Null = 0x00,
    /// Bit access, length field counts bits
    Bit = 0x03,
    /// Byte/Word/DWord access, length field counts bits
    ByteWordDWord = 0x04,
    /// Integer access, length field counts bits
    Integer = 0x05,
    /// Real access, length field counts bytes
    Real = 0x07,
    /// Octet string, length field counts bytes
    OctetString = 0x09,
}

impl S7DataVariableType {
    /// Convert the on-wire length field to a byte count.
    #[inline]
    pub fn data_len_in_bytes(self, len_field: u16) -> usize {
        match self {
            S7DataVariableType::Bit
            | S7DataVariableType::ByteWordDWord
            | S7DataVariableType::Integer => (len_field as usize).div_ceil(8),
            _ => len_field as usize,
        }
    }
}

impl TryFrom<u8> for S7DataVariableType {
    type Error = ();
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        Ok(match v {
            0x00 => S7DataVariableType::Null,
            0x03 => S7DataVariableType::Bit,
            0x04 => S7DataVariableType::ByteWordDWord,
            0x05 => S7DataVariableType::Integer,
            0x07 => S7DataVariableType::Real,
            0x09 => S7DataVariableType::OctetString,
            _ => Err(())?,
        })
    }
}

/// UserData function group (low nibble of the type/group byte)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuFunctionGroup {
    CpuFunctions = 0x04,
}

/// UserData function type (high nibble of the type/group byte)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuFunctionType {
    Request = 0x04,
    Response = 0x08,
}

/// UserData parameter method: first request of a chain
pub const USERDATA_METHOD_REQUEST: u8 = 0x11;
/// UserData parameter method: response or follow-up request
pub const USERDATA_METHOD_FOLLOWUP: u8 = 0x12;
/// CPU functions subfunction: read SZL
pub const SZL_SUBFUNCTION_READ: u8 = 0x01;
