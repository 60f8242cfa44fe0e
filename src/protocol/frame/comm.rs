use super::{
    super::error::{Error, ErrorCode, Result},
    be,
    types::S7PduType,
};
use bytes::BufMut;

/// S7 protocol id byte
pub const S7_PROTOCOL_ID: u8 = 0x32;

/// S7 Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S7Header {
    pub protocol_id: u8,
    pub pdu_type: S7PduType,
    pub reserved: u16,
    pub pdu_ref: u16,
    pub param_len: u16,
    pub payload_len: u16,
    /// Error class/code, present only on Ack/AckData
    pub error_code: Option<ErrorCode>,
}

impl S7Header {
    /// Fresh header of the given kind with empty regions.
    pub fn new(pdu_type: S7PduType, pdu_ref: u16) -> Self {
        Self {
            protocol_id: S7_PROTOCOL_ID,
            pdu_type,
            reserved: 0,
            pdu_ref,
            param_len: 0,
            payload_len: 0,
            error_code: pdu_type.is_response().then_some(ErrorCode::Success),
        }
    }

    #[inline]
    pub fn encoded_len(&self) -> usize {
        self.pdu_type.header_len()
    }

    /// Parse an S7 header. Ack/AckData consume the 2-byte error field as well.
    pub fn parse(input: &[u8]) -> Result<(S7Header, &[u8])> {
        if input.len() < 10 {
            return Err(Error::InsufficientData {
                needed: 10,
                available: input.len(),
            });
        }
        if input[0] != S7_PROTOCOL_ID {
            return Err(Error::ErrInvalidFrame);
        }
        let pdu_type = S7PduType::try_from(input[1]).map_err(|_| Error::ErrInvalidFrame)?;
        let header_len = pdu_type.header_len();
        let error_code = if pdu_type.is_response() {
            Some(ErrorCode::from(be::get_u16(input, 10)?))
        } else {
            None
        };
        Ok((
            S7Header {
                protocol_id: input[0],
                pdu_type,
                reserved: be::get_u16(input, 2)?,
                pdu_ref: be::get_u16(input, 4)?,
                param_len: be::get_u16(input, 6)?,
                payload_len: be::get_u16(input, 8)?,
                error_code,
            },
            &input[header_len..],
        ))
    }

    pub fn encode_to<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(self.protocol_id);
        dst.put_u8(self.pdu_type as u8);
        dst.put_u16(self.reserved);
        dst.put_u16(self.pdu_ref);
        dst.put_u16(self.param_len);
        dst.put_u16(self.payload_len);
        if self.pdu_type.is_response() {
            dst.put_u16(self.error_code.map_or(0, u16::from));
        }
    }
}
