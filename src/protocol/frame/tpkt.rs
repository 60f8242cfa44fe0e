use super::{
    super::error::{Error, Result},
    WireDecode, WireEncode,
};
use bytes::{BufMut, Bytes};

/// Version byte of RFC1006 TPKT
pub const TPKT_VERSION: u8 = 0x03;
/// TPKT header length
pub const TPKT_HEADER_LEN: usize = 4;

/// TPKT (RFC1006) header: 4 bytes
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Tpkt {
    /// Always 0x03 for RFC1006
    pub version: u8,
    /// Reserved, always 0x00
    pub reserved: u8,
    /// Total length including this 4-byte header
    pub length: u16,
}

impl Tpkt {
    /// Build a TPKT header from payload length (payload includes COTP bytes).
    pub fn with_payload_len(payload_len: usize) -> Self {
        let total = (TPKT_HEADER_LEN as u16).saturating_add(payload_len as u16);
        Self {
            version: TPKT_VERSION,
            reserved: 0x00,
            length: total,
        }
    }

    /// Encode only the TPKT header for a total frame length (header + payload).
    pub fn encode_header_to<B: BufMut>(total_len: usize, dst: &mut B) {
        dst.put_u8(TPKT_VERSION);
        dst.put_u8(0x00);
        dst.put_u16(total_len as u16);
    }

    /// Inspect a buffered prefix and report the full frame length once the
    /// header is available. `Ok(None)` means more bytes are needed.
    pub fn peek_frame_len(buf: &[u8]) -> Result<Option<usize>> {
        if buf.len() < TPKT_HEADER_LEN {
            return Ok(None);
        }
        if buf[0] != TPKT_VERSION || buf[1] != 0x00 {
            return Err(Error::ErrInvalidFrame);
        }
        let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        // a TPKT must at least carry the 3-byte COTP DT header or a CC
        if length < TPKT_HEADER_LEN + 2 {
            return Err(Error::ErrInvalidFrame);
        }
        Ok(Some(length))
    }
}

impl WireEncode for Tpkt {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        TPKT_HEADER_LEN
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        dst.put_u8(self.version);
        dst.put_u8(self.reserved);
        dst.put_u16(self.length);
        Ok(())
    }
}

impl WireDecode for Tpkt {
    type Error = Error;
    type Context = ();

    fn parse<'a>(
        input: &'a [u8],
        _parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        let length = match Tpkt::peek_frame_len(input)? {
            Some(l) => l,
            None => {
                return Err(Error::InsufficientData {
                    needed: TPKT_HEADER_LEN,
                    available: input.len(),
                })
            }
        };
        if length > input.len() {
            return Err(Error::InsufficientData {
                needed: length,
                available: input.len(),
            });
        }
        Ok((
            &input[TPKT_HEADER_LEN..],
            Tpkt {
                version: input[0],
                reserved: input[1],
                length: length as u16,
            },
        ))
    }
}
