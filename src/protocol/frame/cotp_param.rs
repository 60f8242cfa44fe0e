use super::super::error::{Error, Result};
use super::WireEncode;
use bytes::BufMut;

/// TLV code: TPDU size (2^n)
pub const PARAM_TPDU_SIZE: u8 = 0xC0;
/// TLV code: calling (source) TSAP
pub const PARAM_SRC_TSAP: u8 = 0xC1;
/// TLV code: called (destination) TSAP
pub const PARAM_DST_TSAP: u8 = 0xC2;

/// TPDU size code for 1024 byte TPDUs
pub const TPDU_SIZE_1024: u8 = 0x0A;
/// TPDU size code for 512 byte TPDUs
pub const TPDU_SIZE_512: u8 = 0x09;

/// COTP Connection Request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CotpCrParams {
    pub dst_ref: u16,
    pub src_ref: u16,
    /// Class/option byte; class 0 without options for ISO-on-TCP
    pub class_option: u8,
    /// TPDU Size (2^n bytes)
    pub tpdu_size: u8,
    /// Source (local) TSAP
    pub src_tsap: u16,
    /// Destination (remote) TSAP
    pub dst_tsap: u16,
}

impl Default for CotpCrParams {
    fn default() -> Self {
        Self {
            dst_ref: 0x0000,
            src_ref: 0x0001,
            class_option: 0x00,
            tpdu_size: TPDU_SIZE_1024,
            src_tsap: 0x0100,
            dst_tsap: 0x0102,
        }
    }
}

impl CotpCrParams {
    /// Fixed request used by CP243 Ethernet modules: both TSAPs are "MW"
    /// and the TPDU size is limited to 512 bytes.
    pub fn cp243() -> Self {
        Self {
            tpdu_size: TPDU_SIZE_512,
            src_tsap: 0x4D57,
            dst_tsap: 0x4D57,
            ..Default::default()
        }
    }

    pub fn tpdu_size_bytes(&self) -> Option<usize> {
        tpdu_size_bytes_from_code(self.tpdu_size)
    }

    pub fn parse_body(body: &[u8]) -> Result<Self> {
        if body.len() < 5 {
            return Err(Error::ErrInvalidFrame);
        }
        let params = parse_connection_params(&body[5..])?;
        Ok(CotpCrParams {
            dst_ref: u16::from_be_bytes([body[0], body[1]]),
            src_ref: u16::from_be_bytes([body[2], body[3]]),
            class_option: body[4],
            tpdu_size: params.tpdu_size.unwrap_or(TPDU_SIZE_1024),
            src_tsap: params.src_tsap.ok_or(Error::ProtocolViolation {
                context: "CR without source TSAP",
            })?,
            dst_tsap: params.dst_tsap.ok_or(Error::ProtocolViolation {
                context: "CR without destination TSAP",
            })?,
        })
    }
}

impl WireEncode for CotpCrParams {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        2 + 2 + 1 + tlv_len(1) + tlv_len(2) + tlv_len(2)
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        dst.put_u16(self.dst_ref);
        dst.put_u16(self.src_ref);
        dst.put_u8(self.class_option);
        write_tlv(dst, PARAM_TPDU_SIZE, &[self.tpdu_size]);
        write_tlv(dst, PARAM_SRC_TSAP, &self.src_tsap.to_be_bytes());
        write_tlv(dst, PARAM_DST_TSAP, &self.dst_tsap.to_be_bytes());
        Ok(())
    }
}

/// COTP Connection Confirm parameters.
///
/// PLCs are inconsistent about echoing TSAPs in the confirm, so every
/// variable parameter is optional here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CotpCcParams {
    pub dst_ref: u16,
    pub src_ref: u16,
    pub class_option: u8,
    pub tpdu_size: Option<u8>,
    pub src_tsap: Option<u16>,
    pub dst_tsap: Option<u16>,
}

impl CotpCcParams {
    pub fn tpdu_size_bytes(&self) -> Option<usize> {
        self.tpdu_size.and_then(tpdu_size_bytes_from_code)
    }

    pub fn parse_body(body: &[u8]) -> Result<Self> {
        if body.len() < 5 {
            return Err(Error::ErrInvalidFrame);
        }
        let params = parse_connection_params(&body[5..])?;
        Ok(CotpCcParams {
            dst_ref: u16::from_be_bytes([body[0], body[1]]),
            src_ref: u16::from_be_bytes([body[2], body[3]]),
            class_option: body[4],
            tpdu_size: params.tpdu_size,
            src_tsap: params.src_tsap,
            dst_tsap: params.dst_tsap,
        })
    }
}

impl WireEncode for CotpCcParams {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        5 + self.tpdu_size.map_or(0, |_| tlv_len(1))
            + self.src_tsap.map_or(0, |_| tlv_len(2))
            + self.dst_tsap.map_or(0, |_| tlv_len(2))
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        dst.put_u16(self.dst_ref);
        dst.put_u16(self.src_ref);
        dst.put_u8(self.class_option);
        if let Some(size) = self.tpdu_size {
            write_tlv(dst, PARAM_TPDU_SIZE, &[size]);
        }
        if let Some(tsap) = self.src_tsap {
            write_tlv(dst, PARAM_SRC_TSAP, &tsap.to_be_bytes());
        }
        if let Some(tsap) = self.dst_tsap {
            write_tlv(dst, PARAM_DST_TSAP, &tsap.to_be_bytes());
        }
        Ok(())
    }
}

/// COTP Disconnect Request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CotpDrParams {
    pub dst_ref: u16,
    pub src_ref: u16,
    pub reason: u8,
}

impl CotpDrParams {
    pub fn parse_body(body: &[u8]) -> Result<Self> {
        if body.len() < 5 {
            return Err(Error::ErrInvalidFrame);
        }
        Ok(CotpDrParams {
            dst_ref: u16::from_be_bytes([body[0], body[1]]),
            src_ref: u16::from_be_bytes([body[2], body[3]]),
            reason: body[4],
        })
    }
}

impl WireEncode for CotpDrParams {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        5
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        dst.put_u16(self.dst_ref);
        dst.put_u16(self.src_ref);
        dst.put_u8(self.reason);
        Ok(())
    }
}

/// COTP Data TPDU parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CotpDataParams {
    /// Last segment of the user data
    pub eot: bool,
    pub tpdu_nr: u8,
}

impl Default for CotpDataParams {
    fn default() -> Self {
        Self {
            eot: true,
            tpdu_nr: 0,
        }
    }
}

impl CotpDataParams {
    pub fn parse_body(body: &[u8]) -> Result<Self> {
        let eot_nr = *body.first().ok_or(Error::ErrInvalidFrame)?;
        Ok(CotpDataParams {
            eot: (eot_nr & 0x80) != 0,
            tpdu_nr: eot_nr & 0x7F,
        })
    }
}

impl WireEncode for CotpDataParams {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        1
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        let eot_nr = if self.eot {
            0x80 | self.tpdu_nr
        } else {
            self.tpdu_nr
        };
        dst.put_u8(eot_nr);
        Ok(())
    }
}

#[inline]
pub fn tpdu_size_bytes_from_code(code: u8) -> Option<usize> {
    if (7..=13).contains(&code) {
        Some(1usize << code)
    } else {
        None
    }
}

/// Return TLV on-wire length for value length `len`
#[inline]
pub fn tlv_len(len: usize) -> usize {
    2 + len
}

/// Write a TLV with `code` and raw `bytes`
#[inline]
pub fn write_tlv<B: BufMut>(dst: &mut B, code: u8, bytes: &[u8]) {
    dst.put_u8(code);
    dst.put_u8(bytes.len() as u8);
    dst.put_slice(bytes);
}

#[derive(Debug, Default)]
struct ConnectionParams {
    tpdu_size: Option<u8>,
    src_tsap: Option<u16>,
    dst_tsap: Option<u16>,
}

/// Walk the variable part of CR/CC in any order, skipping unknown codes.
fn parse_connection_params(data: &[u8]) -> Result<ConnectionParams> {
    let mut out = ConnectionParams::default();
    let mut pos = 0;
    while pos + 2 <= data.len() {
        let code = data[pos];
        let len = data[pos + 1] as usize;
        pos += 2;
        if pos + len > data.len() {
            return Err(Error::ErrInvalidFrame);
        }
        let value = &data[pos..pos + len];
        match (code, len) {
            (PARAM_TPDU_SIZE, 1) => out.tpdu_size = Some(value[0]),
            (PARAM_SRC_TSAP, 2) => out.src_tsap = Some(u16::from_be_bytes([value[0], value[1]])),
            (PARAM_DST_TSAP, 2) => out.dst_tsap = Some(u16::from_be_bytes([value[0], value[1]])),
            _ => {}
        }
        pos += len;
    }
    Ok(out)
}
