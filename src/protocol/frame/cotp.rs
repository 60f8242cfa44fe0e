use super::{
    super::error::{Error, Result},
    cotp_param::{CotpCcParams, CotpCrParams, CotpDataParams, CotpDrParams},
    types::CotpType,
    WireDecode, WireEncode,
};
use bytes::{BufMut, Bytes};

/// COTP TPDUs used by ISO-on-TCP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cotp {
    /// Connection Request
    Cr(CotpCrParams),
    /// Connection Confirm
    Cc(CotpCcParams),
    /// Disconnect Request
    Dr(CotpDrParams),
    /// Data TPDU
    D(CotpDataParams),
}

impl Cotp {
    #[inline]
    fn tpdu_type(&self) -> CotpType {
        match self {
            Cotp::Cr(_) => CotpType::Cr,
            Cotp::Cc(_) => CotpType::Cc,
            Cotp::Dr(_) => CotpType::Dr,
            Cotp::D(_) => CotpType::D,
        }
    }

    #[inline]
    fn body_len(&self) -> usize {
        match self {
            Cotp::Cr(p) => p.encoded_len(&()),
            Cotp::Cc(p) => p.encoded_len(&()),
            Cotp::Dr(p) => p.encoded_len(&()),
            Cotp::D(p) => p.encoded_len(&()),
        }
    }
}

impl WireEncode for Cotp {
    type Error = Error;
    type Context = ();

    /// LI byte + type byte + fixed/variable part
    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        2 + self.body_len()
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, ctx: &Self::Context) -> Result<()> {
        // LI excludes itself
        dst.put_u8((1 + self.body_len()) as u8);
        dst.put_u8(self.tpdu_type() as u8);
        match self {
            Cotp::Cr(p) => p.encode_to(dst, ctx),
            Cotp::Cc(p) => p.encode_to(dst, ctx),
            Cotp::Dr(p) => p.encode_to(dst, ctx),
            Cotp::D(p) => p.encode_to(dst, ctx),
        }
    }
}

impl WireDecode for Cotp {
    type Error = Error;
    type Context = ();

    /// Parse one COTP header. The returned slice is whatever follows the
    /// header (the user data of a Data TPDU).
    fn parse<'a>(
        input: &'a [u8],
        _parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        if input.len() < 2 {
            return Err(Error::InsufficientData {
                needed: 2,
                available: input.len(),
            });
        }
        let li = input[0] as usize;
        let total = 1 + li;
        if li < 1 || total > input.len() {
            return Err(Error::ProtocolViolation {
                context: "invalid COTP LI",
            });
        }
        let body = &input[2..total];
        let rest = &input[total..];
        let tpdu_type = CotpType::try_from(input[1]).map_err(|_| Error::ProtocolViolation {
            context: "unknown COTP PDU type",
        })?;
        let cotp = match tpdu_type {
            CotpType::D => Cotp::D(CotpDataParams::parse_body(body)?),
            CotpType::Cr => Cotp::Cr(CotpCrParams::parse_body(body)?),
            CotpType::Cc => Cotp::Cc(CotpCcParams::parse_body(body)?),
            CotpType::Dr => Cotp::Dr(CotpDrParams::parse_body(body)?),
        };
        Ok((rest, cotp))
    }
}
