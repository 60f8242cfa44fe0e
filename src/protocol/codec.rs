use super::{
    error::Error,
    frame::{Cotp, S7AppBody, S7Message, S7Pdu, Tpkt, WireDecode, WireEncode},
};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound for a reassembled S7 PDU. Negotiated frames never exceed
/// 960 bytes; anything far above that is a broken peer.
const MAX_REASSEMBLED_LEN: usize = u16::MAX as usize;

/// RFC1006 (TPKT) + COTP + S7 codec.
///
/// Data TPDUs without the EOT bit are buffered until the final segment
/// arrives, so the session only ever sees complete PDUs.
#[derive(Debug, Default)]
pub struct Codec {
    partial: BytesMut,
}

impl Decoder for Codec {
    type Item = S7Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(length) = Tpkt::peek_frame_len(src)? else {
                return Ok(None);
            };
            if src.len() < length {
                src.reserve(length - src.len());
                return Ok(None);
            }

            let frame = src.split_to(length).freeze();
            let tpkt = Tpkt {
                version: frame[0],
                reserved: frame[1],
                length: length as u16,
            };
            let (user, cotp) = Cotp::parse(&frame[4..], &frame, &())?;
            let Cotp::D(params) = cotp else {
                return Ok(Some(S7Message {
                    tpkt,
                    cotp,
                    app: None,
                }));
            };

            let user = frame.slice_ref(user);
            if !params.eot {
                if self.partial.len() + user.len() > MAX_REASSEMBLED_LEN {
                    self.partial.clear();
                    return Err(Error::ProtocolViolation {
                        context: "COTP reassembly exceeds maximum PDU size",
                    });
                }
                self.partial.extend_from_slice(&user);
                continue;
            }

            let body = if self.partial.is_empty() {
                user
            } else {
                self.partial.extend_from_slice(&user);
                self.partial.split().freeze()
            };
            let app = if body.is_empty() {
                None
            } else {
                Some(match S7Pdu::parse_received(&body) {
                    Ok(pdu) => S7AppBody::Parsed(pdu),
                    Err(_) => S7AppBody::Segmented(body),
                })
            };
            return Ok(Some(S7Message { tpkt, cotp, app }));
        }
    }
}

impl Encoder<S7Message> for Codec {
    type Error = Error;

    fn encode(&mut self, item: S7Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let tpkt_len = item.tpkt.encoded_len(&());
        let cotp_len = item.cotp.encoded_len(&());
        let s7_len = match (&item.cotp, &item.app) {
            (Cotp::D(_), Some(S7AppBody::Segmented(b))) => b.len(),
            (Cotp::D(_), Some(S7AppBody::Parsed(p))) => p.encoded_len(&()),
            _ => 0,
        };
        let total_len = tpkt_len + cotp_len + s7_len;
        if total_len > u16::MAX as usize {
            return Err(Error::ProtocolViolation {
                context: "frame exceeds TPKT length field",
            });
        }
        dst.reserve(total_len);

        Tpkt::encode_header_to(total_len, dst);
        item.cotp.encode_to(dst, &())?;
        match (item.cotp, item.app) {
            (Cotp::D(_), Some(S7AppBody::Segmented(b))) => dst.put_slice(&b),
            (Cotp::D(_), Some(S7AppBody::Parsed(p))) => p.encode_to(dst, &())?,
            _ => {}
        }
        Ok(())
    }
}
