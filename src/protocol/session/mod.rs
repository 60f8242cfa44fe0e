mod handshake;
mod identity;
mod state;

pub use identity::{
    DeviceIdentity, SzlResponse, SZL_COMPONENT_IDENTIFICATION, SZL_MEMORY_AREAS,
    SZL_MODULE_IDENTIFICATION,
};
pub use state::{Negotiated, PlcFamily, SessionConfig};

use super::{
    codec::Codec,
    error::{Error, ErrorCode, Result},
    frame::{
        build_cotp_data_message, build_read_request, build_szl_followup, build_szl_request,
        build_write_bits_request, build_write_request, item::parse_data_item, parse_userdata_param,
        Cotp, S7AppBody, S7Area, S7Function, S7Message, S7Pdu, S7PduType, S7ReturnCode,
        UserDataParam,
    },
};
use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::codec::Framed;
use tracing::instrument;

/// Bytes of a ReadVar exchange that are not user data
pub const READ_OVERHEAD: usize = 18;
/// Bytes of a WriteVar exchange that are not user data
pub const WRITE_OVERHEAD: usize = 28;

/// Upper bound on chained SZL data units.
const MAX_SZL_UNITS: usize = 256;

async fn send_frame(
    framed: &mut Framed<TcpStream, Codec>,
    msg: S7Message,
    write_timeout: Duration,
) -> Result<()> {
    timeout(write_timeout, framed.send(msg))
        .await
        .map_err(|_| Error::ErrRequestTimeout)?
}

async fn recv_frame(
    framed: &mut Framed<TcpStream, Codec>,
    read_timeout: Duration,
) -> Result<S7Message> {
    timeout(read_timeout, framed.next())
        .await
        .map_err(|_| Error::ErrRequestTimeout)?
        .ok_or(Error::ErrUseClosedConnection)?
}

/// One established ISO-on-TCP link to a PLC.
///
/// Every exchange is strictly sequential: a request is sent and its answer
/// awaited before anything else goes on the wire. Methods take `&mut self`,
/// so a connection can never interleave two exchanges.
#[derive(Debug)]
pub struct Connection {
    framed: Framed<TcpStream, Codec>,
    config: Arc<SessionConfig>,
    negotiated: Negotiated,
    /// Monotonic PDU reference with wrap-around in [1..=65535]
    pdu_ref: u16,
    /// Set once a transport or desync error has made the stream unusable
    broken: bool,
}

impl Connection {
    /// Connect the socket, run the COTP handshake and negotiate the PDU size.
    #[instrument(level = "debug", skip_all, fields(addr = %config.socket_addr))]
    pub async fn open(config: Arc<SessionConfig>) -> Result<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(config.socket_addr))
            .await
            .map_err(|_| Error::ErrConnectTimeout)??;
        if let Err(e) = stream.set_nodelay(config.tcp_nodelay) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        Self::open_with_stream(stream, config).await
    }

    /// Run the handshake over an already connected stream.
    pub async fn open_with_stream(stream: TcpStream, config: Arc<SessionConfig>) -> Result<Self> {
        let mut framed = Framed::new(stream, Codec::default());
        let cc = handshake::iso_connect(&mut framed, &config).await?;
        tracing::debug!(tpdu_size = ?cc.tpdu_size_bytes(), "COTP connection confirmed");
        let negotiated = handshake::negotiation(&mut framed, &config, 0).await?;
        tracing::info!(
            pdu_len = negotiated.pdu_len,
            amq_caller = negotiated.amq_caller,
            amq_callee = negotiated.amq_callee,
            "S7 connection established"
        );
        Ok(Self {
            framed,
            config,
            negotiated,
            pdu_ref: 0,
            broken: false,
        })
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[inline]
    pub fn negotiated(&self) -> Negotiated {
        self.negotiated
    }

    /// Frame limit granted by the PLC.
    #[inline]
    pub fn negotiated_pdu_len(&self) -> u16 {
        self.negotiated.pdu_len
    }

    /// Largest byte range a single ReadVar exchange can return.
    #[inline]
    pub fn max_read_payload(&self) -> usize {
        read_limit(self.negotiated.pdu_len)
    }

    /// Largest byte range a single WriteVar exchange can carry.
    #[inline]
    pub fn max_write_payload(&self) -> usize {
        write_limit(self.negotiated.pdu_len)
    }

    /// Whether an earlier failure left the stream out of step.
    #[inline]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn next_pdu_ref(&mut self) -> u16 {
        self.pdu_ref = match self.pdu_ref.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.pdu_ref
    }

    /// Remember transport and desync failures; the connection refuses
    /// further exchanges afterwards.
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.requires_reconnect() && !self.broken {
                if e.is_unexpected_function() {
                    tracing::error!(error = %e, "S7 stream out of step");
                } else {
                    tracing::debug!(error = %e, "S7 connection unusable");
                }
                self.broken = true;
            }
        }
        result
    }

    /// Send one request PDU and await its answer.
    ///
    /// The answer must carry the reference of the request; anything else
    /// means the stream no longer lines up with our requests.
    #[instrument(level = "debug", skip_all, fields(pdu_ref = request.header.pdu_ref))]
    pub async fn exchange(&mut self, request: S7Pdu) -> Result<S7Pdu> {
        if self.broken {
            return Err(Error::ErrUseClosedConnection);
        }
        let result = self.exchange_inner(request).await;
        self.track(result)
    }

    async fn exchange_inner(&mut self, request: S7Pdu) -> Result<S7Pdu> {
        let pdu_ref = request.header.pdu_ref;
        send_frame(
            &mut self.framed,
            build_cotp_data_message(request),
            self.config.write_timeout,
        )
        .await?;
        let msg = recv_frame(&mut self.framed, self.config.read_timeout).await?;
        let pdu = match (msg.cotp, msg.app) {
            (Cotp::D(_), Some(S7AppBody::Parsed(pdu))) => pdu,
            (Cotp::D(_), _) => return Err(Error::ErrInvalidFrame),
            (Cotp::Dr(_), _) => return Err(Error::ErrUseClosedConnection),
            _ => return Err(Error::ErrUnexpectedPdu),
        };
        if pdu.header.pdu_ref != pdu_ref {
            tracing::debug!(
                expected = pdu_ref,
                actual = pdu.header.pdu_ref,
                "PDU reference mismatch"
            );
            return Err(Error::ErrUnexpectedPdu);
        }
        Ok(pdu)
    }

    /// Read `length` bytes at `start`, splitting the range into as many
    /// exchanges as the negotiated PDU size requires.
    ///
    /// For timer and counter areas `start` counts elements of two bytes.
    pub async fn read_bytes(
        &mut self,
        area: S7Area,
        db: u16,
        start: u32,
        length: usize,
    ) -> Result<Bytes> {
        let result = self.read_bytes_inner(area, db, start, length).await;
        self.track(result)
    }

    async fn read_bytes_inner(
        &mut self,
        area: S7Area,
        db: u16,
        start: u32,
        length: usize,
    ) -> Result<Bytes> {
        let chunk = chunk_size(area, self.max_read_payload())?;
        let mut out = BytesMut::with_capacity(length);
        let mut offset = 0usize;
        while offset < length {
            let n = chunk.min(length - offset);
            let data = self.read_chunk(area, db, advance(area, start, offset)?, n).await?;
            let short = data.len() < n;
            out.extend_from_slice(&data);
            offset += n;
            if short {
                break;
            }
        }
        Ok(out.freeze())
    }

    async fn read_chunk(&mut self, area: S7Area, db: u16, start: u32, n: usize) -> Result<Bytes> {
        let pdu_ref = self.next_pdu_ref();
        let request = build_read_request(pdu_ref, area, db, start, n as u16)?;
        let resp = self.exchange(request).await?;
        resp.expect_function(S7Function::ReadVar)?;
        let item = resp.data_items()?.next().ok_or(Error::ErrInvalidFrame)??;
        if let Err(e) = item.check() {
            tracing::warn!(?area, db, start, code = ?item.return_code, "S7 read rejected");
            return Err(e);
        }
        if item.data.len() > n {
            return Err(Error::ResponseTooLong {
                requested: n,
                received: item.data.len(),
            });
        }
        Ok(resp.payload.slice_ref(item.data))
    }

    /// Write `data` at `start`, split at the negotiated write limit.
    pub async fn write_bytes(
        &mut self,
        area: S7Area,
        db: u16,
        start: u32,
        data: &[u8],
    ) -> Result<()> {
        let result = self.write_bytes_inner(area, db, start, data).await;
        self.track(result)
    }

    async fn write_bytes_inner(
        &mut self,
        area: S7Area,
        db: u16,
        start: u32,
        data: &[u8],
    ) -> Result<()> {
        let chunk = chunk_size(area, self.max_write_payload())?;
        let mut offset = 0usize;
        while offset < data.len() {
            let n = chunk.min(data.len() - offset);
            let pdu_ref = self.next_pdu_ref();
            let request = build_write_request(
                pdu_ref,
                area,
                db,
                advance(area, start, offset)?,
                &data[offset..offset + n],
            )?;
            let resp = self.exchange(request).await?;
            check_write(&resp)?;
            offset += n;
        }
        Ok(())
    }

    /// Write `length_bits` bits starting at bit address `start_bit`
    /// (`byte * 8 + bit`).
    pub async fn write_bits(
        &mut self,
        area: S7Area,
        db: u16,
        start_bit: u32,
        length_bits: u16,
        data: &[u8],
    ) -> Result<()> {
        let result = self
            .write_bits_inner(area, db, start_bit, length_bits, data)
            .await;
        self.track(result)
    }

    async fn write_bits_inner(
        &mut self,
        area: S7Area,
        db: u16,
        start_bit: u32,
        length_bits: u16,
        data: &[u8],
    ) -> Result<()> {
        let pdu_ref = self.next_pdu_ref();
        let request = build_write_bits_request(pdu_ref, area, db, start_bit, length_bits, data)?;
        let resp = self.exchange(request).await?;
        check_write(&resp)
    }

    /// Read a system status list, following continuation units until the
    /// PLC reports the last one.
    #[instrument(level = "debug", skip(self))]
    pub async fn read_szl(&mut self, id: u16, index: u16) -> Result<SzlResponse> {
        let result = self.read_szl_inner(id, index).await;
        self.track(result)
    }

    async fn read_szl_inner(&mut self, id: u16, index: u16) -> Result<SzlResponse> {
        let pdu_ref = self.next_pdu_ref();
        let resp = self.exchange(build_szl_request(pdu_ref, id, index)).await?;
        let (mut param, unit) = szl_unit(&resp)?;
        let (mut szl, used) = SzlResponse::from_first_unit(unit)?;
        let mut records = BytesMut::from(&unit[used..]);

        let mut units = 1usize;
        while param.has_more() {
            units += 1;
            if units > MAX_SZL_UNITS {
                return Err(Error::ProtocolViolation {
                    context: "SZL answer never reports its last data unit",
                });
            }
            let pdu_ref = self.next_pdu_ref();
            let resp = self
                .exchange(build_szl_followup(pdu_ref, param.sequence_number))
                .await?;
            let (next, unit) = szl_unit(&resp)?;
            records.extend_from_slice(unit);
            param = next;
        }
        tracing::debug!(units, bytes = records.len(), "SZL read complete");
        szl.records = records.freeze();
        Ok(szl)
    }

    /// Compose the device identity from the identification lists. A failed
    /// sub-query leaves its fields empty; only a broken link is an error.
    pub async fn read_identity(&mut self) -> Result<DeviceIdentity> {
        let mut identity = DeviceIdentity::default();
        let queries: [(u16, u16); 3] = [
            (SZL_MODULE_IDENTIFICATION, 0x0000),
            (SZL_COMPONENT_IDENTIFICATION, 0x0000),
            (SZL_MEMORY_AREAS, 0x0001),
        ];
        for (id, index) in queries {
            let applied = match self.read_szl(id, index).await {
                Ok(szl) => match id {
                    SZL_MODULE_IDENTIFICATION => identity.apply_module_identification(&szl),
                    SZL_COMPONENT_IDENTIFICATION => identity.apply_component_identification(&szl),
                    _ => identity.apply_memory_areas(&szl),
                },
                Err(e) if e.requires_reconnect() => return Err(e),
                Err(e) => Err(e),
            };
            if let Err(e) = applied {
                tracing::debug!(id, error = %e, "SZL query skipped");
            }
        }
        Ok(identity)
    }

    /// Flush and shut down the socket. ISO-on-TCP has no S7 level logout.
    pub async fn close(mut self) -> Result<()> {
        let result = timeout(
            self.config.write_timeout,
            SinkExt::<S7Message>::close(&mut self.framed),
        )
        .await
            .map_err(|_| Error::ErrRequestTimeout)?;
        tracing::info!(addr = %self.config.socket_addr, "S7 connection closed");
        result
    }
}

/// ReadVar payload limit for a frame limit.
#[inline]
pub fn read_limit(pdu_len: u16) -> usize {
    (pdu_len as usize).saturating_sub(READ_OVERHEAD)
}

/// WriteVar payload limit for a frame limit.
#[inline]
pub fn write_limit(pdu_len: u16) -> usize {
    (pdu_len as usize).saturating_sub(WRITE_OVERHEAD)
}

/// Chunk size for an area; timer and counter chunks hold whole elements.
fn chunk_size(area: S7Area, limit: usize) -> Result<usize> {
    let chunk = if area.is_timer_or_counter() {
        limit & !1
    } else {
        limit
    };
    if chunk == 0 {
        return Err(Error::ProtocolViolation {
            context: "negotiated PDU too small for any payload",
        });
    }
    Ok(chunk.min(u16::MAX as usize))
}

/// Start address of the chunk `offset` bytes into a range.
fn advance(area: S7Area, start: u32, offset: usize) -> Result<u32> {
    let units = if area.is_timer_or_counter() {
        offset / 2
    } else {
        offset
    };
    u32::try_from(units)
        .ok()
        .and_then(|u| start.checked_add(u))
        .ok_or_else(|| Error::ErrInvalidAddress(format!("offset {start}+{units} out of range")))
}

fn check_write(resp: &S7Pdu) -> Result<()> {
    match resp.test_write_result()? {
        S7ReturnCode::Success => Ok(()),
        code => {
            tracing::warn!(?code, "S7 write rejected");
            Err(Error::ItemError { code })
        }
    }
}

/// Validate one Read-SZL answer and return its parameter and the unit bytes.
fn szl_unit(resp: &S7Pdu) -> Result<(UserDataParam, &[u8])> {
    if resp.header.pdu_type != S7PduType::UserData {
        return Err(Error::ErrUnexpectedPdu);
    }
    let param = parse_userdata_param(&resp.param)?;
    if param.subfunction != 0x01 {
        return Err(Error::ErrUnexpectedFunction {
            expected: 0x01,
            actual: param.subfunction,
        });
    }
    if param.error_code != 0 {
        return Err(Error::S7Error {
            code: ErrorCode::from(param.error_code),
        });
    }
    let (_rest, item) = parse_data_item(&resp.payload)?;
    item.check()?;
    Ok((param, item.data))
}
