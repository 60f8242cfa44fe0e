#![allow(dead_code)]

use bytes::{BufMut, BytesMut};
use s7_link::protocol::{
    codec::Codec,
    frame::{
        build_cotp_cc_message, build_cotp_data_message, build_read_ack, build_setup_comm_ack,
        build_szl_ack, build_write_ack, parse_userdata_param, Cotp, CotpCcParams, DataItemIter,
        PduBuilder, S7AppBody, S7Message, S7Pdu, S7PduType, S7ReturnCode,
    },
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, Once},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::codec::{Decoder, Encoder};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

pub const AREA_I: u8 = 0x81;
pub const AREA_Q: u8 = 0x82;
pub const AREA_M: u8 = 0x83;
pub const AREA_DB: u8 = 0x84;

/// Switches that make the mock misbehave.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Answer ReadVar with a WriteVar ack
    pub wrong_function: bool,
    /// Return this code for every read item
    pub item_error: Option<S7ReturnCode>,
    /// Split SZL answers into data units of this many bytes
    pub split_szl: Option<usize>,
    /// Write responses one byte at a time
    pub dribble: bool,
    /// Refuse new connections by closing them right away
    pub refuse: bool,
    /// Answer SZL reads with a foreign userdata subfunction
    pub szl_wrong_function: bool,
}

#[derive(Debug, Default)]
pub struct PlcState {
    /// Memory image per (area code, db)
    pub memory: HashMap<(u8, u16), Vec<u8>>,
    /// Records per SZL id: (record length, record bytes)
    pub szl: HashMap<u16, (u16, Vec<u8>)>,
    pub faults: Faults,
    /// PDU size granted at most
    pub pdu_len: u16,
    pub connections: usize,
    pub read_requests: usize,
    pub write_requests: usize,
    /// Remote TSAP of the last connection request
    pub last_dst_tsap: Option<u16>,
}

impl PlcState {
    pub fn bytes(&self, area: u8, db: u16, start: usize, len: usize) -> Vec<u8> {
        let mem = self.memory.get(&(area, db)).cloned().unwrap_or_default();
        (start..start + len).map(|i| mem.get(i).copied().unwrap_or(0)).collect()
    }

    pub fn set_bytes(&mut self, area: u8, db: u16, start: usize, data: &[u8]) {
        let mem = self.memory.entry((area, db)).or_default();
        if mem.len() < start + data.len() {
            mem.resize(start + data.len(), 0);
        }
        mem[start..start + data.len()].copy_from_slice(data);
    }
}

/// In-process PLC speaking ISO-on-TCP on a random local port.
pub struct MockPlc {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<PlcState>>,
    task: JoinHandle<()>,
}

impl MockPlc {
    pub async fn start(pdu_len: u16) -> MockPlc {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(PlcState {
            pdu_len,
            ..Default::default()
        }));
        install_identity(&mut state.lock().unwrap());

        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });
        MockPlc { addr, state, task }
    }

    pub fn set_faults(&self, faults: Faults) {
        self.state.lock().unwrap().faults = faults;
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut PlcState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn device_config(&self) -> s7_link::DeviceConfig {
        let mut cfg = s7_link::DeviceConfig::new(self.addr.ip().to_string());
        cfg.port = self.addr.port();
        cfg.connection_policy.connect_timeout_ms = 1000;
        cfg.connection_policy.read_timeout_ms = 1000;
        cfg.connection_policy.write_timeout_ms = 1000;
        cfg
    }
}

impl Drop for MockPlc {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn install_identity(state: &mut PlcState) {
    let mut module = Vec::new();
    for (index, version) in [(0x0001u16, [0u8, 3]), (0x0006, [0, 4])] {
        module.extend_from_slice(&index.to_be_bytes());
        let mut mlfb = [b' '; 20];
        mlfb[..19].copy_from_slice(b"6ES7 315-2EH14-0AB0");
        module.extend_from_slice(&mlfb);
        module.extend_from_slice(&[0x00, 0xC0, 0x00, 0x00]);
        module.extend_from_slice(&version);
    }
    module.extend_from_slice(&0x0007u16.to_be_bytes());
    module.extend_from_slice(&[b' '; 20]);
    module.extend_from_slice(&[0x00, 0xC0, 0x00, 3, 2, 6]);
    state.szl.insert(0x0011, (28, module));

    let mut component = Vec::new();
    for (index, value) in [
        (2u16, "CPU 315-2 PN/DP"),
        (5, "S C-X4U421302009"),
        (7, "CPU 315-2 PN/DP"),
    ] {
        component.extend_from_slice(&index.to_be_bytes());
        let mut text = [0u8; 32];
        text[..value.len()].copy_from_slice(value.as_bytes());
        component.extend_from_slice(&text);
    }
    state.szl.insert(0x001C, (34, component));

    let mut memory = Vec::new();
    memory.extend_from_slice(&1u16.to_be_bytes());
    memory.extend_from_slice(&1u16.to_be_bytes());
    memory.extend_from_slice(&393_216u32.to_be_bytes());
    memory.extend_from_slice(&1_000u32.to_be_bytes());
    memory.extend_from_slice(&392_216u32.to_be_bytes());
    state.szl.insert(0x0113, (16, memory));
}

struct VarSpec {
    transport_size: u8,
    length: u16,
    db: u16,
    area: u8,
    address: u32,
}

fn var_specs(param: &[u8]) -> Vec<VarSpec> {
    let count = param[1] as usize;
    (0..count)
        .map(|i| {
            let p = &param[2 + i * 12..2 + (i + 1) * 12];
            VarSpec {
                transport_size: p[3],
                length: u16::from_be_bytes([p[4], p[5]]),
                db: u16::from_be_bytes([p[6], p[7]]),
                area: p[8],
                address: u32::from_be_bytes([0, p[9], p[10], p[11]]),
            }
        })
        .collect()
}

fn szl_reply(pdu_ref: u16, subfunction: u8, sequence: u8) -> S7Pdu {
    let mut b = PduBuilder::new(S7PduType::UserData, pdu_ref);
    b.add_parameter(&[
        0x00,
        0x01,
        0x12,
        0x08,
        0x12,
        0x84,
        subfunction,
        sequence,
        0x00,
        0x00,
        0x00,
        0x00,
    ])
    .add_data(&[0x0A, 0x00, 0x00, 0x00]);
    b.finish()
}

fn szl_error(pdu_ref: u16, sequence: u8) -> S7Pdu {
    szl_reply(pdu_ref, 0x01, sequence)
}

async fn send(
    stream: &mut TcpStream,
    codec: &mut Codec,
    msg: S7Message,
    dribble: bool,
) -> std::io::Result<()> {
    let mut out = BytesMut::new();
    codec
        .encode(msg, &mut out)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    if dribble {
        for b in out.iter() {
            stream.write_all(&[*b]).await?;
            stream.flush().await?;
            tokio::task::yield_now().await;
        }
    } else {
        stream.write_all(&out).await?;
    }
    Ok(())
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<PlcState>>) -> std::io::Result<()> {
    {
        let mut s = state.lock().unwrap();
        if s.faults.refuse {
            return Ok(());
        }
        s.connections += 1;
    }
    let mut codec = Codec::default();
    let mut inbound = BytesMut::with_capacity(1024);
    // follow-up SZL units still to send
    let mut szl_pending: Vec<Vec<u8>> = Vec::new();

    loop {
        let msg = loop {
            match codec.decode(&mut inbound) {
                Ok(Some(msg)) => break msg,
                Ok(None) => {}
                Err(_) => return Ok(()),
            }
            if stream.read_buf(&mut inbound).await? == 0 {
                return Ok(());
            }
        };
        let dribble = state.lock().unwrap().faults.dribble;

        let pdu = match (msg.cotp, msg.app) {
            (Cotp::Cr(cr), _) => {
                state.lock().unwrap().last_dst_tsap = Some(cr.dst_tsap);
                let cc = CotpCcParams {
                    dst_ref: cr.src_ref,
                    src_ref: 0x0001,
                    class_option: 0,
                    tpdu_size: Some(cr.tpdu_size),
                    src_tsap: Some(cr.dst_tsap),
                    dst_tsap: Some(cr.src_tsap),
                };
                send(&mut stream, &mut codec, build_cotp_cc_message(cc), dribble).await?;
                continue;
            }
            (Cotp::D(_), Some(S7AppBody::Parsed(pdu))) => pdu,
            _ => return Ok(()),
        };

        let pdu_ref = pdu.header.pdu_ref;
        let reply = match pdu.header.pdu_type {
            S7PduType::Job => match pdu.param[0] {
                0xF0 => {
                    let requested = u16::from_be_bytes([pdu.param[6], pdu.param[7]]);
                    let granted = requested.min(state.lock().unwrap().pdu_len);
                    build_setup_comm_ack(pdu_ref, 1, 1, granted)
                }
                0x04 => answer_read(&pdu, &state),
                0x05 => answer_write(&pdu, &state),
                _ => return Ok(()),
            },
            S7PduType::UserData => match answer_szl(&pdu, &state, &mut szl_pending) {
                Some(reply) => reply,
                None => return Ok(()),
            },
            _ => return Ok(()),
        };
        send(&mut stream, &mut codec, build_cotp_data_message(reply), dribble).await?;
    }
}

fn answer_szl(pdu: &S7Pdu, state: &Mutex<PlcState>, pending: &mut Vec<Vec<u8>>) -> Option<S7Pdu> {
    let param = parse_userdata_param(&pdu.param).ok()?;
    let pdu_ref = pdu.header.pdu_ref;
    if state.lock().unwrap().faults.szl_wrong_function {
        return Some(szl_reply(pdu_ref, 0x02, param.sequence_number));
    }
    if param.method != 0x11 {
        let reply = match pending.pop() {
            Some(unit) => build_szl_ack(
                pdu_ref,
                param.sequence_number,
                u8::from(!pending.is_empty()),
                &unit,
            ),
            None => szl_error(pdu_ref, param.sequence_number),
        };
        return Some(reply);
    }

    let id = u16::from_be_bytes([pdu.payload[4], pdu.payload[5]]);
    let index = u16::from_be_bytes([pdu.payload[6], pdu.payload[7]]);
    let s = state.lock().unwrap();
    let Some((record_len, records)) = s.szl.get(&id) else {
        return Some(szl_error(pdu_ref, 1));
    };
    let mut unit = BytesMut::new();
    unit.put_u16(id);
    unit.put_u16(index);
    unit.put_u16(*record_len);
    unit.put_u16((records.len() / *record_len as usize) as u16);
    unit.put_slice(records);
    let chunk = s.faults.split_szl.unwrap_or(unit.len()).max(1);
    let mut units: Vec<Vec<u8>> = unit.chunks(chunk).map(|c| c.to_vec()).collect();
    let first = units.remove(0);
    units.reverse();
    *pending = units;
    Some(build_szl_ack(pdu_ref, 1, u8::from(!pending.is_empty()), &first))
}

fn answer_read(pdu: &S7Pdu, state: &Mutex<PlcState>) -> S7Pdu {
    let mut s = state.lock().unwrap();
    s.read_requests += 1;
    let pdu_ref = pdu.header.pdu_ref;
    if s.faults.wrong_function {
        return build_write_ack(pdu_ref, &[S7ReturnCode::Success]);
    }
    let specs = var_specs(&pdu.param);
    let blocks: Vec<Vec<u8>> = specs
        .iter()
        .map(|v| s.bytes(v.area, v.db, (v.address >> 3) as usize, v.length as usize))
        .collect();
    let items: Vec<(S7ReturnCode, &[u8])> = blocks
        .iter()
        .map(|b| match s.faults.item_error {
            Some(code) => (code, &[][..]),
            None => (S7ReturnCode::Success, b.as_slice()),
        })
        .collect();
    build_read_ack(pdu_ref, &items)
}

fn answer_write(pdu: &S7Pdu, state: &Mutex<PlcState>) -> S7Pdu {
    let mut s = state.lock().unwrap();
    s.write_requests += 1;
    let specs = var_specs(&pdu.param);
    let items = DataItemIter::new(&pdu.payload, specs.len());
    let mut codes = Vec::new();
    for (spec, item) in specs.iter().zip(items) {
        let Ok(item) = item else {
            codes.push(S7ReturnCode::DataTypeInconsistent);
            continue;
        };
        if spec.transport_size == 0x01 {
            let byte = (spec.address >> 3) as usize;
            let mask = 1u8 << (spec.address & 7);
            let mut current = s.bytes(spec.area, spec.db, byte, 1);
            if item.data.first().copied().unwrap_or(0) != 0 {
                current[0] |= mask;
            } else {
                current[0] &= !mask;
            }
            s.set_bytes(spec.area, spec.db, byte, &current);
        } else {
            s.set_bytes(spec.area, spec.db, (spec.address >> 3) as usize, item.data);
        }
        codes.push(S7ReturnCode::Success);
    }
    build_write_ack(pdu.header.pdu_ref, &codes)
}
