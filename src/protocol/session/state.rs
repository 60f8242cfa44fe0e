use super::super::frame::{Tsap, TsapPair};
use serde::{Deserialize, Serialize};
use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

/// Connection request flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlcFamily {
    /// S7-300/400/1200/1500: CR built from the configured TSAP pair
    #[default]
    S7,
    /// S7-200 behind a CP243 Ethernet module: fixed "MW" CR template
    Cp243,
}

/// Values granted by the PLC during SetupCommunication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub amq_caller: u16,
    pub amq_callee: u16,
    /// Negotiated frame limit (PDU length in bytes)
    pub pdu_len: u16,
}

/// Session configuration for the S7 connection handshake and runtime behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote PLC address (host:port)
    pub socket_addr: SocketAddr,
    pub family: PlcFamily,
    /// TSAP pair carried in the COTP CR; ignored for CP243
    pub tsap: TsapPair,
    /// Preferred S7 PDU size (bytes)
    pub preferred_pdu_size: u16,
    /// Preferred AmQ caller & callee
    pub preferred_amq_caller: u16,
    pub preferred_amq_callee: u16,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read timeout
    pub read_timeout: Duration,
    /// Write timeout
    pub write_timeout: Duration,
    /// TCP_NODELAY option. Defaults to true for low-latency small PDUs
    pub tcp_nodelay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 102)),
            family: PlcFamily::S7,
            tsap: TsapPair {
                local: Tsap::from(0x0100u16),
                remote: Tsap::from(0x0102u16),
            },
            preferred_pdu_size: 480,
            preferred_amq_caller: 1,
            preferred_amq_callee: 1,
            connect_timeout: Duration::from_millis(5_000),
            read_timeout: Duration::from_millis(3_000),
            write_timeout: Duration::from_millis(3_000),
            tcp_nodelay: true,
        }
    }
}
