use crate::protocol::{
    error::{Error, Result},
    frame::{rack_slot_tsap_pair, ConnectionType, Tsap, TsapPair},
    session::{PlcFamily, SessionConfig},
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, str::FromStr, time::Duration};

/// TSAP as a number or in one of the text forms `"03:01"`, `"0x0301"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TsapValue {
    Number(u16),
    Text(String),
}

impl TsapValue {
    pub fn resolve(&self) -> Result<Tsap> {
        match self {
            TsapValue::Number(v) => Ok(Tsap::from(*v)),
            TsapValue::Text(s) => Tsap::from_str(s),
        }
    }
}

impl From<u16> for TsapValue {
    fn from(v: u16) -> Self {
        TsapValue::Number(v)
    }
}

impl From<String> for TsapValue {
    fn from(s: String) -> Self {
        TsapValue::Text(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum TsapConfig {
    #[serde(rename_all = "camelCase")]
    RackSlot {
        rack: u8,
        slot: u8,
        #[serde(default)]
        connection_type: ConnectionType,
    },
    Tsap { src: TsapValue, dst: TsapValue },
}

impl Default for TsapConfig {
    fn default() -> Self {
        TsapConfig::RackSlot {
            rack: 0,
            slot: 2,
            connection_type: ConnectionType::Pg,
        }
    }
}

impl TsapConfig {
    pub fn pair(&self) -> Result<TsapPair> {
        match self {
            TsapConfig::RackSlot {
                rack,
                slot,
                connection_type,
            } => rack_slot_tsap_pair(*connection_type, *rack, *slot),
            TsapConfig::Tsap { src, dst } => Ok(TsapPair {
                local: src.resolve()?,
                remote: dst.resolve()?,
            }),
        }
    }
}

/// Socket timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPolicy {
    #[serde(default = "ConnectionPolicy::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "ConnectionPolicy::default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "ConnectionPolicy::default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl ConnectionPolicy {
    fn default_connect_timeout_ms() -> u64 {
        5000
    }
    fn default_read_timeout_ms() -> u64 {
        3000
    }
    fn default_write_timeout_ms() -> u64 {
        3000
    }
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            connect_timeout_ms: ConnectionPolicy::default_connect_timeout_ms(),
            read_timeout_ms: ConnectionPolicy::default_read_timeout_ms(),
            write_timeout_ms: ConnectionPolicy::default_write_timeout_ms(),
        }
    }
}

/// Who drives the poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum Schedule {
    /// Only explicit `execute()` calls run a cycle
    #[default]
    External,
    /// One cycle every `period_ms`
    #[serde(rename_all = "camelCase")]
    Periodic { period_ms: u64 },
    /// Back-to-back cycles with at least `min_idle_ms` between them
    #[serde(rename_all = "camelCase")]
    Continuous { min_idle_ms: u64 },
}

/// Device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Remote host (IP literal)
    pub host: String,
    /// Remote port (default 102)
    #[serde(default = "DeviceConfig::default_port")]
    pub port: u16,
    #[serde(default)]
    pub family: PlcFamily,
    #[serde(default)]
    pub tsap: TsapConfig,
    #[serde(default = "DeviceConfig::default_pdu_size")]
    pub preferred_pdu_size: u16,
    #[serde(default = "DeviceConfig::default_amq")]
    pub preferred_amq_caller: u16,
    #[serde(default = "DeviceConfig::default_amq")]
    pub preferred_amq_callee: u16,
    #[serde(default)]
    pub connection_policy: ConnectionPolicy,
    #[serde(default)]
    pub schedule: Schedule,
    /// Largest number of poll cycles skipped between reconnect attempts
    #[serde(default = "DeviceConfig::default_max_reconnect_ceiling")]
    pub max_reconnect_ceiling: u32,
    /// Capacity of the device command mailbox
    #[serde(default = "DeviceConfig::default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl DeviceConfig {
    fn default_port() -> u16 {
        102
    }
    fn default_pdu_size() -> u16 {
        480
    }
    fn default_amq() -> u16 {
        1
    }
    fn default_max_reconnect_ceiling() -> u32 {
        15
    }
    fn default_mailbox_capacity() -> usize {
        64
    }

    /// Configuration for `host` with every other field at its default.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Self::default_port(),
            family: PlcFamily::default(),
            tsap: TsapConfig::default(),
            preferred_pdu_size: Self::default_pdu_size(),
            preferred_amq_caller: Self::default_amq(),
            preferred_amq_callee: Self::default_amq(),
            connection_policy: ConnectionPolicy::default(),
            schedule: Schedule::default(),
            max_reconnect_ceiling: Self::default_max_reconnect_ceiling(),
            mailbox_capacity: Self::default_mailbox_capacity(),
        }
    }

    /// Validate the configuration and map it to protocol session options.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let tsap = self.tsap.pair().map_err(|e| match e {
            Error::InvalidRack(_) | Error::InvalidSlot(_) => e,
            _ => Error::InvalidConfiguration("tsap"),
        })?;
        let socket_addr = format!("{}:{}", self.host, self.port)
            .parse::<SocketAddr>()
            .map_err(|_| Error::InvalidConfiguration("host"))?;
        if self.preferred_pdu_size < 240 {
            return Err(Error::InvalidConfiguration("preferredPduSize"));
        }
        if self.preferred_amq_caller == 0 || self.preferred_amq_callee == 0 {
            return Err(Error::InvalidConfiguration("preferredAmq"));
        }
        if self.mailbox_capacity == 0 {
            return Err(Error::InvalidConfiguration("mailboxCapacity"));
        }
        Ok(SessionConfig {
            socket_addr,
            family: self.family,
            tsap,
            preferred_pdu_size: self.preferred_pdu_size,
            preferred_amq_caller: self.preferred_amq_caller,
            preferred_amq_callee: self.preferred_amq_callee,
            connect_timeout: Duration::from_millis(self.connection_policy.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.connection_policy.read_timeout_ms),
            write_timeout: Duration::from_millis(self.connection_policy.write_timeout_ms),
            ..Default::default()
        })
    }
}
