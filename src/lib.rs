//! Siemens S7 client over ISO-on-TCP.
//!
//! [`protocol`] holds the wire layer and the synchronous [`Connection`];
//! [`area`] packs tag addresses into frame-sized requests; [`Device`] runs
//! the poll cycle and reconnects on its own.

pub mod address;
pub mod area;
pub mod device;
pub mod protocol;
pub mod supervisor;
pub mod types;

pub use address::{parse, Address, ElementType, MemoryArea};
pub use device::{
    CycleReport, Device, DeviceEvent, DeviceResult, PortState, Sample, SharedError, WriteTicket,
};
pub use protocol::{
    error::{Error, ErrorClass, Result},
    session::{Connection, DeviceIdentity, PlcFamily, SessionConfig},
};
pub use types::{ConnectionPolicy, DeviceConfig, Schedule, TsapConfig, TsapValue};
