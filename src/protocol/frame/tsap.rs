use super::super::error::{Error, Result};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::str::FromStr;

/// Connection resource requested from the CPU; becomes the high byte of the
/// remote TSAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ConnectionType {
    /// Programming device
    #[default]
    Pg = 0x01,
    /// Operator panel / HMI
    Op = 0x02,
    /// Generic S7 basic communication
    S7Basic = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tsap(pub u8, pub u8); // (high byte, low byte)

impl From<Tsap> for u16 {
    #[inline]
    fn from(tsap: Tsap) -> Self {
        ((tsap.0 as u16) << 8) | (tsap.1 as u16)
    }
}

impl From<u16> for Tsap {
    #[inline]
    fn from(v: u16) -> Self {
        Tsap((v >> 8) as u8, v as u8)
    }
}

impl FromStr for Tsap {
    type Err = Error;

    /// Accepts "HH:LL" hex bytes, "0xHHLL" or a decimal u16.
    fn from_str(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidConfiguration("tsap");
        let s = value.trim();
        if let Some((h, l)) = s.split_once(':') {
            let strip = |p: &str| {
                let p = p.trim();
                p.strip_prefix("0x")
                    .or_else(|| p.strip_prefix("0X"))
                    .unwrap_or(p)
                    .to_string()
            };
            let high = u8::from_str_radix(&strip(h), 16).map_err(|_| invalid())?;
            let low = u8::from_str_radix(&strip(l), 16).map_err(|_| invalid())?;
            return Ok(Tsap(high, low));
        }
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u16::from_str_radix(hex, 16).map(Tsap::from).map_err(|_| invalid());
        }
        s.parse::<u16>().map(Tsap::from).map_err(|_| invalid())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsapPair {
    pub local: Tsap,
    pub remote: Tsap,
}

/// Local TSAP used for rack/slot addressing.
pub const LOCAL_TSAP: Tsap = Tsap(0x01, 0x00);

/// Validate rack (0..=7) and slot (0..=31) as they share one byte.
pub fn validate_rack_slot(rack: u8, slot: u8) -> Result<()> {
    if rack > 7 {
        return Err(Error::InvalidRack(rack));
    }
    if slot > 31 {
        return Err(Error::InvalidSlot(slot));
    }
    Ok(())
}

/// Derive the TSAP pair for rack/slot addressing.
///
/// Remote TSAP is `(connection_type << 8) | (rack * 0x20 + slot)`.
pub fn rack_slot_tsap_pair(
    connection_type: ConnectionType,
    rack: u8,
    slot: u8,
) -> Result<TsapPair> {
    validate_rack_slot(rack, slot)?;
    Ok(TsapPair {
        local: LOCAL_TSAP,
        remote: Tsap(connection_type as u8, (rack << 5) | slot),
    })
}
