use super::super::{
    error::{Error, Result},
    frame::be,
};
use bytes::Bytes;

/// SZL id: module identification
pub const SZL_MODULE_IDENTIFICATION: u16 = 0x0011;
/// SZL id: component identification
pub const SZL_COMPONENT_IDENTIFICATION: u16 = 0x001C;
/// SZL id: memory areas
pub const SZL_MEMORY_AREAS: u16 = 0x0113;

/// A complete Read-SZL answer with the records of every data unit joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SzlResponse {
    pub id: u16,
    pub index: u16,
    /// Length of one record in bytes
    pub record_len: u16,
    /// Number of records announced by the PLC
    pub record_count: u16,
    pub records: Bytes,
}

impl SzlResponse {
    /// Split the 8-byte SZL header off the first data unit.
    pub fn from_first_unit(unit: &[u8]) -> Result<(Self, usize)> {
        let header = SzlResponse {
            id: be::get_u16(unit, 0)?,
            index: be::get_u16(unit, 2)?,
            record_len: be::get_u16(unit, 4)?,
            record_count: be::get_u16(unit, 6)?,
            records: Bytes::new(),
        };
        Ok((header, 8))
    }

    /// Iterate complete records; a trailing partial record is ignored.
    pub fn records(&self) -> impl Iterator<Item = &[u8]> {
        let len = (self.record_len as usize).max(1);
        self.records.chunks_exact(len)
    }

    fn record_with_index(&self, index: u16) -> Option<&[u8]> {
        self.records()
            .find(|r| be::get_u16(r, 0).map(|i| i == index).unwrap_or(false))
    }
}

/// Informational device identity read once after connecting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub module_name: Option<String>,
    pub module_type: Option<String>,
    pub order_number: Option<String>,
    pub hardware_version: Option<String>,
    pub firmware_version: Option<String>,
    pub serial_number: Option<String>,
    /// Work memory size in bytes
    pub memory_size: Option<u32>,
}

fn text(raw: &[u8]) -> Option<String> {
    let s: String = raw
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect();
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl DeviceIdentity {
    /// Order number and versions from SZL 0x0011 (28-byte records:
    /// index, 20 byte order number, module type, version words).
    pub fn apply_module_identification(&mut self, szl: &SzlResponse) -> Result<()> {
        expect_id(szl, SZL_MODULE_IDENTIFICATION)?;
        if let Some(module) = szl.record_with_index(0x0001) {
            self.order_number = module.get(2..22).and_then(text);
        }
        let hardware = szl
            .record_with_index(0x0006)
            .or_else(|| szl.record_with_index(0x0001));
        if let Some(r) = hardware {
            self.hardware_version = be::get_u16(r, 26).ok().map(|v| v.to_string());
        }
        if let Some(r) = szl.record_with_index(0x0007) {
            if r.len() >= 28 {
                self.firmware_version = Some(format!("V{}.{}.{}", r[25], r[26], r[27]));
            }
        }
        Ok(())
    }

    /// Names and serial number from SZL 0x001C (34-byte records: index and
    /// a 32 byte text).
    pub fn apply_component_identification(&mut self, szl: &SzlResponse) -> Result<()> {
        expect_id(szl, SZL_COMPONENT_IDENTIFICATION)?;
        for record in szl.records() {
            let value = record.get(2..).and_then(text);
            match be::get_u16(record, 0)? {
                0x0002 => self.module_name = value,
                0x0005 => self.serial_number = value,
                0x0007 => self.module_type = value,
                _ => {}
            }
        }
        Ok(())
    }

    /// Work memory size from SZL 0x0113 index 1.
    pub fn apply_memory_areas(&mut self, szl: &SzlResponse) -> Result<()> {
        expect_id(szl, SZL_MEMORY_AREAS)?;
        if let Some(record) = szl.records().next() {
            self.memory_size = Some(be::get_u32(record, 4)?);
        }
        Ok(())
    }
}

#[inline]
fn expect_id(szl: &SzlResponse, id: u16) -> Result<()> {
    // the PLC may set the high bits of the id in the answer
    if szl.id & 0x0FFF == id & 0x0FFF {
        Ok(())
    } else {
        Err(Error::ProtocolViolation {
            context: "SZL answer for another list id",
        })
    }
}

#[cfg(test)]
mod fixtures {
    use bytes::{BufMut, Bytes, BytesMut};

    fn record_0011(index: u16, order: &str, version: [u8; 2]) -> Vec<u8> {
        let mut r = Vec::with_capacity(28);
        r.extend_from_slice(&index.to_be_bytes());
        let mut mlfb = [b' '; 20];
        mlfb[..order.len()].copy_from_slice(order.as_bytes());
        r.extend_from_slice(&mlfb);
        r.extend_from_slice(&[0x00, 0xC0, 0x00, 0x00]);
        r.extend_from_slice(&version);
        r
    }

    /// Record bytes of an SZL 0x0011 answer for a fictitious CPU.
    pub fn module_identification_records() -> Bytes {
        let mut b = BytesMut::new();
        b.put_slice(&record_0011(0x0001, "6ES7 315-2EH14-0AB0", [0x00, 0x03]));
        b.put_slice(&record_0011(0x0006, "6ES7 315-2EH14-0AB0", [0x00, 0x04]));
        b.put_slice(&record_0011(0x0007, "", [0x00, 0x00]));
        // firmware bytes: last three of the record
        let len = b.len();
        b[len - 3..].copy_from_slice(&[3, 2, 6]);
        b.freeze()
    }

    pub fn component_identification_records() -> Bytes {
        let mut b = BytesMut::new();
        for (index, value) in [
            (2u16, "CPU 315-2 PN/DP"),
            (5, "S C-X4U421302009"),
            (7, "CPU 315-2 PN/DP"),
        ] {
            b.put_u16(index);
            let mut text = [0u8; 32];
            text[..value.len()].copy_from_slice(value.as_bytes());
            b.put_slice(&text);
        }
        b.freeze()
    }

    pub fn memory_area_records() -> Bytes {
        let mut b = BytesMut::new();
        b.put_u16(0x0001);
        b.put_u16(0x0001);
        b.put_u32(393_216);
        b.put_u32(1_000);
        b.put_u32(392_216);
        b.freeze()
    }
}
