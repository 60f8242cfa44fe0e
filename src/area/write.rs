use crate::{
    address::{Address, ElementType},
    protocol::error::{Error, Result},
};
use std::collections::VecDeque;

/// A pending write: a contiguous byte range with its payload, or a single bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteArea {
    /// Bit address, or a byte address whose length equals `data.len()`
    address: Address,
    data: Vec<u8>,
}

impl WriteArea {
    /// Write `data` at `address`. For byte, word and dword addresses the
    /// payload decides the span; for a bit address the first payload byte
    /// is the bit value (non-zero = set).
    pub fn new(address: Address, data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::ErrInvalidAddress(format!("{address}: empty write")));
        }
        if address.is_bit() {
            return Ok(Self {
                address,
                data: vec![(data[0] != 0) as u8],
            });
        }
        let length = u16::try_from(data.len())
            .map_err(|_| Error::ErrInvalidAddress(format!("{address}: write too long")))?;
        let span = Address::bytes(address.area(), address.db(), address.byte_offset(), length)?;
        Ok(Self {
            address: span,
            data: data.to_vec(),
        })
    }

    #[inline]
    pub fn address(&self) -> &Address {
        &self.address
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn is_bit(&self) -> bool {
        self.address.element() == ElementType::Bit
    }

    #[inline]
    pub fn start(&self) -> u32 {
        self.address.byte_offset()
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.start() + self.data.len() as u32
    }

    /// Whether both areas write at least one common byte. A bit area
    /// covers the byte holding its bit.
    pub fn overlaps(&self, other: &WriteArea) -> bool {
        self.address.same_memory(&other.address)
            && self.start() < other.end()
            && other.start() < self.end()
    }

    fn touches(&self, other: &WriteArea) -> bool {
        self.address.same_memory(&other.address)
            && !self.is_bit()
            && !other.is_bit()
            && other.start() <= self.end()
            && self.start() <= other.end()
    }

    /// Whether `incoming` can be merged into this area without exceeding
    /// the write `limit`.
    pub fn accepts(&self, incoming: &WriteArea, limit: usize) -> bool {
        if !self.touches(incoming) {
            return false;
        }
        let span = self.end().max(incoming.end()) - self.start().min(incoming.start());
        span as usize <= limit
    }

    fn with_span(&self, start: u32, data: Vec<u8>) -> WriteArea {
        let address = Address::bytes(
            self.address.area(),
            self.address.db(),
            start,
            data.len() as u16,
        )
        .unwrap_or(self.address);
        WriteArea { address, data }
    }
}

/// How an incoming write relates to the queued one it merges into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeCase {
    /// Starts before the queued range: prepend, keep the queued tail
    Before,
    /// Starts inside or at the end and runs past it: keep the head, append
    AfterExtends,
    /// Lies inside the queued range: overwrite in place
    Nested,
    /// Covers exactly the queued range: replace
    Equal,
}

impl MergeCase {
    pub fn classify(existing: &WriteArea, incoming: &WriteArea) -> Self {
        if incoming.start() < existing.start() {
            MergeCase::Before
        } else if incoming.start() == existing.start() && incoming.end() == existing.end() {
            MergeCase::Equal
        } else if incoming.end() <= existing.end() {
            MergeCase::Nested
        } else {
            MergeCase::AfterExtends
        }
    }
}

/// Merge `incoming` over `existing`; bytes of `incoming` win.
///
/// `None` when the two byte ranges neither overlap nor touch, live in
/// different memory, or either one is a bit area. The write limit is not
/// checked here, see [`WriteArea::accepts`].
pub fn merge(existing: &WriteArea, incoming: &WriteArea) -> Option<WriteArea> {
    if !existing.touches(incoming) {
        return None;
    }
    let (es, is) = (existing.start() as usize, incoming.start() as usize);
    let merged = match MergeCase::classify(existing, incoming) {
        MergeCase::Equal => incoming.clone(),
        MergeCase::Before => {
            let mut data = incoming.data.clone();
            let covered = incoming.end() as usize - es;
            if let Some(tail) = existing.data.get(covered..) {
                data.extend_from_slice(tail);
            }
            existing.with_span(incoming.start(), data)
        }
        MergeCase::Nested => {
            let mut data = existing.data.clone();
            let offset = is - es;
            data[offset..offset + incoming.data.len()].copy_from_slice(&incoming.data);
            existing.with_span(existing.start(), data)
        }
        MergeCase::AfterExtends => {
            let mut data = existing.data[..is - es].to_vec();
            data.extend_from_slice(&incoming.data);
            existing.with_span(existing.start(), data)
        }
    };
    Some(merged)
}

/// A queued area and everyone waiting for its outcome.
#[derive(Debug)]
pub struct PendingWrite<W> {
    pub area: WriteArea,
    pub waiters: Vec<W>,
}

/// FIFO of pending writes. A new write merges into the first queued area
/// that accepts it, unless a later queued area overlaps it (that area would
/// be written afterwards and undo the newer bytes); otherwise it is appended.
#[derive(Debug)]
pub struct WriteQueue<W> {
    pending: VecDeque<PendingWrite<W>>,
    limit: usize,
}

impl<W> WriteQueue<W> {
    pub fn new(limit: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            limit,
        }
    }

    /// Payload limit for merged areas; already queued areas keep their size.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn push(&mut self, area: WriteArea, waiter: W) {
        let limit = self.limit;
        let floor = self
            .pending
            .iter()
            .rposition(|p| p.area.overlaps(&area))
            .unwrap_or(0);
        let slot = self
            .pending
            .iter_mut()
            .skip(floor)
            .find(|p| p.area.accepts(&area, limit));
        if let Some(slot) = slot {
            if let Some(merged) = merge(&slot.area, &area) {
                slot.area = merged;
                slot.waiters.push(waiter);
                return;
            }
        }
        self.pending.push_back(PendingWrite {
            area,
            waiters: vec![waiter],
        });
    }

    /// Next area to write.
    pub fn pop(&mut self) -> Option<PendingWrite<W>> {
        self.pending.pop_front()
    }

    /// Remove every queued area.
    pub fn drain(&mut self) -> impl Iterator<Item = PendingWrite<W>> + '_ {
        self.pending.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingWrite<W>> {
        self.pending.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::parse;

    fn wa(addr: &str, data: &[u8]) -> WriteArea {
        WriteArea::new(parse(addr).unwrap(), data).unwrap()
    }

    #[test]
    fn test_merge_cases() {
        let existing = wa("DB1.DBB10", &[1, 2, 3, 4]); // [10, 14)

        let before = wa("DB1.DBB8", &[9, 9, 9]); // [8, 11)
        assert_eq!(MergeCase::classify(&existing, &before), MergeCase::Before);
        let m = merge(&existing, &before).unwrap();
        assert_eq!(m.start(), 8);
        assert_eq!(m.data(), &[9, 9, 9, 2, 3, 4]);
        assert_eq!(m.address().length(), 6);

        let after = wa("DB1.DBB12", &[7, 7, 7]); // [12, 15)
        assert_eq!(MergeCase::classify(&existing, &after), MergeCase::AfterExtends);
        let m = merge(&existing, &after).unwrap();
        assert_eq!(m.start(), 10);
        assert_eq!(m.data(), &[1, 2, 7, 7, 7]);

        let nested = wa("DB1.DBB11", &[5, 5]);
        assert_eq!(MergeCase::classify(&existing, &nested), MergeCase::Nested);
        assert_eq!(merge(&existing, &nested).unwrap().data(), &[1, 5, 5, 4]);

        let equal = wa("DB1.DBB10", &[8, 8, 8, 8]);
        assert_eq!(MergeCase::classify(&existing, &equal), MergeCase::Equal);
        assert_eq!(merge(&existing, &equal), Some(equal));
    }

    #[test]
    fn test_touching_ranges_merge() {
        let existing = wa("MB0", &[1, 2]);
        let after = wa("MB2", &[3]);
        assert!(existing.accepts(&after, 212));
        assert_eq!(merge(&existing, &after).unwrap().data(), &[1, 2, 3]);

        let before = wa("MB0", &[0]);
        let existing = wa("MB1", &[1]);
        assert!(existing.accepts(&before, 212));
        assert_eq!(merge(&existing, &before).unwrap().data(), &[0, 1]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = wa("MB0", &[1, 2, 3, 4]);
        for incoming in [wa("MB2", &[9, 9, 9]), wa("MB0", &[5]), wa("MB1", &[6, 6])] {
            let once = merge(&existing, &incoming).unwrap();
            assert_eq!(merge(&once, &incoming), Some(once));
        }
    }

    #[test]
    fn test_merge_rejects_disjoint_ranges() {
        let existing = wa("MB10", &[1]);
        assert_eq!(merge(&existing, &wa("MB0", &[2])), None);
        assert_eq!(merge(&existing, &wa("MB12", &[3, 3])), None);
        assert_eq!(merge(&existing, &wa("DB1.DBB10", &[4])), None);
        assert_eq!(merge(&existing, &wa("M10.3", &[1])), None);
        assert_eq!(merge(&wa("MB0", &[2]), &existing), None);
    }

    #[test]
    fn test_accepts_rules() {
        let a = wa("DB1.DBB0", &[0; 4]);
        assert!(!a.accepts(&wa("DB2.DBB0", &[1]), 212));
        assert!(!a.accepts(&wa("MB0", &[1]), 212));
        assert!(!a.accepts(&wa("DB1.DBB5", &[1]), 212));
        assert!(!a.accepts(&wa("DB1.DBX1.0", &[1]), 212));
        assert!(!a.accepts(&wa("DB1.DBB4", &[1; 4]), 6));
        assert!(a.accepts(&wa("DB1.DBB4", &[1; 2]), 6));
    }

    #[test]
    fn test_queue_merges_and_keeps_bits_apart() {
        let mut q: WriteQueue<u32> = WriteQueue::new(212);
        q.push(wa("MB0", &[1, 1]), 1);
        q.push(wa("MX0.1", &[1]), 2);
        q.push(wa("MB1", &[2, 2]), 3);
        q.push(wa("MB50", &[5]), 4);
        q.push(wa("MX0.1", &[0]), 5);
        assert_eq!(q.len(), 4);

        let first = q.pop().unwrap();
        assert_eq!(first.area.data(), &[1, 2, 2]);
        assert_eq!(first.waiters, vec![1, 3]);
        let bit = q.pop().unwrap();
        assert!(bit.area.is_bit());
        assert_eq!(bit.waiters, vec![2]);
        assert_eq!(q.pop().unwrap().waiters, vec![4]);
        assert_eq!(q.pop().unwrap().area.data(), &[0]);
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let mut q: WriteQueue<()> = WriteQueue::new(212);
        q.push(wa("DB3.DBW4", &[0x12, 0x34]), ());
        q.push(wa("DB3.DBB5", &[0xFF]), ());
        q.push(wa("DB3.DBW4", &[0xAB, 0xCD]), ());
        let p = q.pop().unwrap();
        assert_eq!(p.area.data(), &[0xAB, 0xCD]);
        assert_eq!(p.waiters.len(), 3);
    }

    /// Apply the queue in drain order to a memory image starting at byte 0.
    fn apply(q: &mut WriteQueue<()>, image: &mut [u8]) {
        while let Some(p) = q.pop() {
            let area = p.area;
            if area.is_bit() {
                let byte = &mut image[area.start() as usize];
                let mask = 1u8 << (area.address().bit_address() & 7);
                if area.data()[0] != 0 {
                    *byte |= mask;
                } else {
                    *byte &= !mask;
                }
            } else {
                let start = area.start() as usize;
                image[start..start + area.data().len()].copy_from_slice(area.data());
            }
        }
    }

    #[test]
    fn test_byte_write_after_bit_write_wins() {
        let mut q: WriteQueue<()> = WriteQueue::new(212);
        q.push(wa("MB0", &[0x00]), ());
        q.push(wa("MX0.1", &[1]), ());
        q.push(wa("MB0", &[0x00]), ());
        assert_eq!(q.len(), 3);

        let mut image = [0xFFu8];
        apply(&mut q, &mut image);
        assert_eq!(image, [0x00]);
    }

    #[test]
    fn test_newer_write_not_merged_ahead_of_overlapping_area() {
        // two areas kept apart by the limit, the second overlapping MB4
        let mut q: WriteQueue<()> = WriteQueue::new(4);
        q.push(wa("MB0", &[1, 1, 1, 1]), ());
        q.push(wa("MB3", &[2, 2, 2, 2]), ());
        assert_eq!(q.len(), 2);
        q.push(wa("MB3", &[9]), ());

        let mut image = [0u8; 8];
        apply(&mut q, &mut image);
        assert_eq!(image, [1, 1, 1, 9, 2, 2, 2, 0]);
    }

    #[test]
    fn test_bit_payload_normalized() {
        let bit = wa("M3.2", &[0x40]);
        assert_eq!(bit.data(), &[1]);
        assert!(WriteArea::new(parse("MB0").unwrap(), &[]).is_err());
    }
}
