use crate::address::Address;

/// Largest hole, in bytes, bridged between two addresses of one read.
pub const GAP_TOLERANCE: u32 = 32;

/// One packed ReadVar request covering several tag addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadArea {
    /// First member; carries the area and DB of the whole request
    start: Address,
    end: u32,
    members: Vec<Address>,
}

impl ReadArea {
    fn open(first: Address) -> Self {
        Self {
            start: first,
            end: first.end(),
            members: vec![first],
        }
    }

    /// Whether `candidate` has to go into a new area. Candidates arrive in
    /// address order, so they never start before this area.
    pub fn is_out_of_range(&self, candidate: &Address, limit: usize) -> bool {
        if !self.start.same_memory(candidate) {
            return true;
        }
        let end = self.end.max(candidate.end());
        if (end - self.start_byte()) as usize > limit {
            return true;
        }
        candidate.byte_offset() > self.end && candidate.byte_offset() - self.end > GAP_TOLERANCE
    }

    fn extend(&mut self, address: Address) {
        self.end = self.end.max(address.end());
        self.members.push(address);
    }

    /// Address the read starts at (area, DB and byte offset).
    #[inline]
    pub fn start(&self) -> &Address {
        &self.start
    }

    #[inline]
    pub fn start_byte(&self) -> u32 {
        self.start.byte_offset()
    }

    /// Span in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        (self.end - self.start_byte()) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.end
    }

    #[inline]
    pub fn members(&self) -> &[Address] {
        &self.members
    }

    /// Bytes of `member` within a buffer read for this area. `None` when the
    /// buffer came back too short to cover it.
    pub fn slice_for<'a>(&self, member: &Address, buffer: &'a [u8]) -> Option<&'a [u8]> {
        let offset = member.byte_offset().checked_sub(self.start_byte())? as usize;
        buffer.get(offset..offset + member.length() as usize)
    }
}

/// Pack addresses into read areas under the payload `limit`.
///
/// Addresses are sorted and de-duplicated first; the pass itself is a single
/// greedy sweep. A single address larger than `limit` gets an area of its
/// own, which the connection reads in several chunks.
pub fn pack_reads<I>(addresses: I, limit: usize) -> Vec<ReadArea>
where
    I: IntoIterator<Item = Address>,
{
    let mut sorted: Vec<Address> = addresses.into_iter().collect();
    sorted.sort();
    sorted.dedup();

    let mut areas: Vec<ReadArea> = Vec::new();
    for address in sorted {
        match areas.last_mut() {
            Some(area) if !area.is_out_of_range(&address, limit) => area.extend(address),
            _ => areas.push(ReadArea::open(address)),
        }
    }
    areas
}
