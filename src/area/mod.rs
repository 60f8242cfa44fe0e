//! Packing of tag addresses into frame-sized requests.
//!
//! Reads are packed greedily into [`ReadArea`]s over the sorted tag set;
//! writes are merged into a [`WriteQueue`] as they arrive.

mod read;
mod write;

pub use read::{pack_reads, ReadArea, GAP_TOLERANCE};
pub use write::{merge, MergeCase, PendingWrite, WriteArea, WriteQueue};
