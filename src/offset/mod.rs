//! Positions inside a BGZF stream and sets of ranges over them.
//!
//! - [`VirtualOffset`] - compressed block offset plus in-block offset
//! - [`VirtualRange`] - half-open `[start, end)` pair of virtual offsets
//! - [`RangeUnion`] - merging set of disjoint ranges, generic over the
//!   position type

mod union;
mod virtual_offset;

pub use union::RangeUnion;
pub use virtual_offset::{MAX_BLOCK_SIZE, VirtualOffset, VirtualRange};
