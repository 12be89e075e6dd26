//! Access to the decompressed byte stream of a block-compressed file.
//!
//! The query engine never touches files or decompression itself. It issues
//! logical operations against a [`BlockTransport`]: position at a virtual
//! offset, read bytes, and ask whether the current planned range still has
//! data.

mod bgzf;

pub use bgzf::BgzfTransport;

use crate::Result;
use crate::offset::VirtualOffset;

/// One exclusive session onto a block-compressed stream.
///
/// Implementations are not expected to be shareable across threads;
/// concurrent queries open independent sessions.
pub trait BlockTransport {
    /// Position the stream so the next read begins at `start`. Availability
    /// checks made after this call do not look at or beyond `limit`.
    fn seek(&mut self, start: VirtualOffset, limit: VirtualOffset) -> Result<()>;

    /// Fill `buf` completely. Running out of data is a format error.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Whether more bytes can be read before reaching the limit set by the
    /// last [`seek`](Self::seek).
    fn has_available_bytes(&mut self) -> Result<bool>;

    fn virtual_position(&self) -> VirtualOffset;

    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }
}
