//! Bounded little-endian reader over an in-memory buffer.

use crate::{Error, Result};
use bytes::Buf;

/// Reads fixed-width little-endian values from a byte slice, failing with a
/// format error (carrying the byte offset) instead of panicking when the
/// buffer runs out.
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            buf: data,
            len: data.len(),
        }
    }

    /// Number of bytes consumed so far.
    pub(crate) fn position(&self) -> u64 {
        (self.len - self.buf.remaining()) as u64
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn require(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(Error::format(
                self.position(),
                format!(
                    "truncated {}: expected {} bytes, found {}",
                    what,
                    n,
                    self.buf.remaining()
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn read_bytes(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        self.require(n, what)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub(crate) fn read_u32(&mut self, what: &str) -> Result<u32> {
        self.require(4, what)?;
        Ok(self.buf.get_u32_le())
    }

    pub(crate) fn read_i32(&mut self, what: &str) -> Result<i32> {
        self.require(4, what)?;
        Ok(self.buf.get_i32_le())
    }

    pub(crate) fn read_u64(&mut self, what: &str) -> Result<u64> {
        self.require(8, what)?;
        Ok(self.buf.get_u64_le())
    }

    /// Read a signed count and reject negative values.
    pub(crate) fn read_count(&mut self, what: &str) -> Result<usize> {
        let offset = self.position();
        let n = self.read_i32(what)?;
        usize::try_from(n)
            .map_err(|_| Error::format(offset, format!("invalid {}: {}", what, n)))
    }

    /// Check that `count` items of `item_size` bytes can still be read, so a
    /// corrupt count fails before any allocation.
    pub(crate) fn require_items(&self, count: usize, item_size: usize, what: &str) -> Result<()> {
        let needed = count.checked_mul(item_size).unwrap_or(usize::MAX);
        self.require(needed, what)
    }
}
