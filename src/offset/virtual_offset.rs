use noodles::bgzf::VirtualPosition;
use serde::Serialize;
use std::fmt;

/// Upper bound on the compressed size of one BGZF block.
pub const MAX_BLOCK_SIZE: u64 = 65536;

/// Position of a byte inside a BGZF stream.
///
/// The high 48 bits hold the file offset of a compressed block and the low
/// 16 bits the offset inside that block's decompressed data, so comparing the
/// raw values orders positions both physically and logically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Sentinel that compares greater than every real offset.
    pub const INVALID: Self = Self(u64::MAX);

    pub const fn new(compressed: u64, uncompressed: u16) -> Self {
        Self((compressed << 16) | uncompressed as u64)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn invalid() -> Self {
        Self::INVALID
    }

    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_invalid(self) -> bool {
        self.0 == u64::MAX
    }

    /// File offset of the compressed block.
    pub const fn compressed(self) -> u64 {
        self.0 >> 16
    }

    /// Offset inside the decompressed block.
    pub const fn uncompressed(self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl From<u64> for VirtualOffset {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<VirtualOffset> for u64 {
    fn from(offset: VirtualOffset) -> Self {
        offset.0
    }
}

impl From<VirtualPosition> for VirtualOffset {
    fn from(pos: VirtualPosition) -> Self {
        Self(u64::from(pos))
    }
}

impl From<VirtualOffset> for VirtualPosition {
    fn from(offset: VirtualOffset) -> Self {
        VirtualPosition::from(offset.0)
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "end")
        } else {
            write!(f, "{}:{}", self.compressed(), self.uncompressed())
        }
    }
}

/// Half-open range `[start, end)` of virtual offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VirtualRange {
    pub start: VirtualOffset,
    pub end: VirtualOffset,
}

impl VirtualRange {
    pub const fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Clip this range to `limit`; the result may be empty.
    pub fn clip(&self, limit: &VirtualRange) -> VirtualRange {
        VirtualRange {
            start: self.start.max(limit.start),
            end: self.end.min(limit.end),
        }
    }

    /// Compressed file bytes to fetch for this range, or an open end when
    /// the range runs to the end of the stream.
    ///
    /// A range ending inside a block needs that whole block, so the end is
    /// padded by the maximum BGZF block size; callers clamp it to the file
    /// length.
    pub fn compressed_span(&self) -> (u64, Option<u64>) {
        let end = if self.end.is_invalid() {
            None
        } else if self.end.uncompressed() == 0 {
            Some(self.end.compressed())
        } else {
            Some(self.end.compressed() + MAX_BLOCK_SIZE)
        };
        (self.start.compressed(), end)
    }
}

impl From<std::ops::Range<VirtualOffset>> for VirtualRange {
    fn from(range: std::ops::Range<VirtualOffset>) -> Self {
        Self::new(range.start, range.end)
    }
}

impl From<VirtualRange> for std::ops::Range<VirtualOffset> {
    fn from(range: VirtualRange) -> Self {
        range.start..range.end
    }
}

impl fmt::Display for VirtualRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_offset_parts() {
        let offset = VirtualOffset::new(1024, 512);
        assert_eq!(offset.compressed(), 1024);
        assert_eq!(offset.uncompressed(), 512);
        assert_eq!(offset.raw(), (1024 << 16) | 512);
    }

    #[test]
    fn test_virtual_offset_ordering() {
        let a = VirtualOffset::new(1000, 100);
        let b = VirtualOffset::new(1000, 200);
        let c = VirtualOffset::new(2000, 0);
        assert!(a < b);
        assert!(b < c);
        assert!(c < VirtualOffset::invalid());
        assert!(VirtualOffset::zero() < a);
    }

    #[test]
    fn test_invalid_is_distinct() {
        assert!(VirtualOffset::invalid().is_invalid());
        assert!(!VirtualOffset::new(u64::MAX >> 16, 0xfffe).is_invalid());
        assert_eq!(VirtualOffset::invalid().to_string(), "end");
    }

    #[test]
    fn test_bgzf_position_conversion() {
        let pos = VirtualPosition::from(0x0001_0002_0003u64);
        let offset = VirtualOffset::from(pos);
        assert_eq!(offset.raw(), 0x0001_0002_0003);
        assert_eq!(VirtualPosition::from(offset), pos);
    }

    #[test]
    fn test_range_clip() {
        let range = VirtualRange::new(VirtualOffset::new(10, 0), VirtualOffset::new(50, 0));
        let limit = VirtualRange::new(VirtualOffset::new(20, 0), VirtualOffset::invalid());
        let clipped = range.clip(&limit);
        assert_eq!(clipped.start, VirtualOffset::new(20, 0));
        assert_eq!(clipped.end, VirtualOffset::new(50, 0));

        let outside = VirtualRange::new(VirtualOffset::new(60, 0), VirtualOffset::invalid());
        assert!(range.clip(&outside).is_empty());
    }

    #[test]
    fn test_compressed_span() {
        let range = VirtualRange::new(VirtualOffset::new(100, 7), VirtualOffset::new(300, 0));
        assert_eq!(range.compressed_span(), (100, Some(300)));

        let partial = VirtualRange::new(VirtualOffset::new(100, 7), VirtualOffset::new(300, 9));
        assert_eq!(partial.compressed_span(), (100, Some(300 + MAX_BLOCK_SIZE)));

        let open = VirtualRange::new(VirtualOffset::new(100, 0), VirtualOffset::invalid());
        assert_eq!(open.compressed_span(), (100, None));
    }
}
