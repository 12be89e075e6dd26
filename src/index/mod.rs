//! BAM index (`.bai`) parsing and per-reference queries.
//!
//! The index holds, for every reference sequence, a hierarchical bin table,
//! a linear index of 16 Kbp windows and the unmapped-read bookkeeping carried
//! by the pseudo-bin. It is parsed once and then shared read-only by every
//! query against the file.
//!
//! # Format
//!
//! ```text
//! magic[4]         "BAI\1"
//! n_ref[4]         int32
//! per reference:
//!   n_bin[4]       int32
//!   per bin:
//!     bin[4]       uint32
//!     n_chunk[4]   int32
//!     chunks       n_chunk x (uint64 start, uint64 end)
//!   n_intv[4]      int32
//!   intervals      n_intv x uint64
//! n_no_coor[8]     uint64, optional
//! ```

pub mod bins;
mod reference;

pub use reference::{BinEntry, ReferenceIndex};

use crate::cursor::Cursor;
use crate::offset::{VirtualOffset, VirtualRange};
use crate::{Error, Result};
use bins::{MIN_BIN_SIZE, bin_seq_range};
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"BAI\x01";

/// Weight given to in-block offsets when estimating file positions.
const ESTIMATED_COMPRESSION: f64 = 0.25;

/// Non-fatal observation made while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Bytes left over after the index body; some writers append private
    /// data there. The contents are discarded.
    TrailingBytes { offset: u64, count: u64 },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::TrailingBytes { offset, count } => {
                write!(f, "extra {} bytes in BAM index at byte {}", count, offset)
            }
        }
    }
}

/// Parsed BAM index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenomicIndex {
    refs: Vec<ReferenceIndex>,
    no_coordinate_count: Option<u64>,
    diagnostics: Vec<Diagnostic>,
}

impl GenomicIndex {
    pub fn new(refs: Vec<ReferenceIndex>, no_coordinate_count: Option<u64>) -> Self {
        Self {
            refs,
            no_coordinate_count,
            diagnostics: Vec::new(),
        }
    }

    /// Parse a complete index file image.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let magic = cursor.read_bytes(4, "magic")?;
        if magic != MAGIC {
            return Err(Error::format(
                0,
                format!(
                    "bad index magic: expected {:?}, found {:?}",
                    String::from_utf8_lossy(MAGIC),
                    String::from_utf8_lossy(magic)
                ),
            ));
        }

        let n_ref = cursor.read_count("reference count")?;
        // each reference needs at least its bin and interval counts
        cursor.require_items(n_ref, 8, "references")?;
        let mut refs = Vec::with_capacity(n_ref);
        for _ in 0..n_ref {
            refs.push(ReferenceIndex::read(&mut cursor)?);
        }

        let mut no_coordinate_count = None;
        if cursor.remaining() >= 8 {
            no_coordinate_count = Some(cursor.read_u64("unplaced read count")?);
        }

        let mut diagnostics = Vec::new();
        if cursor.remaining() > 0 {
            diagnostics.push(Diagnostic::TrailingBytes {
                offset: cursor.position(),
                count: cursor.remaining() as u64,
            });
        }

        Ok(Self {
            refs,
            no_coordinate_count,
            diagnostics,
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let index = Self::parse(&data)?;
        tracing::debug!(
            "parsed index {:?}: {} references",
            path.as_ref(),
            index.reference_count()
        );
        Ok(index)
    }

    pub fn references(&self) -> &[ReferenceIndex] {
        &self.refs
    }

    pub fn reference_count(&self) -> usize {
        self.refs.len()
    }

    pub fn reference(&self, ref_index: usize) -> Option<&ReferenceIndex> {
        self.refs.get(ref_index)
    }

    /// Like [`reference`](Self::reference) but an unknown index is an error.
    pub fn require_reference(&self, ref_index: usize) -> Result<&ReferenceIndex> {
        self.refs.get(ref_index).ok_or_else(|| {
            Error::InvalidInput(format!(
                "bad reference sequence index {} (index has {})",
                ref_index,
                self.refs.len()
            ))
        })
    }

    /// Reads without a coordinate, when the index records it.
    pub fn no_coordinate_count(&self) -> Option<u64> {
        self.no_coordinate_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn total_file_range(&self, ref_index: usize) -> Result<Option<VirtualRange>> {
        Ok(self.require_reference(ref_index)?.total_file_range())
    }

    /// Approximate number of compressed bytes per `bucket_size` window.
    ///
    /// Built from the chunks of finest-level bins only, so it reflects data
    /// volume rather than exact read depth. `bucket_size` must be a positive
    /// multiple of 16384.
    pub fn estimated_coverage(
        &self,
        ref_index: usize,
        bucket_size: u32,
    ) -> Result<EstimatedCoverage> {
        if bucket_size == 0 || bucket_size % MIN_BIN_SIZE != 0 {
            return Err(Error::InvalidInput(format!(
                "bucket size must be a positive multiple of {}, got {}",
                MIN_BIN_SIZE, bucket_size
            )));
        }
        let windows_per_bucket = (bucket_size / MIN_BIN_SIZE) as usize;

        let mut values = Vec::new();
        for bin in &self.require_reference(ref_index)?.bins {
            let range = bin_seq_range(bin.bin_number);
            if range.end - range.start != u64::from(MIN_BIN_SIZE) {
                continue;
            }
            let bucket = (range.start / u64::from(MIN_BIN_SIZE)) as usize / windows_per_bucket;
            if bucket >= values.len() {
                values.resize(bucket + 1, 0);
            }
            values[bucket] += bin.chunks.iter().map(estimated_size).sum::<u64>();
        }
        Ok(EstimatedCoverage {
            bucket_size,
            values,
        })
    }
}

/// Approximate data volume per fixed-size window of one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimatedCoverage {
    pub bucket_size: u32,
    pub values: Vec<u64>,
}

impl EstimatedCoverage {
    pub fn max(&self) -> u64 {
        self.values.iter().copied().max().unwrap_or(0)
    }

    /// Values mapped onto `0..=255` relative to the largest one.
    pub fn scaled(&self) -> Vec<u8> {
        let max = self.max();
        if max == 0 {
            return vec![0; self.values.len()];
        }
        self.values
            .iter()
            .map(|&v| ((v as f64 * 255.0) / max as f64).round() as u8)
            .collect()
    }

    /// Length of sequence the values describe. Falls back to the span of the
    /// buckets when the reference length is unknown (zero).
    pub fn covered_length(&self, reference_length: u64) -> u64 {
        if reference_length > 0 {
            reference_length
        } else {
            self.values.len() as u64 * u64::from(self.bucket_size)
        }
    }
}

fn estimated_position(offset: VirtualOffset) -> u64 {
    offset.compressed() + (f64::from(offset.uncompressed()) * ESTIMATED_COMPRESSION) as u64
}

fn estimated_size(chunk: &VirtualRange) -> u64 {
    let start = estimated_position(chunk.start);
    let end = estimated_position(chunk.end);
    end.saturating_sub(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::IndexBuilder;

    #[test]
    fn test_bad_magic() {
        let err = GenomicIndex::parse(b"BAM\x01\0\0\0\0").unwrap_err();
        match err {
            Error::Format { offset, message } => {
                assert_eq!(offset, 0);
                assert!(message.contains("expected"));
                assert!(message.contains("BAM"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_index() {
        let index = GenomicIndex::parse(&IndexBuilder::new().build()).unwrap();
        assert_eq!(index.reference_count(), 0);
        assert_eq!(index.no_coordinate_count(), None);
        assert!(index.diagnostics().is_empty());
    }

    #[test]
    fn test_no_coordinate_count_and_trailing_bytes() {
        let mut builder = IndexBuilder::new();
        builder.reference();
        let mut data = builder.build();
        data.extend_from_slice(&42u64.to_le_bytes());
        let index = GenomicIndex::parse(&data).unwrap();
        assert_eq!(index.no_coordinate_count(), Some(42));
        assert!(index.diagnostics().is_empty());

        data.extend_from_slice(&[1, 2, 3]);
        let index = GenomicIndex::parse(&data).unwrap();
        assert_eq!(index.no_coordinate_count(), Some(42));
        assert_eq!(
            index.diagnostics(),
            &[Diagnostic::TrailingBytes {
                offset: (data.len() - 3) as u64,
                count: 3
            }]
        );
    }

    #[test]
    fn test_short_trailer_is_not_a_count() {
        let mut builder = IndexBuilder::new();
        builder.reference();
        let mut data = builder.build();
        data.extend_from_slice(&[9, 9, 9, 9]);
        let index = GenomicIndex::parse(&data).unwrap();
        assert_eq!(index.no_coordinate_count(), None);
        assert_eq!(index.diagnostics().len(), 1);
    }

    #[test]
    fn test_truncated_reference_fails() {
        let mut builder = IndexBuilder::new();
        builder
            .reference()
            .bin(4681, &[(VirtualOffset::new(0, 0), VirtualOffset::new(10, 0))]);
        let data = builder.build();
        let err = GenomicIndex::parse(&data[..data.len() - 6]).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_reference_count_overrun() {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&1000i32.to_le_bytes());
        assert!(GenomicIndex::parse(&data).unwrap_err().is_format());
    }

    #[test]
    fn test_require_reference_out_of_range() {
        let index = GenomicIndex::default();
        assert!(index.reference(0).is_none());
        assert!(matches!(
            index.require_reference(0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_estimated_coverage() {
        let mut builder = IndexBuilder::new();
        builder
            .reference()
            .bin(4681, &[(VirtualOffset::new(0, 0), VirtualOffset::new(1000, 0))])
            .bin(4683, &[(VirtualOffset::new(1000, 0), VirtualOffset::new(1500, 400))])
            .bin(0, &[(VirtualOffset::new(0, 0), VirtualOffset::new(9000, 0))]);
        let index = GenomicIndex::parse(&builder.build()).unwrap();

        let coverage = index.estimated_coverage(0, MIN_BIN_SIZE).unwrap();
        // bin 0 is coarse and does not contribute
        assert_eq!(coverage.values, vec![1000, 0, 600]);
        assert_eq!(coverage.scaled(), vec![255, 0, 153]);
        assert_eq!(coverage.covered_length(0), 3 * 16384);
        assert_eq!(coverage.covered_length(1_000_000), 1_000_000);

        let coarse = index.estimated_coverage(0, 4 * MIN_BIN_SIZE).unwrap();
        assert_eq!(coarse.values, vec![1600]);

        assert!(index.estimated_coverage(0, 1000).is_err());
        assert!(index.estimated_coverage(1, MIN_BIN_SIZE).is_err());
    }

    #[test]
    fn test_scaled_all_zero() {
        let coverage = EstimatedCoverage {
            bucket_size: MIN_BIN_SIZE,
            values: vec![0, 0],
        };
        assert_eq!(coverage.scaled(), vec![0, 0]);
    }

    #[test]
    fn test_estimated_size_of_backwards_chunk_is_zero() {
        let chunk = VirtualRange::new(VirtualOffset::new(10, 0), VirtualOffset::new(5, 0));
        assert_eq!(estimated_size(&chunk), 0);
    }
}
