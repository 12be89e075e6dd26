use super::bins::{MIN_BIN_SIZE, PSEUDO_BIN, bin_seq_range};
use crate::cursor::Cursor;
use crate::offset::{VirtualOffset, VirtualRange};
use crate::{Error, Result};

/// One bin of the hierarchical index with the chunks that may hold its
/// records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinEntry {
    pub bin_number: u32,
    pub chunks: Vec<VirtualRange>,
}

impl BinEntry {
    pub fn new(bin_number: u32, chunks: Vec<VirtualRange>) -> Self {
        Self { bin_number, chunks }
    }

    /// Genomic interval covered by this bin.
    pub fn seq_range(&self) -> std::ops::Range<u64> {
        bin_seq_range(self.bin_number)
    }
}

/// Index data for one reference sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    /// Sorted by bin number; the pseudo-bin is not included.
    pub bins: Vec<BinEntry>,
    /// Lowest virtual offset of a record overlapping each 16 Kbp window.
    pub linear_index: Vec<VirtualOffset>,
    pub unmapped_chunk: Option<VirtualRange>,
    pub mapped_count: u64,
    pub unmapped_count: u64,
    /// Highest coordinate covered by any bin or linear index window.
    pub estimated_length: u64,
}

impl ReferenceIndex {
    pub(crate) fn read(cursor: &mut Cursor<'_>) -> Result<Self> {
        let n_bin = cursor.read_count("bin count")?;
        // each bin needs at least its number and chunk count
        cursor.require_items(n_bin, 8, "bins")?;

        let mut bins = Vec::with_capacity(n_bin);
        let mut unmapped_chunk = None;
        let mut mapped_count = 0;
        let mut unmapped_count = 0;
        let mut estimated_length = 0;

        for _ in 0..n_bin {
            let bin_offset = cursor.position();
            let bin_number = cursor.read_u32("bin number")?;
            let n_chunk = cursor.read_count("chunk count")?;
            cursor.require_items(n_chunk, 16, "chunks")?;

            let mut chunks = Vec::with_capacity(n_chunk);
            for _ in 0..n_chunk {
                let start = VirtualOffset::from_raw(cursor.read_u64("chunk start")?);
                let end = VirtualOffset::from_raw(cursor.read_u64("chunk end")?);
                chunks.push(VirtualRange::new(start, end));
            }

            if bin_number == PSEUDO_BIN {
                if chunks.len() != 2 {
                    return Err(Error::format(
                        bin_offset,
                        format!(
                            "bad unmapped bin format: expected 2 chunks, found {}",
                            chunks.len()
                        ),
                    ));
                }
                unmapped_chunk = Some(chunks[0]);
                mapped_count = chunks[1].start.raw();
                unmapped_count = chunks[1].end.raw();
                continue;
            }

            estimated_length = estimated_length.max(bin_seq_range(bin_number).end);
            bins.push(BinEntry::new(bin_number, chunks));
        }
        bins.sort_by_key(|b| b.bin_number);

        let n_intv = cursor.read_count("linear index size")?;
        cursor.require_items(n_intv, 8, "linear index")?;
        let mut linear_index = Vec::with_capacity(n_intv);
        for _ in 0..n_intv {
            linear_index.push(VirtualOffset::from_raw(cursor.read_u64("linear index entry")?));
        }
        estimated_length = estimated_length.max(n_intv as u64 * u64::from(MIN_BIN_SIZE));

        Ok(Self {
            bins,
            linear_index,
            unmapped_chunk,
            mapped_count,
            unmapped_count,
            estimated_length,
        })
    }

    /// Index of the first bin whose number is `>= bin_number`.
    pub fn lower_bound(&self, bin_number: u32) -> usize {
        self.bins.partition_point(|b| b.bin_number < bin_number)
    }

    pub fn bin(&self, bin_number: u32) -> Option<&BinEntry> {
        let i = self.lower_bound(bin_number);
        self.bins.get(i).filter(|b| b.bin_number == bin_number)
    }

    /// Lowest chunk start and highest chunk end over all bins.
    pub fn total_file_range(&self) -> Option<VirtualRange> {
        let mut chunks = self.bins.iter().flat_map(|b| b.chunks.iter());
        let first = *chunks.next()?;
        Some(chunks.fold(first, |acc, c| {
            VirtualRange::new(acc.start.min(c.start), acc.end.max(c.end))
        }))
    }
}
