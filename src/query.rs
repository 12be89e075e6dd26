//! Translation of a reference interval into the virtual-offset ranges of the
//! BAM file that can hold overlapping records.

use crate::header::FileHeader;
use crate::index::GenomicIndex;
use crate::index::bins::{BIN_NUMBER_BASE, MIN_SHIFT, NUM_LEVELS, level_bins};
use crate::offset::{RangeUnion, VirtualOffset, VirtualRange};
use crate::Result;
use std::ops::Range;

/// Merged, ordered set of virtual-offset ranges to scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRangeSet {
    ranges: RangeUnion<VirtualOffset>,
}

impl FileRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ranges for records of reference `ref_index` that may overlap the
    /// half-open interval `range`.
    pub fn plan(index: &GenomicIndex, ref_index: usize, range: Range<u32>) -> Result<Self> {
        let mut set = Self::new();
        set.add_ranges(index, ref_index, range)?;
        Ok(set)
    }

    /// Everything from the first alignment to the end of the file.
    pub fn whole(header: &FileHeader) -> Self {
        let mut set = Self::new();
        set.add_whole(header);
        set
    }

    pub fn add_whole(&mut self, header: &FileHeader) {
        self.ranges
            .add_range(header.align_start..VirtualOffset::invalid());
    }

    /// Add the ranges for one more query; repeated calls accumulate.
    pub fn add_ranges(
        &mut self,
        index: &GenomicIndex,
        ref_index: usize,
        range: Range<u32>,
    ) -> Result<()> {
        if range.start >= range.end {
            return Ok(());
        }
        let reference = index.require_reference(ref_index)?;
        let from = range.start;
        let to = u64::from(range.end).min(reference.estimated_length);
        if to <= u64::from(from) {
            return Ok(());
        }
        // inclusive last position; `to` fits in u32 as it is at most range.end
        let last = (to - 1) as u32;

        let limit_start = reference
            .linear_index
            .get((from >> MIN_SHIFT) as usize)
            .copied()
            .unwrap_or_else(VirtualOffset::zero);
        // records of the window after `last` cannot overlap the query
        let end_bin = BIN_NUMBER_BASE + (last >> MIN_SHIFT) + 1;
        let limit_end = reference
            .bins
            .get(reference.lower_bound(end_bin))
            .and_then(|bin| bin.chunks.first())
            .map_or_else(VirtualOffset::invalid, |chunk| chunk.start);
        let limit = VirtualRange::new(limit_start, limit_end);

        let mut chunks = Vec::new();
        for level in 0..NUM_LEVELS {
            let (first_bin, last_bin) = level_bins(from, last, level);
            let start = reference.lower_bound(first_bin);
            for bin in reference.bins[start..]
                .iter()
                .take_while(|b| b.bin_number <= last_bin)
            {
                chunks.extend(
                    bin.chunks
                        .iter()
                        .map(|c| c.clip(&limit))
                        .filter(|c| !c.is_empty()),
                );
            }
        }
        chunks.sort();

        self.add_sorted(&chunks);
        tracing::debug!(
            "planned reference {} [{}, {}): {} chunks, {} ranges in set",
            ref_index,
            from,
            to,
            chunks.len(),
            self.ranges.len()
        );
        Ok(())
    }

    /// Coalesce runs of overlapping or touching chunks before inserting them.
    fn add_sorted(&mut self, chunks: &[VirtualRange]) {
        let mut iter = chunks.iter().peekable();
        while let Some(first) = iter.next() {
            let start = first.start;
            let mut end = first.end;
            while let Some(next) = iter.next_if(|c| c.start <= end) {
                end = end.max(next.end);
            }
            self.ranges.add_range(start..end);
        }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = VirtualRange> + '_ {
        self.ranges.iter().map(VirtualRange::from)
    }

    pub fn to_vec(&self) -> Vec<VirtualRange> {
        self.iter().collect()
    }

    /// Compressed file byte spans to fetch, one per range. An open end means
    /// "to the end of the file".
    pub fn compressed_spans(&self) -> Vec<(u64, Option<u64>)> {
        self.iter().map(|r| r.compressed_span()).collect()
    }
}

/// Query interval of `window` bases from `pos`; a zero or overflowing window
/// runs to the end of the reference.
pub fn window_range(pos: u32, window: u32) -> Range<u32> {
    match pos.checked_add(window) {
        Some(end) if window > 0 && end < u32::MAX => pos..end,
        _ => pos..u32::MAX,
    }
}
