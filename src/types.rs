use crate::header::FileHeader;
use crate::index::{EstimatedCoverage, ReferenceIndex};
use crate::offset::{VirtualOffset, VirtualRange};
use crate::record::AlignmentRecordView;
use crate::{Error, Result};
use noodles::core::Region;
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// A reference name plus a 0-based half-open interval on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRegion {
    pub name: String,
    pub range: Range<u32>,
}

impl QueryRegion {
    pub fn whole(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            range: 0..u32::MAX,
        }
    }
}

/// Parses samtools-style `name[:start[-end]]` text, 1-based and inclusive.
impl FromStr for QueryRegion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let region: Region = s
            .parse()
            .map_err(|e| Error::InvalidRange(format!("{:?}: {}", s, e)))?;
        let name = String::from_utf8_lossy(region.name().as_ref()).into_owned();
        let interval = region.interval();

        let start = match interval.start() {
            Some(p) => u32::try_from(usize::from(p) - 1)
                .map_err(|_| Error::InvalidRange(format!("{:?}: start out of range", s)))?,
            None => 0,
        };
        let end = match interval.end() {
            Some(p) => u32::try_from(usize::from(p))
                .map_err(|_| Error::InvalidRange(format!("{:?}: end out of range", s)))?,
            None => u32::MAX,
        };
        if start >= end {
            return Err(Error::InvalidRange(format!(
                "{:?}: start {} is after end {}",
                s,
                start + 1,
                end
            )));
        }
        Ok(Self {
            name,
            range: start..end,
        })
    }
}

/// Per-reference figures from the header and the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceSummary {
    pub index: usize,
    pub name: String,
    pub length: u32,
    pub estimated_length: u64,
    pub bin_count: usize,
    pub mapped_count: u64,
    pub unmapped_count: u64,
    pub unmapped_chunk: Option<VirtualRange>,
    pub total_file_range: Option<VirtualRange>,
}

impl ReferenceSummary {
    pub fn new(index: usize, header: &FileHeader, reference: Option<&ReferenceIndex>) -> Self {
        let meta = header.reference(index);
        Self {
            index,
            name: meta.map(|m| m.name.clone()).unwrap_or_default(),
            length: meta.map_or(0, |m| m.length),
            estimated_length: reference.map_or(0, |r| r.estimated_length),
            bin_count: reference.map_or(0, |r| r.bins.len()),
            mapped_count: reference.map_or(0, |r| r.mapped_count),
            unmapped_count: reference.map_or(0, |r| r.unmapped_count),
            unmapped_chunk: reference.and_then(|r| r.unmapped_chunk),
            total_file_range: reference.and_then(|r| r.total_file_range()),
        }
    }
}

impl fmt::Display for ReferenceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.name,
            self.length,
            self.estimated_length,
            self.bin_count,
            self.mapped_count,
            self.unmapped_count
        )?;
        match self.total_file_range {
            Some(range) => write!(f, "\t{}\t{}", range.start, range.end),
            None => write!(f, "\t*\t*"),
        }
    }
}

/// One range of a query plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlannedRange {
    pub start: VirtualOffset,
    pub end: VirtualOffset,
    pub compressed_start: u64,
    /// `None` when the range runs to the end of the file.
    pub compressed_end: Option<u64>,
}

impl From<VirtualRange> for PlannedRange {
    fn from(range: VirtualRange) -> Self {
        let (compressed_start, compressed_end) = range.compressed_span();
        Self {
            start: range.start,
            end: range.end,
            compressed_start,
            compressed_end,
        }
    }
}

impl fmt::Display for PlannedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}\t", self.start, self.end, self.compressed_start)?;
        match self.compressed_end {
            Some(end) => write!(f, "{}", end),
            None => write!(f, "*"),
        }
    }
}

/// Owned, printable form of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlignmentSummary {
    pub name: String,
    pub flags: u16,
    pub reference: Option<String>,
    /// 0-based; `-1` when unplaced.
    pub pos: i32,
    pub map_quality: u8,
    pub cigar: String,
    pub next_reference: Option<String>,
    pub next_pos: i32,
    pub template_len: i32,
    pub sequence: String,
    pub quality: String,
    pub read_group: Option<String>,
}

impl AlignmentSummary {
    /// With `trimmed` set the CIGAR leaves out its clipping operations.
    pub fn from_view(
        view: &AlignmentRecordView<'_>,
        header: &FileHeader,
        trimmed: bool,
    ) -> Result<Self> {
        let name_of = |id: i32| {
            usize::try_from(id)
                .ok()
                .and_then(|i| header.reference(i))
                .map(|r| r.name.clone())
        };
        let qual = view.quality_scores();
        let quality = if qual.is_empty() || qual.iter().all(|&q| q == 0xff) {
            "*".to_string()
        } else {
            qual.iter().map(|&q| (q.saturating_add(33)) as char).collect()
        };
        Ok(Self {
            name: view.read_name_str().into_owned(),
            flags: view.flags().bits(),
            reference: name_of(view.ref_index()),
            pos: view.pos(),
            map_quality: view.map_quality(),
            cigar: if trimmed {
                view.to_trimmed_cigar_string()
            } else {
                view.to_cigar_string()
            },
            next_reference: name_of(view.next_ref_index()),
            next_pos: view.next_pos(),
            template_len: view.template_len(),
            sequence: view.sequence().to_string(),
            quality,
            read_group: view.read_group()?.map(str::to_string),
        })
    }
}

/// SAM-like tab-separated line: 1-based positions, `*` for missing values and
/// `=` for a mate on the same reference.
impl fmt::Display for AlignmentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let next_reference = match (&self.next_reference, &self.reference) {
            (Some(next), Some(this)) if next == this => "=",
            (Some(next), _) => next.as_str(),
            (None, _) => "*",
        };
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.name,
            self.flags,
            self.reference.as_deref().unwrap_or("*"),
            self.pos + 1,
            self.map_quality,
            self.cigar,
            next_reference,
            self.next_pos + 1,
            self.template_len,
            self.sequence,
            self.quality
        )?;
        if let Some(rg) = &self.read_group {
            write!(f, "\tRG:Z:{}", rg)?;
        }
        Ok(())
    }
}

/// Estimated coverage of one reference, ready for output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub reference: String,
    pub length: u64,
    pub bucket_size: u32,
    pub values: Vec<u64>,
    pub scaled: Vec<u8>,
}

impl CoverageReport {
    pub fn new(reference: &str, header_length: u32, coverage: &EstimatedCoverage) -> Self {
        Self {
            reference: reference.to_string(),
            length: coverage.covered_length(u64::from(header_length)),
            bucket_size: coverage.bucket_size,
            values: coverage.values.clone(),
            scaled: coverage.scaled(),
        }
    }
}
