//! A BAM file paired with its index, ready for region queries.

use crate::header::FileHeader;
use crate::index::{EstimatedCoverage, GenomicIndex};
use crate::iter::AlignmentIterator;
use crate::query::FileRangeSet;
use crate::record::AlignmentRecordView;
use crate::transport::{BgzfTransport, BlockTransport};
use crate::types::ReferenceSummary;
use crate::{Error, Result};
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// A reference given by name or by position in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceId<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for ReferenceId<'a> {
    fn from(name: &'a str) -> Self {
        ReferenceId::Name(name)
    }
}

impl From<usize> for ReferenceId<'_> {
    fn from(index: usize) -> Self {
        ReferenceId::Index(index)
    }
}

/// Header and index of one BAM file. Queries against a file path open their
/// own handle, so any number of iterators can be live at once.
#[derive(Debug, Clone)]
pub struct IndexedBam {
    path: Option<PathBuf>,
    header: FileHeader,
    index: GenomicIndex,
}

impl IndexedBam {
    /// Pair an already parsed header and index. Queries need a transport from
    /// the caller; see [`query_with`](Self::query_with).
    pub fn new(header: FileHeader, index: GenomicIndex) -> Self {
        let bam = Self {
            path: None,
            header,
            index,
        };
        bam.check();
        bam
    }

    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(bam_path: P, index_path: Q) -> Result<Self> {
        let bam_path = bam_path.as_ref();
        let header = FileHeader::from_path(bam_path)?;
        let index = GenomicIndex::from_path(index_path)?;
        let bam = Self {
            path: Some(bam_path.to_path_buf()),
            header,
            index,
        };
        bam.check();
        Ok(bam)
    }

    fn check(&self) {
        for diagnostic in self.index.diagnostics() {
            tracing::warn!("index: {}", diagnostic);
        }
        if self.index.reference_count() != self.header.refs.len() {
            tracing::warn!(
                "index has {} references but the header declares {}",
                self.index.reference_count(),
                self.header.refs.len()
            );
        }
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn index(&self) -> &GenomicIndex {
        &self.index
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Header position of a reference; `None` for an unknown name or an
    /// index the header does not declare.
    pub fn resolve<'a>(&self, reference: impl Into<ReferenceId<'a>>) -> Option<usize> {
        match reference.into() {
            ReferenceId::Name(name) => self.header.reference_index(name),
            ReferenceId::Index(i) => (i < self.header.refs.len()).then_some(i),
        }
    }

    /// File ranges a query would scan.
    pub fn plan(&self, ref_index: usize, range: Range<u32>) -> Result<FileRangeSet> {
        FileRangeSet::plan(&self.index, ref_index, range)
    }

    /// Iterator over the records overlapping `range`, or `None` when the
    /// reference is unknown.
    pub fn query<'a>(
        &self,
        reference: impl Into<ReferenceId<'a>>,
        range: Range<u32>,
    ) -> Result<Option<AlignmentIterator<BgzfTransport<File>>>> {
        let Some(ref_index) = self.resolve(reference) else {
            return Ok(None);
        };
        let transport = self.open_transport()?;
        self.query_with(transport, ref_index, range).map(Some)
    }

    /// Same as [`query`](Self::query) over a transport the caller supplies.
    pub fn query_with<T: BlockTransport>(
        &self,
        transport: T,
        ref_index: usize,
        range: Range<u32>,
    ) -> Result<AlignmentIterator<T>> {
        let mut iter = AlignmentIterator::new(transport);
        iter.select(&self.index, ref_index, range)?;
        Ok(iter)
    }

    /// Every record in file order, unmapped ones included.
    pub fn query_all(&self) -> Result<AlignmentIterator<BgzfTransport<File>>> {
        let mut iter = AlignmentIterator::new(self.open_transport()?);
        iter.select_whole(&self.header)?;
        Ok(iter)
    }

    /// Call `f` for each record overlapping `range`. Returns the number of
    /// records visited, or `None` when the reference is unknown.
    pub fn for_each_overlap<'a, F>(
        &self,
        reference: impl Into<ReferenceId<'a>>,
        range: Range<u32>,
        mut f: F,
    ) -> Result<Option<usize>>
    where
        F: FnMut(AlignmentRecordView<'_>) -> Result<()>,
    {
        let Some(mut iter) = self.query(reference, range)? else {
            return Ok(None);
        };
        let mut count = 0;
        iter.for_each_overlap(|record| {
            count += 1;
            f(record)
        })?;
        Ok(Some(count))
    }

    pub fn estimated_coverage(&self, ref_index: usize, bucket_size: u32) -> Result<EstimatedCoverage> {
        self.index.estimated_coverage(ref_index, bucket_size)
    }

    /// One summary per header reference.
    pub fn summaries(&self) -> Vec<ReferenceSummary> {
        (0..self.header.refs.len())
            .map(|i| ReferenceSummary::new(i, &self.header, self.index.reference(i)))
            .collect()
    }

    fn open_transport(&self) -> Result<BgzfTransport<File>> {
        let path = self.path.as_ref().ok_or_else(|| {
            Error::InvalidInput("no BAM path to read from; use query_with".to_string())
        })?;
        BgzfTransport::open(path)
    }
}
