//! Forward iteration over the records overlapping a query.

use crate::header::FileHeader;
use crate::index::GenomicIndex;
use crate::offset::VirtualRange;
use crate::query::FileRangeSet;
use crate::record::{AlignmentRecord, AlignmentRecordView, FIXED_SIZE};
use crate::transport::BlockTransport;
use crate::{Error, Result};
use std::ops::Range;

/// Largest record body accepted before a length prefix is taken as corrupt.
pub const MAX_RECORD_SIZE: usize = 32 << 20;

#[derive(Debug, Clone)]
enum State {
    Unselected,
    Positioned,
    Done,
    Failed(Error),
}

/// Reference and interval every yielded record must overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Filter {
    ref_index: usize,
    range: Range<u32>,
}

/// Walks the planned ranges of a query through a [`BlockTransport`] and
/// stops on each record that overlaps the query.
///
/// Records come back in file order, which for a coordinate-sorted file is
/// ascending position. The iterator is single pass; calling
/// [`select`](Self::select) again restarts it from scratch. A decode error
/// is terminal and is returned again by every later call.
pub struct AlignmentIterator<T> {
    transport: T,
    ranges: Vec<VirtualRange>,
    next_range: usize,
    filter: Option<Filter>,
    current: Option<AlignmentRecord>,
    spare: Vec<u8>,
    /// The current record has not been handed out by `next` yet.
    pending: bool,
    state: State,
}

impl<T: BlockTransport> AlignmentIterator<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            ranges: Vec::new(),
            next_range: 0,
            filter: None,
            current: None,
            spare: Vec::new(),
            pending: false,
            state: State::Unselected,
        }
    }

    /// Position on the first record of reference `ref_index` overlapping
    /// `range`.
    pub fn select(&mut self, index: &GenomicIndex, ref_index: usize, range: Range<u32>) -> Result<()> {
        // a failed plan must not leave the previous query running
        self.reset();
        let ranges = match FileRangeSet::plan(index, ref_index, range.clone()) {
            Ok(ranges) => ranges,
            Err(e) => return Err(self.fail(e)),
        };
        self.start(ranges, Some(Filter { ref_index, range }))
    }

    /// Position on the first record of the file, with no filtering.
    pub fn select_whole(&mut self, header: &FileHeader) -> Result<()> {
        self.start(FileRangeSet::whole(header), None)
    }

    fn reset(&mut self) {
        self.ranges.clear();
        self.next_range = 0;
        self.filter = None;
        self.drop_current();
        self.pending = false;
        self.state = State::Unselected;
    }

    fn start(&mut self, ranges: FileRangeSet, filter: Option<Filter>) -> Result<()> {
        self.reset();
        self.ranges = ranges.to_vec();
        self.filter = filter;
        self.state = State::Positioned;

        match self.seek_next_range() {
            Ok(true) => {}
            Ok(false) => {
                self.state = State::Done;
                return Ok(());
            }
            Err(e) => return Err(self.fail(e)),
        }
        self.advance()?;
        self.pending = self.is_positioned();
        Ok(())
    }

    /// Move to the next overlapping record. Returns `false` once the planned
    /// ranges are exhausted.
    pub fn advance(&mut self) -> Result<bool> {
        match &self.state {
            State::Failed(e) => return Err(e.clone()),
            State::Unselected | State::Done => return Ok(false),
            State::Positioned => {}
        }
        self.pending = false;
        match self.find_next() {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.drop_current();
                self.state = State::Done;
                Ok(false)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, e: Error) -> Error {
        self.drop_current();
        self.state = State::Failed(e.clone());
        e
    }

    fn drop_current(&mut self) {
        if let Some(record) = self.current.take() {
            self.spare = record.into_bytes();
        }
    }

    fn find_next(&mut self) -> Result<bool> {
        loop {
            if !self.transport.has_available_bytes()? {
                if self.seek_next_range()? {
                    continue;
                }
                return Ok(false);
            }
            let record = self.read_record()?;
            let Some(filter) = &self.filter else {
                self.current = Some(record);
                return Ok(true);
            };

            let view = record.view();
            if usize::try_from(view.ref_index()).ok() != Some(filter.ref_index) {
                // sorted input: a different reference means the scan ran past ours
                return Ok(false);
            }
            let Ok(pos) = u32::try_from(view.pos()) else {
                self.spare = record.into_bytes();
                continue;
            };
            if pos >= filter.range.end {
                return Ok(false);
            }
            if pos < filter.range.start
                && pos.saturating_add(view.cigar_ref_span()) <= filter.range.start
            {
                self.spare = record.into_bytes();
                continue;
            }
            self.current = Some(record);
            return Ok(true);
        }
    }

    fn seek_next_range(&mut self) -> Result<bool> {
        let Some(range) = self.ranges.get(self.next_range).copied() else {
            return Ok(false);
        };
        self.next_range += 1;
        tracing::trace!("scanning range {} of {}: {}", self.next_range, self.ranges.len(), range);
        self.transport.seek(range.start, range.end)?;
        Ok(true)
    }

    fn read_record(&mut self) -> Result<AlignmentRecord> {
        let offset = self.transport.virtual_position();
        let mut buf = match self.current.take() {
            Some(record) => record.into_bytes(),
            None => std::mem::take(&mut self.spare),
        };
        buf.clear();

        let mut len = [0; 4];
        self.transport.read_exact(&mut len)?;
        let block_size = u32::from_le_bytes(len) as usize;
        if block_size < FIXED_SIZE {
            return Err(Error::format(
                offset.raw(),
                format!(
                    "bad record length at {}: expected at least {} bytes, found {}",
                    offset, FIXED_SIZE, block_size
                ),
            ));
        }
        if block_size > MAX_RECORD_SIZE {
            return Err(Error::format(
                offset.raw(),
                format!(
                    "bad record length at {}: expected at most {} bytes, found {}",
                    offset, MAX_RECORD_SIZE, block_size
                ),
            ));
        }
        buf.extend_from_slice(&len);
        buf.resize(4 + block_size, 0);
        self.transport.read_exact(&mut buf[4..])?;

        AlignmentRecord::new(buf).map_err(|e| match e {
            Error::Format { message, .. } => {
                Error::format(offset.raw(), format!("record at {}: {}", offset, message))
            }
            other => other,
        })
    }

    pub fn is_positioned(&self) -> bool {
        matches!(self.state, State::Positioned)
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// The error that stopped iteration, if any.
    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            State::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Record the iterator is positioned on.
    pub fn current(&self) -> Option<AlignmentRecordView<'_>> {
        self.current.as_ref().map(AlignmentRecord::view)
    }

    /// Pull the next overlapping record. The view borrows the iterator, so it
    /// must be dropped before the following call.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Result<AlignmentRecordView<'_>>> {
        if self.pending {
            self.pending = false;
        } else if let Err(e) = self.advance() {
            return Some(Err(e));
        }
        self.current().map(Ok)
    }

    /// Call `f` for every remaining overlapping record.
    pub fn for_each_overlap<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(AlignmentRecordView<'_>) -> Result<()>,
    {
        while let Some(record) = self.next() {
            f(record?)?;
        }
        Ok(())
    }

    /// Owned records as a std iterator. After an error it yields nothing more.
    pub fn into_records(self) -> Records<T> {
        Records {
            inner: self,
            fused: false,
        }
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

/// Iterator of owned records; see [`AlignmentIterator::into_records`].
pub struct Records<T> {
    inner: AlignmentIterator<T>,
    fused: bool,
}

impl<T: BlockTransport> Iterator for Records<T> {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        match self.inner.next()? {
            Ok(view) => Some(Ok(view.to_record())),
            Err(e) => {
                self.fused = true;
                Some(Err(e))
            }
        }
    }
}
