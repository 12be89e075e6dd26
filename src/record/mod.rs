//! Zero-copy decoding of BAM alignment records.
//!
//! ```text
//! block_size[4]     length of the rest of the record
//! refID[4]          @0
//! pos[4]            @4   0-based
//! l_read_name[1]    @8
//! mapq[1]           @9
//! bin[2]            @10
//! n_cigar_op[2]     @12
//! flag[2]           @14
//! l_seq[4]          @16
//! next_refID[4]     @20
//! next_pos[4]       @24
//! tlen[4]           @28
//! read_name         @32, NUL-terminated
//! cigar             n_cigar_op x uint32
//! seq               (l_seq + 1) / 2 bytes
//! qual              l_seq bytes
//! tags              to the end of the record
//! ```

pub mod cigar;
pub mod sequence;
pub mod tags;

pub use cigar::{Cigar, CigarOp, Kind, Segment};
pub use sequence::Sequence;
pub use tags::{Array, Tags, Value};

use crate::{Error, Result};
use std::borrow::Cow;
use std::fmt;

/// Size of the fixed part of a record body.
pub const FIXED_SIZE: usize = 32;

/// Flag bits of an alignment.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u16);

impl Flags {
    pub const PAIRED: u16 = 0x1;
    pub const PROPER_PAIR: u16 = 0x2;
    pub const UNMAPPED: u16 = 0x4;
    pub const MATE_UNMAPPED: u16 = 0x8;
    pub const REVERSE: u16 = 0x10;
    pub const MATE_REVERSE: u16 = 0x20;
    pub const FIRST_IN_PAIR: u16 = 0x40;
    pub const SECOND_IN_PAIR: u16 = 0x80;
    pub const SECONDARY: u16 = 0x100;
    pub const QC_FAIL: u16 = 0x200;
    pub const DUPLICATE: u16 = 0x400;
    pub const SUPPLEMENTARY: u16 = 0x800;

    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, bit: u16) -> bool {
        self.0 & bit == bit
    }

    pub fn is_paired(self) -> bool {
        self.contains(Self::PAIRED)
    }

    pub fn is_proper_pair(self) -> bool {
        self.contains(Self::PROPER_PAIR)
    }

    pub fn is_unmapped(self) -> bool {
        self.contains(Self::UNMAPPED)
    }

    pub fn is_mate_unmapped(self) -> bool {
        self.contains(Self::MATE_UNMAPPED)
    }

    pub fn is_reverse(self) -> bool {
        self.contains(Self::REVERSE)
    }

    pub fn is_mate_reverse(self) -> bool {
        self.contains(Self::MATE_REVERSE)
    }

    pub fn is_first_in_pair(self) -> bool {
        self.contains(Self::FIRST_IN_PAIR)
    }

    pub fn is_second_in_pair(self) -> bool {
        self.contains(Self::SECOND_IN_PAIR)
    }

    pub fn is_secondary(self) -> bool {
        self.contains(Self::SECONDARY)
    }

    pub fn is_qc_fail(self) -> bool {
        self.contains(Self::QC_FAIL)
    }

    pub fn is_duplicate(self) -> bool {
        self.contains(Self::DUPLICATE)
    }

    pub fn is_supplementary(self) -> bool {
        self.contains(Self::SUPPLEMENTARY)
    }

    /// `'-'` for reverse-strand alignments, `'+'` otherwise.
    pub fn strand(self) -> char {
        if self.is_reverse() { '-' } else { '+' }
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({:#06x})", self.0)
    }
}

/// End offsets (inside the body) of the variable-length sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    name_end: usize,
    cigar_end: usize,
    seq_end: usize,
    qual_end: usize,
}

impl Layout {
    fn compute(body: &[u8]) -> Result<Self> {
        if body.len() < FIXED_SIZE {
            return Err(Error::format(
                4,
                format!(
                    "truncated record: expected at least {} bytes, found {}",
                    FIXED_SIZE,
                    body.len()
                ),
            ));
        }
        let name_len = usize::from(body[8]);
        let n_cigar = usize::from(u16::from_le_bytes([body[12], body[13]]));
        let read_len = u32::from_le_bytes([body[16], body[17], body[18], body[19]]) as usize;

        let name_end = FIXED_SIZE + name_len;
        let cigar_end = name_end + 4 * n_cigar;
        let seq_end = cigar_end.checked_add(read_len.div_ceil(2));
        let qual_end = seq_end.and_then(|end| end.checked_add(read_len));
        match (seq_end, qual_end) {
            (Some(seq_end), Some(qual_end)) if qual_end <= body.len() => Ok(Self {
                name_end,
                cigar_end,
                seq_end,
                qual_end,
            }),
            _ => Err(Error::format(
                4,
                format!(
                    "truncated record: name {} + cigar {} ops + sequence {} bases need more than the {} bytes found",
                    name_len,
                    n_cigar,
                    read_len,
                    body.len()
                ),
            )),
        }
    }
}

fn split_record(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < 4 {
        return Err(Error::format(
            0,
            format!(
                "truncated record length: expected 4 bytes, found {}",
                bytes.len()
            ),
        ));
    }
    let block_size = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let body = &bytes[4..];
    if body.len() != block_size {
        return Err(Error::format(
            0,
            format!(
                "bad record length: expected {} bytes, found {}",
                block_size,
                body.len()
            ),
        ));
    }
    Ok(body)
}

/// Borrowed view over one encoded record, length prefix included.
///
/// Creating the view checks that every fixed and variable section fits in
/// the record; the tag block is only checked when it is walked.
#[derive(Clone, Copy)]
pub struct AlignmentRecordView<'a> {
    body: &'a [u8],
    layout: Layout,
}

impl<'a> AlignmentRecordView<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let body = split_record(bytes)?;
        let layout = Layout::compute(body)?;
        Ok(Self { body, layout })
    }

    fn i32_at(&self, at: usize) -> i32 {
        let b = &self.body[at..at + 4];
        i32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn u16_at(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.body[at], self.body[at + 1]])
    }

    /// Length of the record including its 4-byte prefix.
    pub fn encoded_len(&self) -> usize {
        self.body.len() + 4
    }

    /// Reference sequence index; -1 when unplaced.
    pub fn ref_index(&self) -> i32 {
        self.i32_at(0)
    }

    /// 0-based leftmost position; -1 when unplaced.
    pub fn pos(&self) -> i32 {
        self.i32_at(4)
    }

    pub fn read_name_len(&self) -> u8 {
        self.body[8]
    }

    pub fn map_quality(&self) -> u8 {
        self.body[9]
    }

    pub fn bin(&self) -> u16 {
        self.u16_at(10)
    }

    pub fn n_cigar_ops(&self) -> u16 {
        self.u16_at(12)
    }

    pub fn flags(&self) -> Flags {
        Flags(self.u16_at(14))
    }

    pub fn read_len(&self) -> u32 {
        let b = &self.body[16..20];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    pub fn next_ref_index(&self) -> i32 {
        self.i32_at(20)
    }

    pub fn next_pos(&self) -> i32 {
        self.i32_at(24)
    }

    pub fn template_len(&self) -> i32 {
        self.i32_at(28)
    }

    /// Read name without its terminator.
    pub fn read_name(&self) -> &'a [u8] {
        let name = &self.body[FIXED_SIZE..self.layout.name_end];
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        &name[..end]
    }

    pub fn read_name_str(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.read_name())
    }

    pub fn cigar(&self) -> Cigar<'a> {
        let name_end = self.layout.name_end;
        Cigar::new(
            &self.body[name_end..self.layout.cigar_end],
            4 + name_end as u64,
        )
    }

    pub fn sequence(&self) -> Sequence<'a> {
        Sequence::new(
            &self.body[self.layout.cigar_end..self.layout.seq_end],
            self.read_len() as usize,
        )
    }

    /// Raw Phred scores; `0xff` throughout when absent.
    pub fn quality_scores(&self) -> &'a [u8] {
        &self.body[self.layout.seq_end..self.layout.qual_end]
    }

    pub fn tags(&self) -> Tags<'a> {
        Tags::new(
            &self.body[self.layout.qual_end..],
            4 + self.layout.qual_end as u64,
        )
    }

    pub fn cigar_ref_span(&self) -> u32 {
        self.cigar().ref_span()
    }

    pub fn cigar_read_span(&self) -> u32 {
        self.cigar().read_span()
    }

    pub fn leading_soft_clip(&self) -> u32 {
        self.cigar().leading_soft_clip()
    }

    pub fn to_cigar_string(&self) -> String {
        self.cigar().to_cigar_string()
    }

    pub fn to_trimmed_cigar_string(&self) -> String {
        self.cigar().to_trimmed_cigar_string()
    }

    /// Aligned runs, with reference starts in reference coordinates.
    pub fn segments(&self) -> Result<Vec<Segment>> {
        self.cigar().segments(self.pos().max(0) as u32)
    }

    /// Half-open reference interval covered by the alignment, `None` when
    /// unplaced.
    pub fn ref_range(&self) -> Option<std::ops::Range<u32>> {
        let pos = u32::try_from(self.pos()).ok()?;
        Some(pos..pos.saturating_add(self.cigar_ref_span()))
    }

    pub fn read_group(&self) -> Result<Option<&'a str>> {
        self.tags().read_group()
    }

    pub fn to_record(&self) -> AlignmentRecord {
        let mut data = Vec::with_capacity(self.encoded_len());
        data.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        data.extend_from_slice(self.body);
        AlignmentRecord {
            data,
            layout: self.layout,
        }
    }
}

impl fmt::Debug for AlignmentRecordView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignmentRecordView")
            .field("name", &self.read_name_str())
            .field("ref_index", &self.ref_index())
            .field("pos", &self.pos())
            .field("cigar", &self.cigar())
            .field("flags", &self.flags())
            .finish()
    }
}

/// An alignment record that owns its bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct AlignmentRecord {
    data: Vec<u8>,
    layout: Layout,
}

impl AlignmentRecord {
    /// Take ownership of an encoded record, length prefix included.
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let layout = AlignmentRecordView::new(&data)?.layout;
        Ok(Self { data, layout })
    }

    pub fn view(&self) -> AlignmentRecordView<'_> {
        AlignmentRecordView {
            body: &self.data[4..],
            layout: self.layout,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for AlignmentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.view(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{RecordBuilder, TagBuilder};

    #[test]
    fn test_fixed_fields() {
        let bytes = RecordBuilder::new("read1", 2, 500_000, "5S95M")
            .unwrap()
            .flags(Flags::PAIRED | Flags::REVERSE | Flags::FIRST_IN_PAIR)
            .map_quality(60)
            .mate(3, 700_000)
            .template_len(-250)
            .bases("ACGT".repeat(25).as_bytes())
            .build();
        let record = AlignmentRecordView::new(&bytes).unwrap();

        assert_eq!(record.ref_index(), 2);
        assert_eq!(record.pos(), 500_000);
        assert_eq!(record.read_name(), b"read1");
        assert_eq!(record.read_name_len(), 6);
        assert_eq!(record.map_quality(), 60);
        assert_eq!(record.n_cigar_ops(), 2);
        assert_eq!(record.read_len(), 100);
        assert_eq!(record.next_ref_index(), 3);
        assert_eq!(record.next_pos(), 700_000);
        assert_eq!(record.template_len(), -250);
        assert_eq!(record.bin(), 4681 + 30);
        assert_eq!(record.encoded_len(), bytes.len());

        let flags = record.flags();
        assert!(flags.is_paired());
        assert!(flags.is_reverse());
        assert!(flags.is_first_in_pair());
        assert!(!flags.is_unmapped());
        assert!(!flags.is_secondary());
        assert_eq!(flags.strand(), '-');

        assert_eq!(record.to_cigar_string(), "5S95M");
        assert_eq!(record.to_trimmed_cigar_string(), "95M");
        assert_eq!(record.cigar_ref_span(), 95);
        assert_eq!(record.ref_range(), Some(500_000..500_095));
        assert_eq!(record.sequence().len(), 100);
        assert!(record.sequence().to_string().starts_with("ACGTACGT"));
        assert_eq!(record.quality_scores().len(), 100);
    }

    #[test]
    fn test_span_consistency() {
        for text in ["100M", "5S95M", "3H10S80M10S", "20M5I70M5S", "2S48=2X48=", "4H96M"] {
            let bytes = RecordBuilder::new("r", 0, 100, text).unwrap().build();
            let record = AlignmentRecordView::new(&bytes).unwrap();
            let cigar = record.cigar();
            assert_eq!(
                cigar.leading_soft_clip() + cigar.read_span() + cigar.trailing_soft_clip(),
                record.read_len(),
                "{text}"
            );
        }
    }

    #[test]
    fn test_segments_use_record_position() {
        let bytes = RecordBuilder::new("r", 0, 100, "10M5D10M").unwrap().build();
        let record = AlignmentRecordView::new(&bytes).unwrap();
        let segments = record.segments().unwrap();
        assert_eq!(segments[0].ref_start, Some(100));
        assert_eq!(segments[1], Segment { ref_start: Some(110), read_start: None, len: 5 });
        assert_eq!(segments[2].ref_start, Some(115));
    }

    #[test]
    fn test_unplaced_record() {
        let bytes = RecordBuilder::unmapped("u1").build();
        let record = AlignmentRecordView::new(&bytes).unwrap();
        assert_eq!(record.ref_index(), -1);
        assert_eq!(record.pos(), -1);
        assert!(record.flags().is_unmapped());
        assert_eq!(record.ref_range(), None);
        assert_eq!(record.to_cigar_string(), "*");
    }

    #[test]
    fn test_tags_read_lazily() {
        let mut tags = TagBuilder::new().string(*b"RG", "lib1").build();
        // dangling tag header
        tags.extend_from_slice(b"NMi\x01");
        let bytes = RecordBuilder::new("r", 0, 0, "10M").unwrap().raw_tags(tags).build();

        // viewing the record does not touch the tag block
        let record = AlignmentRecordView::new(&bytes).unwrap();
        assert_eq!(record.read_group().unwrap(), Some("lib1"));
        assert!(record.tags().get(*b"NM").unwrap_err().is_format());
    }

    #[test]
    fn test_length_prefix_mismatch() {
        let mut bytes = RecordBuilder::new("r", 0, 0, "10M").unwrap().build();
        bytes.push(0);
        let err = AlignmentRecordView::new(&bytes).unwrap_err();
        assert!(err.to_string().contains("bad record length"));
    }

    #[test]
    fn test_truncated_sections() {
        let mut bytes = RecordBuilder::new("r", 0, 0, "10M").unwrap().bases(b"ACGTACGTAC").build();
        // claim more bases than are present
        bytes[4 + 16] = 200;
        let err = AlignmentRecordView::new(&bytes).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("truncated record"));

        let short = 20u32.to_le_bytes().iter().copied().chain([0; 20]).collect::<Vec<_>>();
        assert!(AlignmentRecordView::new(&short).unwrap_err().is_format());
    }

    #[test]
    fn test_owned_record() {
        let bytes = RecordBuilder::new("owned", 1, 42, "3M").unwrap().build();
        let record = AlignmentRecord::new(bytes.clone()).unwrap();
        assert_eq!(record.view().read_name(), b"owned");
        assert_eq!(record.view().pos(), 42);
        assert_eq!(record.as_bytes(), bytes.as_slice());
        let copy = AlignmentRecordView::new(&bytes).unwrap().to_record();
        assert_eq!(copy, record);
    }
}
