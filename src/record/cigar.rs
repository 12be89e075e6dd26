use crate::{Error, Result};
use std::fmt;

const OP_CHARS: &[u8; 9] = b"MIDNSHP=X";

/// CIGAR operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Match,
    Insertion,
    Deletion,
    Skip,
    SoftClip,
    HardClip,
    Pad,
    SequenceMatch,
    SequenceMismatch,
}

impl Kind {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Kind::Match,
            1 => Kind::Insertion,
            2 => Kind::Deletion,
            3 => Kind::Skip,
            4 => Kind::SoftClip,
            5 => Kind::HardClip,
            6 => Kind::Pad,
            7 => Kind::SequenceMatch,
            8 => Kind::SequenceMismatch,
            _ => return None,
        })
    }

    pub fn as_char(self) -> char {
        OP_CHARS[self as usize] as char
    }

    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Kind::Match | Kind::Deletion | Kind::Skip | Kind::SequenceMatch | Kind::SequenceMismatch
        )
    }

    pub fn consumes_read(self) -> bool {
        matches!(
            self,
            Kind::Match
                | Kind::Insertion
                | Kind::SoftClip
                | Kind::SequenceMatch
                | Kind::SequenceMismatch
        )
    }

    fn is_clip(self) -> bool {
        matches!(self, Kind::SoftClip | Kind::HardClip)
    }
}

/// One packed operation: run length in the high 28 bits, op code in the low 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp(u32);

impl CigarOp {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn new(kind: Kind, len: u32) -> Self {
        Self((len << 4) | kind as u32)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn code(self) -> u8 {
        (self.0 & 0xf) as u8
    }

    pub const fn len(self) -> u32 {
        self.0 >> 4
    }

    pub fn kind(self) -> Option<Kind> {
        Kind::from_code(self.code())
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.kind().map(Kind::as_char).unwrap_or('?');
        write!(f, "{}{}", self.len(), op)
    }
}

/// One aligned run: where it starts on the reference and in the read.
///
/// The side a run does not advance is `None`: insertions have no reference
/// start, deletions and skips no read start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub ref_start: Option<u32>,
    pub read_start: Option<u32>,
    pub len: u32,
}

/// Borrowed CIGAR array of a record.
#[derive(Clone, Copy)]
pub struct Cigar<'a> {
    data: &'a [u8],
    /// Offset of the array inside its record, for error reporting.
    offset: u64,
}

impl<'a> Cigar<'a> {
    /// `data` must be a whole number of 4-byte operations.
    pub(crate) fn new(data: &'a [u8], offset: u64) -> Self {
        Self { data, offset }
    }

    pub fn len(&self) -> usize {
        self.data.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<CigarOp> {
        let raw = self.data.get(i * 4..i * 4 + 4)?;
        Some(CigarOp(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = CigarOp> + use<'a> {
        self.data
            .chunks_exact(4)
            .map(|b| CigarOp(u32::from_le_bytes([b[0], b[1], b[2], b[3]])))
    }

    /// Raw packed operations.
    pub fn to_raw(&self) -> Vec<u32> {
        self.iter().map(CigarOp::raw).collect()
    }

    /// Reference bases covered (M, D, N, = and X).
    pub fn ref_span(&self) -> u32 {
        self.span(Kind::consumes_reference)
    }

    /// Aligned read bases (M, I, = and X).
    pub fn read_span(&self) -> u32 {
        self.span(|k| k.consumes_read() && k != Kind::SoftClip)
    }

    fn span(&self, include: impl Fn(Kind) -> bool) -> u32 {
        self.iter()
            .filter(|op| op.kind().is_some_and(&include))
            .fold(0u32, |acc, op| acc.saturating_add(op.len()))
    }

    /// Soft clip at the start, after any hard clips.
    pub fn leading_soft_clip(&self) -> u32 {
        soft_clip(self.iter())
    }

    /// Soft clip at the end, before any hard clips.
    pub fn trailing_soft_clip(&self) -> u32 {
        soft_clip(self.iter().rev())
    }

    /// CIGAR text with every operation, e.g. `5S95M`. `*` when empty.
    pub fn to_cigar_string(&self) -> String {
        render(self.iter())
    }

    /// CIGAR text without the clips at either end.
    pub fn to_trimmed_cigar_string(&self) -> String {
        let ops: Vec<_> = self.iter().collect();
        let is_clip = |op: &CigarOp| op.kind().is_some_and(Kind::is_clip);
        let start = ops.iter().take_while(|op| is_clip(op)).count();
        let end = ops.len() - ops[start..].iter().rev().take_while(|op| is_clip(op)).count();
        render(ops[start..end].iter().copied())
    }

    /// Aligned runs with their reference and read starts, the reference side
    /// counted from `ref_pos`. Clips and pads produce no segment.
    pub fn segments(&self, ref_pos: u32) -> Result<Vec<Segment>> {
        let mut segments = Vec::with_capacity(self.len());
        let mut ref_cur = ref_pos;
        let mut read_cur = 0u32;

        for (i, op) in self.iter().enumerate() {
            let offset = self.offset + 4 * i as u64;
            let kind = op.kind().ok_or_else(|| {
                Error::format(
                    offset,
                    format!(
                        "bad CIGAR operation: expected code 0-8, found {} in {}",
                        op.code(),
                        self.to_cigar_string()
                    ),
                )
            })?;
            let len = op.len();
            if len == 0 {
                return Err(Error::format(
                    offset,
                    format!("zero-length CIGAR operation in {}", self.to_cigar_string()),
                ));
            }

            let (ref_start, read_start) = match kind {
                Kind::HardClip | Kind::Pad => continue,
                Kind::SoftClip => {
                    read_cur = read_cur.saturating_add(len);
                    continue;
                }
                Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => (Some(ref_cur), Some(read_cur)),
                Kind::Insertion => (None, Some(read_cur)),
                Kind::Deletion | Kind::Skip => (Some(ref_cur), None),
            };
            if kind.consumes_reference() {
                ref_cur = ref_cur.saturating_add(len);
            }
            if kind.consumes_read() {
                read_cur = read_cur.saturating_add(len);
            }
            segments.push(Segment {
                ref_start,
                read_start,
                len,
            });
        }
        Ok(segments)
    }
}

impl fmt::Debug for Cigar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cigar").field(&self.to_cigar_string()).finish()
    }
}

impl fmt::Display for Cigar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cigar_string())
    }
}

fn soft_clip(mut ops: impl Iterator<Item = CigarOp>) -> u32 {
    ops.find(|op| op.kind() != Some(Kind::HardClip))
        .filter(|op| op.kind() == Some(Kind::SoftClip))
        .map_or(0, CigarOp::len)
}

fn render(ops: impl Iterator<Item = CigarOp>) -> String {
    let s: String = ops.map(|op| op.to_string()).collect();
    if s.is_empty() { "*".to_string() } else { s }
}

/// Parse CIGAR text such as `5S95M` into packed operations.
pub fn parse_cigar(text: &str) -> Result<Vec<CigarOp>> {
    if text == "*" {
        return Ok(Vec::new());
    }
    let mut ops = Vec::new();
    let mut len: u32 = 0;
    let mut has_digits = false;
    for c in text.chars() {
        if let Some(d) = c.to_digit(10) {
            len = len
                .checked_mul(10)
                .and_then(|l| l.checked_add(d))
                .filter(|&l| l < 1 << 28)
                .ok_or_else(|| Error::InvalidInput(format!("CIGAR run too long in {}", text)))?;
            has_digits = true;
            continue;
        }
        let code = OP_CHARS
            .iter()
            .position(|&b| b as char == c)
            .ok_or_else(|| Error::InvalidInput(format!("bad CIGAR operation {:?} in {}", c, text)))?;
        if !has_digits {
            return Err(Error::InvalidInput(format!("missing CIGAR run length in {}", text)));
        }
        ops.push(CigarOp((len << 4) | code as u32));
        len = 0;
        has_digits = false;
    }
    if has_digits {
        return Err(Error::InvalidInput(format!("trailing CIGAR run length in {}", text)));
    }
    Ok(ops)
}
