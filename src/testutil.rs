//! Builders for synthetic BAM and BAI data, shared by unit and integration
//! tests.

use crate::index::MAGIC as INDEX_MAGIC;
use crate::index::bins::{MAX_LEVEL, MIN_SHIFT, PSEUDO_BIN, bin_number};
use crate::header::MAGIC as BAM_MAGIC;
use crate::offset::{VirtualOffset, VirtualRange};
use crate::record::cigar::{CigarOp, parse_cigar};
use crate::record::sequence::pack_bases;
use crate::record::{AlignmentRecordView, Flags};
use crate::Result;
use noodles::bgzf;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Bin a writer assigns to a record covering `[beg, end)`.
pub fn reg2bin(beg: u32, end: u32) -> u16 {
    let last = end.max(beg + 1) - 1;
    for level in 0..=MAX_LEVEL {
        if bin_number(beg, level) == bin_number(last, level) {
            return bin_number(beg, level) as u16;
        }
    }
    0
}

/// Encoded alignment record.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    name: String,
    ref_id: i32,
    pos: i32,
    cigar: Vec<CigarOp>,
    flags: u16,
    map_quality: u8,
    mate: (i32, i32),
    template_len: i32,
    bases: Option<Vec<u8>>,
    qualities: Option<Vec<u8>>,
    tags: Vec<u8>,
}

impl RecordBuilder {
    pub fn new(name: &str, ref_id: i32, pos: i32, cigar: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            ref_id,
            pos,
            cigar: parse_cigar(cigar)?,
            flags: 0,
            map_quality: 60,
            mate: (-1, -1),
            template_len: 0,
            bases: None,
            qualities: None,
            tags: Vec::new(),
        })
    }

    /// A read with no reference placement.
    pub fn unmapped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ref_id: -1,
            pos: -1,
            cigar: Vec::new(),
            flags: Flags::UNMAPPED,
            map_quality: 0,
            mate: (-1, -1),
            template_len: 0,
            bases: Some(b"ACGTACGTAC".to_vec()),
            qualities: None,
            tags: Vec::new(),
        }
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn map_quality(mut self, map_quality: u8) -> Self {
        self.map_quality = map_quality;
        self
    }

    pub fn mate(mut self, ref_id: i32, pos: i32) -> Self {
        self.mate = (ref_id, pos);
        self
    }

    pub fn template_len(mut self, template_len: i32) -> Self {
        self.template_len = template_len;
        self
    }

    pub fn bases(mut self, bases: &[u8]) -> Self {
        self.bases = Some(bases.to_vec());
        self
    }

    pub fn qualities(mut self, qualities: &[u8]) -> Self {
        self.qualities = Some(qualities.to_vec());
        self
    }

    pub fn tags(mut self, tags: TagBuilder) -> Self {
        self.tags = tags.build();
        self
    }

    pub fn raw_tags(mut self, tags: Vec<u8>) -> Self {
        self.tags = tags;
        self
    }

    fn read_len(&self) -> usize {
        match &self.bases {
            Some(bases) => bases.len(),
            None => self
                .cigar
                .iter()
                .filter(|op| op.kind().is_some_and(|k| k.consumes_read()))
                .map(|op| op.len() as usize)
                .sum(),
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let read_len = self.read_len();
        let bases = self
            .bases
            .clone()
            .unwrap_or_else(|| b"ACGT".iter().copied().cycle().take(read_len).collect());
        let qualities = self.qualities.clone().unwrap_or_else(|| vec![30; read_len]);
        let ref_span: u32 = self
            .cigar
            .iter()
            .filter(|op| op.kind().is_some_and(|k| k.consumes_reference()))
            .map(|op| op.len())
            .sum();
        let bin = match u32::try_from(self.pos) {
            Ok(pos) => reg2bin(pos, pos + ref_span),
            Err(_) => 4680,
        };

        let mut body = Vec::new();
        body.extend_from_slice(&self.ref_id.to_le_bytes());
        body.extend_from_slice(&self.pos.to_le_bytes());
        body.push(self.name.len() as u8 + 1);
        body.push(self.map_quality);
        body.extend_from_slice(&bin.to_le_bytes());
        body.extend_from_slice(&(self.cigar.len() as u16).to_le_bytes());
        body.extend_from_slice(&self.flags.to_le_bytes());
        body.extend_from_slice(&(read_len as u32).to_le_bytes());
        body.extend_from_slice(&self.mate.0.to_le_bytes());
        body.extend_from_slice(&self.mate.1.to_le_bytes());
        body.extend_from_slice(&self.template_len.to_le_bytes());
        body.extend_from_slice(self.name.as_bytes());
        body.push(0);
        for op in &self.cigar {
            body.extend_from_slice(&op.raw().to_le_bytes());
        }
        body.extend_from_slice(&pack_bases(&bases));
        body.extend_from_slice(&qualities);
        body.extend_from_slice(&self.tags);

        let mut record = (body.len() as u32).to_le_bytes().to_vec();
        record.extend_from_slice(&body);
        record
    }
}

/// Encoded auxiliary tag block.
#[derive(Debug, Clone, Default)]
pub struct TagBuilder {
    data: Vec<u8>,
}

impl TagBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn head(mut self, tag: [u8; 2], ty: u8) -> Self {
        self.data.extend_from_slice(&tag);
        self.data.push(ty);
        self
    }

    pub fn char(self, tag: [u8; 2], value: u8) -> Self {
        let mut b = self.head(tag, b'A');
        b.data.push(value);
        b
    }

    pub fn int(self, tag: [u8; 2], value: i32) -> Self {
        let mut b = self.head(tag, b'i');
        b.data.extend_from_slice(&value.to_le_bytes());
        b
    }

    pub fn float(self, tag: [u8; 2], value: f32) -> Self {
        let mut b = self.head(tag, b'f');
        b.data.extend_from_slice(&value.to_le_bytes());
        b
    }

    pub fn string(self, tag: [u8; 2], value: &str) -> Self {
        let mut b = self.head(tag, b'Z');
        b.data.extend_from_slice(value.as_bytes());
        b.data.push(0);
        b
    }

    pub fn int_array(self, tag: [u8; 2], values: &[i32]) -> Self {
        let mut b = self.head(tag, b'B');
        b.data.push(b'i');
        b.data.extend_from_slice(&(values.len() as u32).to_le_bytes());
        for v in values {
            b.data.extend_from_slice(&v.to_le_bytes());
        }
        b
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

/// Uncompressed BAM header bytes.
pub fn encode_header(text: &str, refs: &[(&str, u32)]) -> Vec<u8> {
    let mut buf = BAM_MAGIC.to_vec();
    buf.extend_from_slice(&(text.len() as i32).to_le_bytes());
    buf.extend_from_slice(text.as_bytes());
    buf.extend_from_slice(&(refs.len() as i32).to_le_bytes());
    for (name, length) in refs {
        buf.extend_from_slice(&(name.len() as i32 + 1).to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&(*length as i32).to_le_bytes());
    }
    buf
}

/// BGZF-compress `data` into a complete stream with an EOF block.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut writer = bgzf::Writer::new(Vec::new());
    writer.write_all(data)?;
    Ok(writer.finish()?)
}

/// A record as written by [`BamBuilder`], with where it landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenRecord {
    pub name: String,
    pub ref_index: i32,
    pub pos: i32,
    /// End of the reference span; `pos + 1` for records without one.
    pub end: i32,
    pub unmapped: bool,
    pub offsets: VirtualRange,
}

impl WrittenRecord {
    pub fn overlaps(&self, ref_index: usize, range: &std::ops::Range<u32>) -> bool {
        let Ok(pos) = u32::try_from(self.pos) else {
            return false;
        };
        let end = self.end as u32;
        usize::try_from(self.ref_index).ok() == Some(ref_index)
            && pos < range.end
            && (end > range.start || pos >= range.start)
    }
}

/// Coordinate-sorted BAM file assembled in memory.
#[derive(Debug, Clone, Default)]
pub struct BamBuilder {
    refs: Vec<(String, u32)>,
    text: String,
    records: Vec<(Vec<u8>, bool)>,
    records_per_block: Option<usize>,
}

impl BamBuilder {
    pub fn new(refs: &[(&str, u32)]) -> Self {
        Self {
            refs: refs.iter().map(|(n, l)| (n.to_string(), *l)).collect(),
            ..Self::default()
        }
    }

    pub fn text(&mut self, text: &str) -> &mut Self {
        self.text = text.to_string();
        self
    }

    pub fn push(&mut self, record: Vec<u8>) -> &mut Self {
        self.records.push((record, true));
        self
    }

    /// Append bytes that are written as is and left out of the index.
    pub fn push_raw(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.records.push((bytes, false));
        self
    }

    /// Start a new BGZF block every `n` records.
    pub fn records_per_block(&mut self, n: usize) -> &mut Self {
        self.records_per_block = Some(n);
        self
    }

    pub fn finish(&self) -> Result<BamFile> {
        let refs: Vec<(&str, u32)> = self.refs.iter().map(|(n, l)| (n.as_str(), *l)).collect();
        let mut writer = bgzf::Writer::new(Vec::new());
        writer.write_all(&encode_header(&self.text, &refs))?;
        writer.flush()?;
        let align_start = VirtualOffset::from(writer.virtual_position());

        let mut written = Vec::new();
        for (i, (bytes, indexed)) in self.records.iter().enumerate() {
            if let Some(n) = self.records_per_block {
                if i > 0 && i % n == 0 {
                    writer.flush()?;
                }
            }
            let start = VirtualOffset::from(writer.virtual_position());
            writer.write_all(bytes)?;
            let end = VirtualOffset::from(writer.virtual_position());
            if !indexed {
                continue;
            }
            let view = AlignmentRecordView::new(bytes)?;
            let span = view.cigar_ref_span().max(1) as i32;
            written.push(WrittenRecord {
                name: view.read_name_str().into_owned(),
                ref_index: view.ref_index(),
                pos: view.pos(),
                end: view.pos() + span,
                unmapped: view.flags().is_unmapped(),
                offsets: VirtualRange::new(start, end),
            });
        }

        Ok(BamFile {
            data: writer.finish()?,
            align_start,
            ref_count: self.refs.len(),
            records: written,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BamFile {
    pub data: Vec<u8>,
    pub align_start: VirtualOffset,
    pub ref_count: usize,
    pub records: Vec<WrittenRecord>,
}

impl BamFile {
    /// BAI index for the written records, built the way common writers do.
    pub fn index(&self) -> Vec<u8> {
        let mut builder = IndexBuilder::new();
        let mut unplaced = 0;
        for _ in 0..self.ref_count {
            builder.reference();
        }

        let mut per_ref: BTreeMap<usize, Vec<&WrittenRecord>> = BTreeMap::new();
        for record in &self.records {
            match usize::try_from(record.ref_index) {
                Ok(i) if i < self.ref_count => per_ref.entry(i).or_default().push(record),
                _ => unplaced += 1,
            }
        }

        for (ref_index, records) in per_ref {
            let reference = &mut builder.refs[ref_index];
            let mut linear: Vec<Option<VirtualOffset>> = Vec::new();
            let mut mapped = 0;
            let mut unmapped = 0;
            for record in &records {
                let pos = record.pos as u32;
                let end = record.end as u32;
                let bin = u32::from(reg2bin(pos, end));
                let chunks = reference.bins.entry(bin).or_default();
                match chunks.last_mut() {
                    Some(last) if last.end == record.offsets.start => last.end = record.offsets.end,
                    _ => chunks.push(record.offsets),
                }

                let last_window = ((end - 1) >> MIN_SHIFT) as usize;
                if linear.len() <= last_window {
                    linear.resize(last_window + 1, None);
                }
                for slot in &mut linear[(pos >> MIN_SHIFT) as usize..=last_window] {
                    slot.get_or_insert(record.offsets.start);
                }

                if record.unmapped {
                    unmapped += 1;
                } else {
                    mapped += 1;
                }
            }

            let mut previous = VirtualOffset::zero();
            reference.linear = linear
                .into_iter()
                .map(|slot| {
                    let offset = slot.unwrap_or(previous);
                    previous = offset;
                    offset
                })
                .collect();

            let (first, last) = (records[0], records[records.len() - 1]);
            reference.pseudo_bin = Some((
                VirtualRange::new(first.offsets.start, last.offsets.end),
                mapped,
                unmapped,
            ));
        }

        builder.no_coordinate_count(unplaced);
        builder.build()
    }

    /// Write the BAM and its `.bai` into `dir`.
    pub fn write_to(&self, dir: &Path, name: &str) -> Result<(PathBuf, PathBuf)> {
        let bam_path = dir.join(format!("{}.bam", name));
        let bai_path = dir.join(format!("{}.bam.bai", name));
        std::fs::write(&bam_path, &self.data)?;
        std::fs::write(&bai_path, self.index())?;
        Ok((bam_path, bai_path))
    }

    /// Names of the records overlapping `range` on `ref_index`, in file order.
    pub fn expected_names(&self, ref_index: usize, range: &std::ops::Range<u32>) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.overlaps(ref_index, range))
            .map(|r| r.name.clone())
            .collect()
    }
}

/// Hand-assembled BAI contents.
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    refs: Vec<ReferenceBuilder>,
    no_coordinate_count: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceBuilder {
    bins: BTreeMap<u32, Vec<VirtualRange>>,
    linear: Vec<VirtualOffset>,
    pseudo_bin: Option<(VirtualRange, u64, u64)>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the next reference.
    pub fn reference(&mut self) -> &mut ReferenceBuilder {
        self.refs.push(ReferenceBuilder::default());
        let last = self.refs.len() - 1;
        &mut self.refs[last]
    }

    pub fn no_coordinate_count(&mut self, n: u64) -> &mut Self {
        self.no_coordinate_count = Some(n);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = INDEX_MAGIC.to_vec();
        buf.extend_from_slice(&(self.refs.len() as i32).to_le_bytes());
        for reference in &self.refs {
            reference.encode(&mut buf);
        }
        if let Some(n) = self.no_coordinate_count {
            buf.extend_from_slice(&n.to_le_bytes());
        }
        buf
    }
}

impl ReferenceBuilder {
    pub fn bin(&mut self, bin: u32, chunks: &[(VirtualOffset, VirtualOffset)]) -> &mut Self {
        self.bins
            .entry(bin)
            .or_default()
            .extend(chunks.iter().map(|&(s, e)| VirtualRange::new(s, e)));
        self
    }

    pub fn linear(&mut self, offsets: &[VirtualOffset]) -> &mut Self {
        self.linear = offsets.to_vec();
        self
    }

    pub fn pseudo_bin(&mut self, unmapped_chunk: VirtualRange, mapped: u64, unmapped: u64) -> &mut Self {
        self.pseudo_bin = Some((unmapped_chunk, mapped, unmapped));
        self
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        let n_bin = self.bins.len() + usize::from(self.pseudo_bin.is_some());
        buf.extend_from_slice(&(n_bin as i32).to_le_bytes());
        for (bin, chunks) in &self.bins {
            buf.extend_from_slice(&bin.to_le_bytes());
            buf.extend_from_slice(&(chunks.len() as i32).to_le_bytes());
            for chunk in chunks {
                buf.extend_from_slice(&chunk.start.raw().to_le_bytes());
                buf.extend_from_slice(&chunk.end.raw().to_le_bytes());
            }
        }
        if let Some((chunk, mapped, unmapped)) = self.pseudo_bin {
            buf.extend_from_slice(&PSEUDO_BIN.to_le_bytes());
            buf.extend_from_slice(&2i32.to_le_bytes());
            for v in [chunk.start.raw(), chunk.end.raw(), mapped, unmapped] {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        buf.extend_from_slice(&(self.linear.len() as i32).to_le_bytes());
        for offset in &self.linear {
            buf.extend_from_slice(&offset.raw().to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::GenomicIndex;

    #[test]
    fn test_reg2bin() {
        assert_eq!(reg2bin(0, 100), 4681);
        assert_eq!(reg2bin(500_000, 500_100), 4681 + 30);
        // crosses a 16 Kbp boundary
        assert_eq!(reg2bin(16_000, 17_000), 585);
        assert_eq!(reg2bin(0, 1 << 29), 0);
    }

    #[test]
    fn test_generated_index_matches_records() {
        let mut builder = BamBuilder::new(&[("chr1", 100_000)]);
        builder
            .records_per_block(2)
            .push(RecordBuilder::new("a", 0, 10, "10M").unwrap().build())
            .push(RecordBuilder::new("b", 0, 20, "10M").unwrap().build())
            .push(RecordBuilder::new("c", 0, 40_000, "10M").unwrap().build())
            .push(RecordBuilder::unmapped("u").build());
        let bam = builder.finish().unwrap();
        let index = GenomicIndex::parse(&bam.index()).unwrap();

        let reference = index.reference(0).unwrap();
        assert_eq!(reference.mapped_count, 3);
        assert_eq!(reference.unmapped_count, 0);
        assert_eq!(index.no_coordinate_count(), Some(1));
        assert_eq!(reference.linear_index.len(), 3);
        // window 1 holds no record and inherits window 0's offset
        assert_eq!(reference.linear_index[1], reference.linear_index[0]);
        assert_eq!(reference.bins.len(), 2);
        assert_eq!(
            reference.bin(4681).unwrap().chunks,
            vec![VirtualRange::new(bam.records[0].offsets.start, bam.records[1].offsets.end)]
        );
        assert_eq!(bam.records[0].offsets.start, bam.align_start);
    }
}
