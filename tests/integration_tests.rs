//! End-to-end tests over synthetic BAM and BAI files written to disk.

use bamrange::testutil::{BamBuilder, BamFile, RecordBuilder, TagBuilder};
use bamrange::transport::BgzfTransport;
use bamrange::{Error, FileHeader, GenomicIndex, IndexedBam};
use proptest::prelude::*;
use std::io::Cursor;
use std::ops::Range;
use std::path::PathBuf;
use tempfile::TempDir;

fn write(bam: &BamFile) -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let (bam_path, bai_path) = bam.write_to(dir.path(), "sample").unwrap();
    (dir, bam_path, bai_path)
}

fn names(bam: &IndexedBam, reference: &str, range: Range<u32>) -> Vec<String> {
    let mut names = Vec::new();
    bam.for_each_overlap(reference, range, |r| {
        names.push(r.read_name_str().into_owned());
        Ok(())
    })
    .unwrap()
    .unwrap();
    names
}

/// One 100 bp alignment at 500,000 on a 1 Mbp reference.
fn single_record_file() -> BamFile {
    let mut builder = BamBuilder::new(&[("chr1", 1_000_000)]);
    builder
        .text("@HD\tVN:1.6\tSO:coordinate\n@SQ\tSN:chr1\tLN:1000000\n")
        .push(RecordBuilder::new("r1", 0, 500_000, "100M").unwrap().build());
    builder.finish().unwrap()
}

#[test]
fn test_single_record_overlaps() {
    let (_dir, bam_path, bai_path) = write(&single_record_file());
    let bam = IndexedBam::open(&bam_path, &bai_path).unwrap();

    assert_eq!(names(&bam, "chr1", 500_050..500_060), vec!["r1"]);
    assert!(names(&bam, "chr1", 0..100).is_empty());
    // last covered base
    assert_eq!(names(&bam, "chr1", 500_099..500_100), vec!["r1"]);
    // first base after the alignment
    assert!(names(&bam, "chr1", 500_100..600_000).is_empty());
}

#[test]
fn test_unknown_reference() {
    let (_dir, bam_path, bai_path) = write(&single_record_file());
    let bam = IndexedBam::open(&bam_path, &bai_path).unwrap();
    assert!(bam.query("chr2", 0..100).unwrap().is_none());
    assert!(bam.for_each_overlap("chr2", 0..100, |_| Ok(())).unwrap().is_none());
}

#[test]
fn test_record_fields_through_query() {
    let mut builder = BamBuilder::new(&[("chr1", 10_000)]);
    builder.push(
        RecordBuilder::new("pair1", 0, 1000, "5S20M2I10M")
            .unwrap()
            .flags(0x1 | 0x2 | 0x40)
            .map_quality(42)
            .mate(0, 1500)
            .template_len(535)
            .tags(TagBuilder::new().string(*b"RG", "lib1").int(*b"NM", 3))
            .build(),
    );
    let (_dir, bam_path, bai_path) = write(&builder.finish().unwrap());
    let bam = IndexedBam::open(&bam_path, &bai_path).unwrap();

    let mut iter = bam.query("chr1", 1010..1011).unwrap().unwrap();
    let record = iter.next().unwrap().unwrap();
    assert_eq!(record.read_name(), b"pair1");
    assert_eq!(record.pos(), 1000);
    assert_eq!(record.map_quality(), 42);
    assert!(record.flags().is_first_in_pair());
    assert_eq!(record.to_cigar_string(), "5S20M2I10M");
    assert_eq!(record.to_trimmed_cigar_string(), "20M2I10M");
    assert_eq!(record.cigar_ref_span(), 30);
    assert_eq!(record.leading_soft_clip(), 5);
    assert_eq!(record.read_len(), 37);
    assert_eq!(record.read_group().unwrap(), Some("lib1"));
    assert_eq!(record.ref_range(), Some(1000..1030));
    assert!(iter.next().is_none());
}

/// Records of varying span spread over two references, then unplaced reads.
fn many_record_file() -> BamFile {
    let mut builder = BamBuilder::new(&[("chr1", 300_000), ("chr2", 300_000)]);
    builder.records_per_block(7);
    let cigars = ["100M", "50M2000N50M", "10S90M", "30M40000N30M", "1M"];
    let mut n = 0;
    for ref_id in 0..2 {
        let mut pos = 0;
        for i in 0..400 {
            pos += (i * 7919) % 1500;
            let cigar = cigars[i % cigars.len()];
            let name = format!("r{}", n);
            builder.push(RecordBuilder::new(&name, ref_id, pos as i32, cigar).unwrap().build());
            n += 1;
        }
    }
    for i in 0..5 {
        builder.push(RecordBuilder::unmapped(&format!("u{}", i)).build());
    }
    builder.finish().unwrap()
}

#[test]
fn test_many_records_match_brute_force() {
    let file = many_record_file();
    let (_dir, bam_path, bai_path) = write(&file);
    let bam = IndexedBam::open(&bam_path, &bai_path).unwrap();

    let queries = [
        0..1,
        0..16_384,
        16_383..16_385,
        100_000..100_050,
        150_000..250_000,
        299_000..300_000,
        0..u32::MAX,
    ];
    for (ref_index, name) in ["chr1", "chr2"].iter().enumerate() {
        for range in &queries {
            assert_eq!(
                names(&bam, name, range.clone()),
                file.expected_names(ref_index, range),
                "{}:{:?}",
                name,
                range
            );
        }
    }
}

#[test]
fn test_results_are_in_position_order() {
    let (_dir, bam_path, bai_path) = write(&many_record_file());
    let bam = IndexedBam::open(&bam_path, &bai_path).unwrap();
    let mut last = -1;
    bam.for_each_overlap("chr2", 50_000..200_000, |r| {
        assert!(r.pos() >= last);
        assert_eq!(r.ref_index(), 1);
        last = r.pos();
        Ok(())
    })
    .unwrap();
    assert!(last > 0);
}

#[test]
fn test_whole_file_includes_unplaced_reads() {
    let file = many_record_file();
    let (_dir, bam_path, bai_path) = write(&file);
    let bam = IndexedBam::open(&bam_path, &bai_path).unwrap();

    let records: Vec<_> = bam
        .query_all()
        .unwrap()
        .into_records()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 805);
    assert!(records[804].view().flags().is_unmapped());
    assert_eq!(bam.index().no_coordinate_count(), Some(5));
}

#[test]
fn test_summaries_and_coverage() {
    let (_dir, bam_path, bai_path) = write(&many_record_file());
    let bam = IndexedBam::open(&bam_path, &bai_path).unwrap();

    let summaries = bam.summaries();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].name, "chr1");
    assert_eq!(summaries[0].length, 300_000);
    assert_eq!(summaries[0].mapped_count, 400);
    assert_eq!(summaries[0].unmapped_count, 0);
    let range = summaries[0].total_file_range.unwrap();
    assert!(range.start < range.end);

    let coverage = bam.estimated_coverage(0, 4 * 16_384).unwrap();
    assert!(!coverage.values.is_empty());
    assert_eq!(coverage.scaled().iter().copied().max(), Some(255));

    assert!(matches!(
        bam.estimated_coverage(0, 1000),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        bam.estimated_coverage(5, 16_384),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn test_plan_covers_expected_records() {
    let file = many_record_file();
    let (_dir, bam_path, bai_path) = write(&file);
    let bam = IndexedBam::open(&bam_path, &bai_path).unwrap();

    let range = 120_000..121_000;
    let plan = bam.plan(0, range.clone()).unwrap();
    assert!(!plan.is_empty());
    for record in file.records.iter().filter(|r| r.overlaps(0, &range)) {
        assert!(
            plan.iter().any(|p| p.start <= record.offsets.start && record.offsets.end <= p.end),
            "{} not covered",
            record.name
        );
    }
    assert_eq!(plan.compressed_spans().len(), plan.len());
}

#[test]
fn test_trailing_index_bytes_are_reported() {
    let file = single_record_file();
    let (_dir, bam_path, bai_path) = write(&file);
    let mut data = std::fs::read(&bai_path).unwrap();
    data.extend_from_slice(&[0xde, 0xad, 0xbe]);
    std::fs::write(&bai_path, data).unwrap();

    let bam = IndexedBam::open(&bam_path, &bai_path).unwrap();
    assert_eq!(bam.index().diagnostics().len(), 1);
    assert_eq!(names(&bam, "chr1", 500_000..500_001), vec!["r1"]);
}

#[test]
fn test_bad_index_magic() {
    let (_dir, bam_path, bai_path) = write(&single_record_file());
    std::fs::write(&bai_path, b"CSI\x01\x00\x00\x00\x00").unwrap();
    let err = IndexedBam::open(&bam_path, &bai_path).unwrap_err();
    assert!(err.is_format());
}

#[test]
fn test_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let err = IndexedBam::open(dir.path().join("none.bam"), dir.path().join("none.bai"));
    assert!(matches!(err, Err(Error::Io(_))));
}

#[test]
fn test_truncated_file_fails() {
    let file = many_record_file();
    let (_dir, bam_path, bai_path) = write(&file);
    // drops the end-of-file marker and part of the last data block
    std::fs::write(&bam_path, &file.data[..file.data.len() - 40]).unwrap();
    let bam = IndexedBam::open(&bam_path, &bai_path).unwrap();

    let results: Vec<_> = bam.query_all().unwrap().into_records().collect();
    let last = results.last().unwrap();
    assert!(last.is_err());
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
}

fn in_memory(file: &BamFile) -> IndexedBam {
    let mut transport = BgzfTransport::new(Cursor::new(file.data.clone()));
    let header = FileHeader::read_from(&mut transport).unwrap();
    IndexedBam::new(header, GenomicIndex::parse(&file.index()).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_query_matches_brute_force(
        mut records in prop::collection::vec((0u32..200_000, 1u32..30_000), 1..60),
        start in 0u32..220_000,
        len in 1u32..50_000,
        block in 1usize..10,
    ) {
        records.sort();
        let mut builder = BamBuilder::new(&[("chr1", 250_000)]);
        builder.records_per_block(block);
        for (i, (pos, span)) in records.iter().enumerate() {
            let cigar = format!("{}M", span);
            builder.push(RecordBuilder::new(&format!("r{}", i), 0, *pos as i32, &cigar).unwrap().build());
        }
        let file = builder.finish().unwrap();
        let bam = in_memory(&file);
        let range = start..start + len;

        let transport = BgzfTransport::new(Cursor::new(file.data.clone()));
        let mut iter = bam.query_with(transport, 0, range.clone()).unwrap();
        let mut got = Vec::new();
        iter.for_each_overlap(|r| {
            got.push(r.read_name_str().into_owned());
            Ok(())
        })
        .unwrap();
        prop_assert_eq!(got, file.expected_names(0, &range));
    }
}
