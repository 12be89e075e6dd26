use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bamrange::{
    Config, Error, IndexedBam,
    config::Command,
    types::{AlignmentSummary, CoverageReport, PlannedRange, QueryRegion},
};

fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let index_path = config.effective_index_path();
    tracing::info!("BAM: {:?}, index: {:?}", config.bam, index_path);
    let bam = IndexedBam::open(&config.bam, &index_path)
        .with_context(|| format!("failed to open {:?}", config.bam))?;

    match &config.command {
        Command::Refs => print_all(&config, &bam.summaries())?,
        Command::Plan { region } => {
            let (ref_index, region) = resolve(&bam, region)?;
            let ranges: Vec<PlannedRange> = bam
                .plan(ref_index, region.range)?
                .iter()
                .map(PlannedRange::from)
                .collect();
            print_all(&config, &ranges)?;
        }
        Command::View {
            region,
            limit,
            trimmed_cigar,
        } => {
            let limit = limit.unwrap_or(usize::MAX);
            let mut iter = match region {
                Some(region) => {
                    let (ref_index, region) = resolve(&bam, region)?;
                    bam.query(ref_index, region.range)?
                        .ok_or_else(|| Error::NotFound(region.name))?
                }
                None => bam.query_all()?,
            };
            let mut printed = 0;
            while printed < limit {
                let Some(record) = iter.next() else { break };
                let summary = AlignmentSummary::from_view(&record?, bam.header(), *trimmed_cigar)?;
                print_one(&config, &summary)?;
                printed += 1;
            }
        }
        Command::Count { region } => {
            let count = match region {
                Some(region) => {
                    let (ref_index, region) = resolve(&bam, region)?;
                    bam.for_each_overlap(ref_index, region.range, |_| Ok(()))?
                        .ok_or_else(|| Error::NotFound(region.name))?
                }
                None => bam.query_all()?.into_records().try_fold(0, |n, r| r.map(|_| n + 1))?,
            };
            if config.json {
                println!("{}", serde_json::json!({ "count": count }));
            } else {
                println!("{}", count);
            }
        }
        Command::Coverage {
            reference,
            bucket_size,
        } => {
            let ref_index = bam
                .resolve(reference.as_str())
                .ok_or_else(|| Error::NotFound(format!("reference sequence not found: {}", reference)))?;
            let coverage = bam.estimated_coverage(ref_index, *bucket_size)?;
            let length = bam.header().refs[ref_index].length;
            let report = CoverageReport::new(reference, length, &coverage);
            if config.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                for (i, (value, scaled)) in report.values.iter().zip(&report.scaled).enumerate() {
                    let start = i as u64 * u64::from(report.bucket_size);
                    println!("{}\t{}\t{}\t{}", report.reference, start, value, scaled);
                }
            }
        }
    }

    Ok(())
}

/// Parse region text and look its reference up in the header.
fn resolve(bam: &IndexedBam, text: &str) -> bamrange::Result<(usize, QueryRegion)> {
    let region: QueryRegion = text.parse()?;
    let ref_index = bam.resolve(region.name.as_str()).ok_or_else(|| {
        Error::NotFound(format!("reference sequence not found: {}", region.name))
    })?;
    Ok((ref_index, region))
}

fn print_one<T: Serialize + std::fmt::Display>(config: &Config, item: &T) -> anyhow::Result<()> {
    if config.json {
        println!("{}", serde_json::to_string(item)?);
    } else {
        println!("{}", item);
    }
    Ok(())
}

fn print_all<T: Serialize + std::fmt::Display>(config: &Config, items: &[T]) -> anyhow::Result<()> {
    if config.json {
        println!("{}", serde_json::to_string_pretty(items)?);
    } else {
        for item in items {
            println!("{}", item);
        }
    }
    Ok(())
}
