use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "bamrange")]
#[command(about = "Region queries over indexed BAM files")]
pub struct Config {
    /// BAM file to read
    #[arg(long, env = "BAMRANGE_BAM")]
    pub bam: PathBuf,

    /// BAI index (defaults to <bam>.bai, then <bam stem>.bai)
    #[arg(long, env = "BAMRANGE_INDEX")]
    pub index: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "warn")]
    pub log_level: String,

    /// Print JSON instead of tab-separated text
    #[arg(long, env = "BAMRANGE_JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Summarise each reference sequence
    Refs,

    /// Show the file ranges a region query would read
    Plan {
        /// Region as name[:start-end], 1-based inclusive
        region: String,
    },

    /// Print records overlapping a region, or the whole file
    View {
        region: Option<String>,

        /// Stop after this many records
        #[arg(long)]
        limit: Option<usize>,

        /// Leave clipping out of the printed CIGAR
        #[arg(long)]
        trimmed_cigar: bool,
    },

    /// Count records overlapping a region, or the whole file
    Count { region: Option<String> },

    /// Estimated coverage of one reference from the index alone
    Coverage {
        reference: String,

        /// Window size; must be a multiple of 16384
        #[arg(long, default_value = "16384")]
        bucket_size: u32,
    },
}

impl Config {
    /// The index to open: the explicit path, else `<bam>.bai`, else the BAM
    /// path with its extension replaced by `.bai`. Falls back to `<bam>.bai`
    /// when neither exists so the open error names the usual location.
    pub fn effective_index_path(&self) -> PathBuf {
        if let Some(index) = &self.index {
            return index.clone();
        }
        let mut appended = self.bam.clone().into_os_string();
        appended.push(".bai");
        let appended = PathBuf::from(appended);
        if appended.exists() {
            return appended;
        }
        let replaced = self.bam.with_extension("bai");
        if replaced.exists() {
            return replaced;
        }
        appended
    }
}
