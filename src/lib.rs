pub mod bam;
pub mod config;
mod cursor;
pub mod error;
pub mod header;
pub mod index;
pub mod iter;
pub mod offset;
pub mod query;
pub mod record;
pub mod transport;
pub mod types;

#[doc(hidden)]
pub mod testutil;

pub use bam::{IndexedBam, ReferenceId};
pub use config::Config;
pub use error::{Error, Result};
pub use header::FileHeader;
pub use index::GenomicIndex;
pub use iter::AlignmentIterator;
pub use offset::{VirtualOffset, VirtualRange};
pub use query::FileRangeSet;
pub use record::{AlignmentRecord, AlignmentRecordView};
