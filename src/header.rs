//! The header embedded at the start of a BAM file.

use crate::offset::VirtualOffset;
use crate::transport::{BgzfTransport, BlockTransport};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"BAM\x01";

/// A reference sequence as declared in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceMeta {
    pub name: String,
    pub length: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHeader {
    /// Free-form SAM header text.
    pub text: String,
    pub refs: Vec<ReferenceMeta>,
    name_to_index: HashMap<String, usize>,
    /// Where the first alignment record begins.
    pub align_start: VirtualOffset,
}

impl FileHeader {
    pub fn new(text: String, refs: Vec<ReferenceMeta>, align_start: VirtualOffset) -> Self {
        let name_to_index = refs
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();
        Self {
            text,
            refs,
            name_to_index,
            align_start,
        }
    }

    /// Read the header from the start of the stream.
    pub fn read_from<T: BlockTransport>(transport: &mut T) -> Result<Self> {
        let mut magic = [0; 4];
        transport.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::format(
                0,
                format!(
                    "bad BAM magic: expected {:?}, found {:?}",
                    String::from_utf8_lossy(MAGIC),
                    String::from_utf8_lossy(&magic)
                ),
            ));
        }

        let l_text = read_length(transport, "header text length")?;
        let mut text = vec![0; l_text];
        transport.read_exact(&mut text)?;
        // some writers pad the text with NULs
        while text.last() == Some(&0) {
            text.pop();
        }
        let text = String::from_utf8_lossy(&text).into_owned();

        let n_ref = read_length(transport, "reference count")?;
        let mut refs = Vec::new();
        for _ in 0..n_ref {
            let offset = transport.virtual_position().raw();
            let l_name = read_length(transport, "reference name length")?;
            if l_name == 0 {
                return Err(Error::format(
                    offset,
                    "bad reference name length: expected at least 1, found 0",
                ));
            }
            let mut name = vec![0; l_name];
            transport.read_exact(&mut name)?;
            let end = name.iter().position(|&b| b == 0).unwrap_or(l_name - 1);
            name.truncate(end);

            let length = read_length(transport, "reference length")?;
            refs.push(ReferenceMeta {
                name: String::from_utf8_lossy(&name).into_owned(),
                length: length as u32,
            });
        }

        let header = Self::new(text, refs, transport.virtual_position());
        tracing::debug!(
            "parsed BAM header: {} references, alignments start at {}",
            header.refs.len(),
            header.align_start
        );
        Ok(header)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut transport = BgzfTransport::open(path)?;
        Self::read_from(&mut transport)
    }

    pub fn references(&self) -> &[ReferenceMeta] {
        &self.refs
    }

    pub fn reference(&self, ref_index: usize) -> Option<&ReferenceMeta> {
        self.refs.get(ref_index)
    }

    pub fn reference_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }
}

fn read_length<T: BlockTransport>(transport: &mut T, what: &str) -> Result<usize> {
    let offset = transport.virtual_position().raw();
    let n = transport.read_i32()?;
    usize::try_from(n).map_err(|_| Error::format(offset, format!("invalid {}: {}", what, n)))
}
