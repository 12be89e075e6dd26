use super::BlockTransport;
use crate::offset::VirtualOffset;
use crate::{Error, Result};
use noodles::bgzf;
use std::fs::File;
use std::io::{self, BufRead, Read, Seek};
use std::path::Path;

/// [`BlockTransport`] over a BGZF stream.
pub struct BgzfTransport<R> {
    reader: bgzf::Reader<R>,
    limit: VirtualOffset,
}

impl<R: Read> BgzfTransport<R> {
    /// Wrap a stream positioned at its first block. Until the first
    /// [`seek`](BlockTransport::seek) there is no range limit.
    pub fn new(inner: R) -> Self {
        Self {
            reader: bgzf::Reader::new(inner),
            limit: VirtualOffset::invalid(),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl BgzfTransport<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(file))
    }
}

impl<R: Read + Seek> BlockTransport for BgzfTransport<R> {
    fn seek(&mut self, start: VirtualOffset, limit: VirtualOffset) -> Result<()> {
        self.reader.seek(start.into())?;
        self.limit = limit;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let offset = self.virtual_position();
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::format(
                offset.raw(),
                format!(
                    "unexpected end of stream at {}: expected {} bytes",
                    offset,
                    buf.len()
                ),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn has_available_bytes(&mut self) -> Result<bool> {
        // loading the next block can move the position onto the limit
        let available = !self.reader.fill_buf()?.is_empty();
        Ok(available && self.virtual_position() < self.limit)
    }

    fn virtual_position(&self) -> VirtualOffset {
        self.reader.virtual_position().into()
    }
}
