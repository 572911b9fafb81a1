use std::io::{self, Read, Seek, SeekFrom};

use crate::Error;

/// Capability bundle for archive streams. The catalog and decoder only
/// depend on this, never on a concrete stream type.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Exposes a sub-range of a parent stream as an independent stream.
///
/// Used to hand one segment of a concatenated file to a decompressor
/// without it seeing subsequent segments. The view keeps its own cursor
/// and issues an absolute seek on the parent before every read, so the
/// parent's cursor position is never relied upon between calls.
pub struct DataRange<R> {
    inner: R,
    range_offset: u64,
    range_size: u64,
    current_offset: u64,
}

impl<R: Read + Seek> DataRange<R> {
    pub fn new(inner: R, range_offset: u64, range_size: u64) -> Result<Self, Error> {
        let mut range = DataRange {
            inner,
            range_offset: 0,
            range_size: 0,
            current_offset: 0,
        };
        range.set_range(range_offset, range_size)?;
        Ok(range)
    }

    /// Sets the data range (offset and size) and rewinds the cursor.
    pub fn set_range(&mut self, range_offset: u64, range_size: u64) -> Result<(), Error> {
        if range_offset.checked_add(range_size).is_none() {
            return Err(Error::InvalidRange {
                offset: range_offset,
                size: range_size,
            });
        }

        self.range_offset = range_offset;
        self.range_size = range_size;
        self.current_offset = 0;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.range_size
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for DataRange<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.current_offset >= self.range_size {
            return Ok(0);
        }

        let remaining = self.range_size - self.current_offset;
        let len = (buf.len() as u64).min(remaining) as usize;

        self.inner
            .seek(SeekFrom::Start(self.range_offset + self.current_offset))?;

        let read = self.inner.read(&mut buf[..len])?;
        self.current_offset += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for DataRange<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let offset = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(rel) => self.current_offset as i128 + rel as i128,
            SeekFrom::End(rel) => self.range_size as i128 + rel as i128,
        };

        if offset < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative offset",
            ));
        }

        self.current_offset = offset as u64;
        Ok(self.current_offset)
    }
}
