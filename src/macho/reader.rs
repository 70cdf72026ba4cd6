//! Offset-based record I/O.
//!
//! Every parsed structure is kept together with the file offset it was read
//! from, so later stages can patch it in place without pointer arithmetic
//! into a shared buffer.

use std::io::{Read, Seek, SeekFrom, Write};

use zerocopy::{FromBytes, IntoBytes};

use super::structs::RawRecord;
use crate::error::{Error, Result};
use crate::util::cstr_until_null;

/// A parsed value tagged with its file offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<T> {
    /// File offset the value was read from
    pub offset: u64,
    /// The parsed value
    pub value: T,
}

impl<T> Record<T> {
    /// Pairs a value with its file offset.
    pub fn new(offset: u64, value: T) -> Self {
        Self { offset, value }
    }
}

impl<T: RawRecord> Record<T> {
    /// Returns the offset one past the end of the fixed-size record.
    #[inline]
    pub fn end_offset(&self) -> u64 {
        self.offset + T::SIZE as u64
    }
}

/// Positioned reads of fixed-size records.
pub trait RecordReader {
    /// Reads exactly `len` bytes starting at `offset`.
    fn read_bytes_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Reads a record of type `T` at `offset`.
    fn read_record<T: RawRecord>(&mut self, offset: u64) -> Result<Record<T>> {
        let bytes = self.read_bytes_at(offset, T::SIZE)?;
        let value = T::read_from_bytes(&bytes)
            .map_err(|_| Error::parse(offset, "record size mismatch"))?;
        Ok(Record::new(offset, value))
    }

    /// Reads a null-terminated string of at most `max_len` bytes.
    fn read_cstring_at(&mut self, offset: u64, max_len: usize) -> Result<String> {
        let bytes = self.read_bytes_at(offset, max_len)?;
        Ok(cstr_until_null(&bytes))
    }
}

impl<R: Read + Seek> RecordReader for R {
    fn read_bytes_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

/// Positioned writes.
pub trait RecordWriter {
    /// Writes all of `bytes` starting at `offset`.
    fn write_bytes_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()>;

    /// Writes a record back to the offset it is tagged with.
    fn write_record<T: RawRecord>(&mut self, record: &Record<T>) -> Result<()> {
        self.write_bytes_at(record.offset, record.value.as_bytes())
    }
}

impl<W: Write + Seek> RecordWriter for W {
    fn write_bytes_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(bytes)?;
        Ok(())
    }
}
