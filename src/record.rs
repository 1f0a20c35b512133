//! On-disk record codec.
//!
//! ```text
//! next(4) size(4) modified(8) name_len(1) name(name_len) content(size)
//! ```
//!
//! All integers are big-endian.  `modified` is microseconds since the Unix
//! epoch; directories carry [`DIRECTORY_STAMP`] instead of a real time and
//! always have `size == 0`.  A free region reuses the same header, with
//! `next` linking the free list; its name and content bytes are never read.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, TimeDelta, Utc};
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::header::ChainOffset;

/// Fixed part of every record: next + size + modified + name_len.
pub const RECORD_HEADER_LEN: u64 = 4 + 4 + 8 + 1;
pub const MAX_NAME_LEN: usize = u8::MAX as usize;
/// Raw timestamp marking a directory record.
pub const DIRECTORY_STAMP: i64 = i64::MIN;

/// Bytes a record with this name and content length occupies on disk.
#[inline]
pub fn footprint(name_len: usize, content_len: u32) -> u64 {
    RECORD_HEADER_LEN + name_len as u64 + content_len as u64
}

// ── Timestamps ───────────────────────────────────────────────────────────────

/// The timestamp every directory reports.
pub fn directory_time() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

pub fn encode_time(t: DateTime<Utc>) -> i64 {
    if t == directory_time() { DIRECTORY_STAMP } else { t.timestamp_micros() }
}

/// Earliest time a file can report; only directories decode to
/// [`directory_time`].
pub fn earliest_file_time() -> DateTime<Utc> {
    directory_time() + TimeDelta::microseconds(1)
}

/// Stamps outside chrono's range are clamped to the nearest representable
/// file time, never to the directory sentinel.
pub fn decode_time(raw: i64) -> DateTime<Utc> {
    if raw == DIRECTORY_STAMP {
        return directory_time();
    }
    match DateTime::<Utc>::from_timestamp_micros(raw) {
        Some(t)          => t.max(earliest_file_time()),
        None if raw < 0  => earliest_file_time(),
        None             => DateTime::<Utc>::MAX_UTC,
    }
}

// ── RecordHeader ─────────────────────────────────────────────────────────────

/// The fixed fields plus name of one record, as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub next:     u32,
    pub size:     u32,
    pub modified: i64,
    pub name:     String,
}

impl RecordHeader {
    #[inline]
    pub fn is_directory(&self) -> bool { self.modified == DIRECTORY_STAMP }

    #[inline]
    pub fn footprint(&self) -> u64 { footprint(self.name.len(), self.size) }

    /// Write the header and name.  `next` is always written as given; callers
    /// placing a fresh record pass 0 and link it afterwards.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<BigEndian>(self.next)?;
        writer.write_u32::<BigEndian>(self.size)?;
        writer.write_i64::<BigEndian>(self.modified)?;
        writer.write_u8(self.name.len() as u8)?;
        writer.write_all(self.name.as_bytes())?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let next     = reader.read_u32::<BigEndian>()?;
        let size     = reader.read_u32::<BigEndian>()?;
        let modified = reader.read_i64::<BigEndian>()?;
        let name_len = reader.read_u8()? as usize;
        let mut name = vec![0u8; name_len];
        reader.read_exact(&mut name)?;
        let name = String::from_utf8(name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self { next, size, modified, name })
    }
}

/// Header of a free region: only `next`, `size` and `name_len` matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRegion {
    pub next:     u32,
    pub size:     u32,
    pub name_len: u8,
}

impl FreeRegion {
    #[inline]
    pub fn footprint(&self) -> u64 { footprint(self.name_len as usize, self.size) }

    pub fn read<R: Read + Seek>(mut reader: R) -> io::Result<Self> {
        let next = reader.read_u32::<BigEndian>()?;
        let size = reader.read_u32::<BigEndian>()?;
        reader.seek(SeekFrom::Current(8))?;
        let name_len = reader.read_u8()?;
        Ok(Self { next, size, name_len })
    }

    /// Write a nameless free header whose footprint is exactly `span` bytes.
    pub fn write_span<W: Write>(mut writer: W, next: u32, span: u64) -> io::Result<()> {
        let size = span.checked_sub(RECORD_HEADER_LEN)
            .and_then(|s| u32::try_from(s).ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "free span too small"))?;
        writer.write_u32::<BigEndian>(next)?;
        writer.write_u32::<BigEndian>(size)?;
        writer.write_i64::<BigEndian>(0)?;
        writer.write_u8(0)?;
        Ok(())
    }
}

// ── FileInfo ─────────────────────────────────────────────────────────────────

/// In-memory handle for one live entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name:           String,
    pub modified:       DateTime<Utc>,
    pub size:           u64,
    /// Where the record header starts.
    pub record_offset:  ChainOffset,
    /// Where the content bytes start.
    pub content_offset: u64,
}

impl FileInfo {
    pub fn from_header(offset: ChainOffset, header: &RecordHeader) -> Self {
        Self {
            name:           header.name.clone(),
            modified:       decode_time(header.modified),
            size:           header.size as u64,
            record_offset:  offset,
            content_offset: offset.get() + RECORD_HEADER_LEN + header.name.len() as u64,
        }
    }

    #[inline]
    pub fn is_directory(&self) -> bool { self.modified == directory_time() }
}

// ── Chain enumeration ────────────────────────────────────────────────────────

/// Iterator over the records of one bucket chain.
pub struct ChainIter<'a, R: Read + Seek> {
    reader: &'a mut R,
    next:   ChainOffset,
}

impl<'a, R: Read + Seek> ChainIter<'a, R> {
    pub fn new(reader: &'a mut R, head: ChainOffset) -> Self {
        Self { reader, next: head }
    }
}

impl<R: Read + Seek> Iterator for ChainIter<'_, R> {
    type Item = io::Result<(ChainOffset, RecordHeader)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_none() {
            return None;
        }
        let at = self.next;
        let header = self.reader.seek(SeekFrom::Start(at.get()))
            .and_then(|_| RecordHeader::read(&mut *self.reader));
        match header {
            Ok(h) => {
                self.next = ChainOffset(h.next);
                Some(Ok((at, h)))
            }
            Err(e) => {
                self.next = ChainOffset::NONE;
                Some(Err(e))
            }
        }
    }
}
