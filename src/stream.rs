//! Stream views over bundle entries.
//!
//! [`ContentReader`] is a read-only window `[start, start + len)` over its own
//! handle to the bundle file.  Reads stop at the window end and seeks are
//! relative to the window start, so a caller can never observe a neighbouring
//! record.
//!
//! [`ContentWriter`] stages bytes in memory.  Nothing touches the bundle until
//! `flush()`, `finish()` or drop, which hand the whole buffer to the commit
//! path as a single record.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::bundle::Bundle;
use crate::error::Result;
use crate::record::FileInfo;

// ── Reader ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ContentReader {
    file:  File,
    start: u64,
    len:   u64,
    pos:   u64,
}

impl ContentReader {
    pub(crate) fn open(path: &Path, start: u64, len: u64) -> io::Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;
        Ok(Self { file, start, len, pos: 0 })
    }

    /// Length of the entry in bytes.
    pub fn len(&self) -> u64 { self.len }

    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Position within the window.
    pub fn position(&self) -> u64 { self.pos }
}

impl Read for ContentReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = (buf.len() as u64).min(remaining) as usize;
        let n = self.file.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ContentReader {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match target {
            SeekFrom::Start(n)   => (0, n as i128),
            SeekFrom::End(d)     => (self.len as i128, d as i128),
            SeekFrom::Current(d) => (self.pos as i128, d as i128),
        };
        let new_pos = base + delta;
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of entry",
            ));
        }
        let new_pos = u64::try_from(new_pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek offset overflow"))?;
        self.file.seek(SeekFrom::Start(self.start.saturating_add(new_pos)))?;
        self.pos = new_pos;
        Ok(new_pos)
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Staging buffer for one entry.
///
/// Every commit writes the complete buffer as a fresh record and retires the
/// previous one, so writing after a `flush()` is allowed and the next commit
/// simply replaces the entry again.
pub struct ContentWriter<'a> {
    bundle:    &'a mut Bundle,
    name:      String,
    modified:  Option<DateTime<Utc>>,
    buffer:    Vec<u8>,
    dirty:     bool,
    committed: Option<FileInfo>,
}

impl<'a> ContentWriter<'a> {
    pub(crate) fn new(bundle: &'a mut Bundle, name: String) -> Self {
        Self {
            bundle,
            name,
            modified:  None,
            buffer:    Vec::new(),
            dirty:     true,
            committed: None,
        }
    }

    /// Entry name this writer commits to.
    pub fn name(&self) -> &str { &self.name }

    /// Bytes staged so far.
    pub fn len(&self) -> usize { self.buffer.len() }

    pub fn is_empty(&self) -> bool { self.buffer.is_empty() }

    /// Pin the timestamp recorded on commit instead of the commit time.
    pub fn set_modified(&mut self, modified: DateTime<Utc>) {
        self.modified = Some(modified);
        self.dirty = true;
    }

    /// Commit if anything changed since the last commit.
    pub fn commit(&mut self) -> Result<FileInfo> {
        if let (false, Some(info)) = (self.dirty, &self.committed) {
            return Ok(info.clone());
        }
        let modified = self.modified.unwrap_or_else(Utc::now);
        let info = self.bundle.commit(&self.name, &self.buffer, modified)?;
        self.committed = Some(info.clone());
        self.dirty = false;
        Ok(info)
    }

    /// Commit and release the bundle.
    pub fn finish(mut self) -> Result<FileInfo> {
        let result = self.commit();
        self.dirty = false;
        result
    }
}

impl Write for ContentWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit()?;
        Ok(())
    }
}

impl Drop for ContentWriter<'_> {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        if let Err(e) = self.commit() {
            warn!(name = %self.name, error = %e, "dropped writer failed to commit");
        }
    }
}
