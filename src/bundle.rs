//! [`Bundle`]: name-based access to the entries of one bundle file.
//!
//! ```no_run
//! use std::io::{Read, Write};
//! use bundlefs::bundle::{Bundle, BundleOptions};
//!
//! let mut bundle = Bundle::create("assets.bdl", BundleOptions::default())?;
//! let mut w = bundle.create_file("dir/readme.txt")?.expect("not a directory");
//! w.write_all(b"Hello, world!")?;
//! w.finish()?;
//!
//! let mut text = String::new();
//! bundle.open_file("dir/readme.txt")?.expect("just written").read_to_string(&mut text)?;
//! assert_eq!(text, "Hello, world!");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, WriteBytesExt};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::alloc;
use crate::cache::RecentCache;
use crate::error::{BundleError, Result};
use crate::hash::{bucket_index, names_equal};
use crate::header::{read_link, BundleHeader, ChainOffset, LinkSlot, DEFAULT_BUCKET_COUNT};
use crate::record::{
    decode_time, directory_time, encode_time, footprint, ChainIter, FileInfo, RecordHeader, MAX_NAME_LEN,
};
use crate::stream::{ContentReader, ContentWriter};

// ── BundleOptions ────────────────────────────────────────────────────────────

/// Configuration for [`Bundle::create`].  Ignored when opening an existing
/// bundle: the persisted header always wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    pub bucket_count: u32,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self { bucket_count: DEFAULT_BUCKET_COUNT }
    }
}

impl BundleOptions {
    /// Smallest prime not below the square root of `entries`.
    pub fn for_expected_entries(entries: u64) -> Self {
        let mut n = ((entries as f64).sqrt().ceil() as u32).max(2);
        while !is_prime(n) {
            n += 1;
        }
        Self { bucket_count: n }
    }
}

fn is_prime(n: u32) -> bool {
    let n = n as u64;
    n >= 2 && (2u64..).take_while(|d| d * d <= n).all(|d| n % d != 0)
}

// ── BundleStats ──────────────────────────────────────────────────────────────

/// Point-in-time layout summary, see [`Bundle::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleStats {
    pub version:       u8,
    pub bucket_count:  u32,
    pub used_buckets:  u32,
    pub longest_chain: u32,
    pub files:         u64,
    pub directories:   u64,
    /// Sum of live record footprints.
    pub live_bytes:    u64,
    pub free_regions:  u64,
    /// Sum of free region footprints.
    pub free_bytes:    u64,
    pub file_len:      u64,
}

// ── Bundle ───────────────────────────────────────────────────────────────────

/// An open bundle file.
///
/// Owns the read/write handle, the in-memory copy of the header and the
/// recent-lookup cache.  Not safe to share between threads or processes
/// while mutating; callers must serialize access themselves.
pub struct Bundle {
    path:   PathBuf,
    file:   File,
    header: BundleHeader,
    cache:  RecentCache,
}

impl Bundle {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Create (or truncate) a bundle at `path` with an empty bucket table.
    pub fn create<P: AsRef<Path>>(path: P, opts: BundleOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let header = BundleHeader::new(opts.bucket_count)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut buf = Vec::with_capacity(header.encoded_len() as usize);
        header.write(&mut buf)?;
        file.write_all(&buf)?;
        file.flush()?;

        debug!(path = %path.display(), buckets = header.bucket_count(), "created bundle");
        Ok(Self { path, file, header, cache: RecentCache::new() })
    }

    /// Open an existing bundle.  Falls back to a read-only handle when the
    /// file is not writable; mutations then fail with an I/O error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let mut file = match OpenOptions::new().read(true).write(true).open(&path) {
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => File::open(&path)?,
            other => other?,
        };
        let header = BundleHeader::read(BufReader::new(&mut file))?;

        debug!(path = %path.display(), buckets = header.bucket_count(), "opened bundle");
        Ok(Self { path, file, header, cache: RecentCache::new() })
    }

    /// Open `path` if it exists, otherwise create it with `opts`.
    pub fn open_or_create<P: AsRef<Path>>(path: P, opts: BundleOptions) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path, opts)
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// True for a file entry; directories report `false`.
    pub fn exists(&mut self, path: &str) -> Result<bool> {
        Ok(self.stat(path)?.is_some_and(|info| !info.is_directory()))
    }

    pub fn is_directory(&mut self, path: &str) -> Result<bool> {
        Ok(self.stat(path)?.is_some_and(|info| info.is_directory()))
    }

    /// Metadata for a file or directory entry.
    pub fn stat(&mut self, path: &str) -> Result<Option<FileInfo>> {
        match entry_name(path) {
            Ok(name) => self.lookup(&name),
            Err(_)   => Ok(None),
        }
    }

    /// Content length of the entry at `path`; 0 for directories.
    pub fn size(&mut self, path: &str) -> Result<Option<u64>> {
        Ok(self.stat(path)?.map(|info| info.size))
    }

    /// Last-modified time.  Directories report [`directory_time`].
    pub fn modified(&mut self, path: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.stat(path)?.map(|info| info.modified))
    }

    /// Every file below `prefix` (all files when `None`), in bucket order.
    pub fn list_files(&mut self, prefix: Option<&str>) -> Result<Vec<String>> {
        self.list(prefix, false)
    }

    pub fn list_directories(&mut self, prefix: Option<&str>) -> Result<Vec<String>> {
        self.list(prefix, true)
    }

    pub fn bucket_count(&self) -> u32 { self.header.bucket_count() }

    pub fn path(&self) -> &Path { &self.path }

    pub fn stats(&mut self) -> Result<BundleStats> {
        let mut stats = BundleStats {
            version:       self.header.version,
            bucket_count:  self.header.bucket_count(),
            used_buckets:  0,
            longest_chain: 0,
            files:         0,
            directories:   0,
            live_bytes:    0,
            free_regions:  0,
            free_bytes:    0,
            file_len:      self.file.metadata()?.len(),
        };

        let Self { file, header, .. } = self;
        let mut reader = BufReader::new(&mut *file);
        for &head in &header.buckets {
            if head.is_none() {
                continue;
            }
            stats.used_buckets += 1;
            let mut chain_len = 0;
            for entry in ChainIter::new(&mut reader, head) {
                let (_, record) = entry?;
                chain_len += 1;
                stats.live_bytes += record.footprint();
                if record.is_directory() {
                    stats.directories += 1;
                } else {
                    stats.files += 1;
                }
            }
            stats.longest_chain = stats.longest_chain.max(chain_len);
        }

        for (_, region) in alloc::free_regions(&mut reader, header)? {
            stats.free_regions += 1;
            stats.free_bytes += region.footprint();
        }
        Ok(stats)
    }

    // ── Streams ──────────────────────────────────────────────────────────────

    /// Open a file entry for reading.  `None` when absent or a directory.
    pub fn open_file(&mut self, path: &str) -> Result<Option<ContentReader>> {
        match self.stat(path)? {
            Some(info) if !info.is_directory() => {
                Ok(Some(ContentReader::open(&self.path, info.content_offset, info.size)?))
            }
            _ => Ok(None),
        }
    }

    /// Start writing `path`.  The entry is created (or replaced) when the
    /// returned writer commits.  `None` when a directory already has that name.
    pub fn create_file(&mut self, path: &str) -> Result<Option<ContentWriter<'_>>> {
        let name = entry_name(path)?;
        if self.lookup(&name)?.is_some_and(|info| info.is_directory()) {
            return Ok(None);
        }
        Ok(Some(ContentWriter::new(self, name)))
    }

    /// Write `data` to `path` in one step.
    pub fn write_file(&mut self, path: &str, data: &[u8]) -> Result<Option<FileInfo>> {
        let Some(mut writer) = self.create_file(path)? else {
            return Ok(None);
        };
        writer.write_all(data)?;
        writer.finish().map(Some)
    }

    /// Read a whole file entry into memory.
    pub fn read_file(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(mut reader) = self.open_file(path)? else {
            return Ok(None);
        };
        let mut out = Vec::with_capacity(reader.len() as usize);
        reader.read_to_end(&mut out)?;
        Ok(Some(out))
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Add a directory entry.  `false` if any entry already has that name.
    pub fn create_directory(&mut self, path: &str) -> Result<bool> {
        let name = entry_name(path)?;
        if self.lookup(&name)?.is_some() {
            return Ok(false);
        }
        self.commit(&name, &[], directory_time())?;
        Ok(true)
    }

    /// Remove a file or directory entry.  `false` if nothing matched.
    pub fn delete(&mut self, path: &str) -> Result<bool> {
        match self.stat(path)? {
            Some(info) => self.unlink(&info),
            None       => Ok(false),
        }
    }

    /// Rewrite the timestamp of a file entry in place.
    ///
    /// Returns `false` for missing entries and directories, and refuses the
    /// directory sentinel itself, which would turn the file into a directory.
    pub fn set_modified(&mut self, path: &str, modified: DateTime<Utc>) -> Result<bool> {
        let Some(mut info) = self.stat(path)? else {
            return Ok(false);
        };
        if info.is_directory() || modified == directory_time() {
            return Ok(false);
        }
        self.file.seek(SeekFrom::Start(info.record_offset.get() + 8))?;
        self.file.write_i64::<BigEndian>(encode_time(modified))?;
        info.modified = decode_time(encode_time(modified));
        self.cache.refresh(&info);
        Ok(true)
    }

    // ── Engine internals ─────────────────────────────────────────────────────

    /// Resolve a normalized name: recent cache first, then the bucket chain.
    fn lookup(&mut self, name: &str) -> Result<Option<FileInfo>> {
        if let Some(info) = self.cache.get(name) {
            return Ok(Some(info.clone()));
        }

        let bucket = bucket_index(name, self.header.bucket_count());
        let head = self.header.buckets[bucket];
        if head.is_none() {
            return Ok(None);
        }

        for entry in ChainIter::new(&mut self.file, head) {
            let (offset, record) = entry?;
            if names_equal(&record.name, name) {
                let info = FileInfo::from_header(offset, &record);
                self.cache.insert(info.clone());
                return Ok(Some(info));
            }
        }
        Ok(None)
    }

    /// Durably write `name` with `content` and link it at the tail of its
    /// bucket chain.  An existing entry of the same name is deleted first.
    pub(crate) fn commit(
        &mut self,
        name:     &str,
        content:  &[u8],
        modified: DateTime<Utc>,
    ) -> Result<FileInfo> {
        let size = u32::try_from(content.len())
            .map_err(|_| BundleError::ContentTooLarge(content.len() as u64))?;

        if let Some(old) = self.lookup(name)? {
            self.unlink(&old)?;
        }

        let needed = footprint(name.len(), size);
        let at = alloc::allocate(&mut self.file, &mut self.header, needed)?;

        let record = RecordHeader {
            next:     0,
            size,
            modified: encode_time(modified),
            name:     name.to_owned(),
        };
        let mut buf = Vec::with_capacity(needed as usize);
        record.write(&mut buf)?;
        buf.extend_from_slice(content);
        self.file.seek(SeekFrom::Start(at.get()))?;
        self.file.write_all(&buf)?;

        let bucket = bucket_index(name, self.header.bucket_count());
        let tail = self.chain_tail(bucket)?;
        self.header.patch(&mut self.file, tail, at.0)?;

        let info = FileInfo::from_header(at, &record);
        self.cache.insert(info.clone());
        debug!(name, offset = at.0, size, bucket, "committed entry");
        Ok(info)
    }

    /// The slot a new record in `bucket` must be linked through.
    fn chain_tail(&mut self, bucket: usize) -> Result<LinkSlot> {
        let mut cur = self.header.buckets[bucket];
        if cur.is_none() {
            return Ok(LinkSlot::BucketHead(bucket));
        }
        loop {
            let next = read_link(&mut self.file, cur.0)?;
            if next == 0 {
                return Ok(LinkSlot::Record(cur.0));
            }
            cur = ChainOffset(next);
        }
    }

    /// Take `info`'s record out of its chain and hand the region to the
    /// free list.
    fn unlink(&mut self, info: &FileInfo) -> Result<bool> {
        let bucket = bucket_index(&info.name, self.header.bucket_count());
        let mut prev = LinkSlot::BucketHead(bucket);
        let mut cur = self.header.buckets[bucket];

        while !cur.is_none() {
            let next = read_link(&mut self.file, cur.0)?;
            if cur == info.record_offset {
                self.header.patch(&mut self.file, prev, next)?;
                alloc::release(&mut self.file, &mut self.header, cur.into_free())?;
                self.cache.invalidate(&info.name);
                debug!(name = %info.name, offset = cur.0, "deleted entry");
                return Ok(true);
            }
            prev = LinkSlot::Record(cur.0);
            cur = ChainOffset(next);
        }

        // Cached handle no longer matches the chain.
        self.cache.invalidate(&info.name);
        Ok(false)
    }

    fn list(&mut self, prefix: Option<&str>, directories: bool) -> Result<Vec<String>> {
        let prefix = prefix.and_then(|p| entry_name(p).ok()).map(|p| p.to_lowercase() + "/");

        let Self { file, header, .. } = self;
        let mut reader = BufReader::new(&mut *file);
        let mut out = Vec::new();
        for &head in &header.buckets {
            for entry in ChainIter::new(&mut reader, head) {
                let (_, record) = entry?;
                if record.is_directory() != directories {
                    continue;
                }
                let under = prefix.as_ref()
                    .map_or(true, |p| record.name.to_lowercase().starts_with(p.as_str()));
                if under {
                    out.push(record.name);
                }
            }
        }
        Ok(out)
    }
}

/// Normalize a caller path into the name stored on disk: `\` becomes `/`,
/// empty segments are dropped.
pub fn entry_name(path: &str) -> Result<String> {
    let name = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if name.is_empty() {
        return Err(BundleError::EmptyName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(BundleError::NameTooLong(name.len()));
    }
    Ok(name)
}
