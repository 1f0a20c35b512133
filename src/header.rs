//! Fixed bundle header: signature, bucket table and free-list head.
//!
//! # Layout (big-endian)
//!
//! | Offset        | Size  | Field                                  |
//! |---------------|-------|----------------------------------------|
//! | 0             | 3     | magic `BDL`                            |
//! | 3             | 1     | format version                         |
//! | 4             | 4     | bucket count `N`                       |
//! | 8             | 4 × N | bucket-head offsets (0 = empty bucket) |
//! | 8 + 4N        | 4     | free-list head (0 = no free regions)   |
//!
//! The bucket count is chosen once at creation and never changes.  The
//! in-memory [`BundleHeader`] mirrors these fields; every structural change
//! patches the single affected slot on disk through [`LinkSlot::position`].

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{BundleError, Result};

pub const MAGIC: &[u8; 3] = b"BDL";
/// Highest format version this build reads and the version it writes.
pub const VERSION: u8 = 1;
/// Bucket count used when the caller does not pick one.
pub const DEFAULT_BUCKET_COUNT: u32 = 17;

// ── Typed offsets ────────────────────────────────────────────────────────────

/// Position of a live record reachable from a bucket chain.  `0` terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChainOffset(pub u32);

/// Position of a reclaimed region reachable from the free list.  `0` terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FreeOffset(pub u32);

impl ChainOffset {
    pub const NONE: ChainOffset = ChainOffset(0);

    #[inline]
    pub fn is_none(self) -> bool { self.0 == 0 }

    /// The region is leaving its bucket chain for the free list.
    #[inline]
    pub fn into_free(self) -> FreeOffset { FreeOffset(self.0) }

    #[inline]
    pub fn get(self) -> u64 { self.0 as u64 }
}

impl FreeOffset {
    pub const NONE: FreeOffset = FreeOffset(0);

    #[inline]
    pub fn is_none(self) -> bool { self.0 == 0 }

    /// The region has been handed out by the allocator to hold a record.
    #[inline]
    pub fn into_chain(self) -> ChainOffset { ChainOffset(self.0) }

    #[inline]
    pub fn get(self) -> u64 { self.0 as u64 }
}

// ── Link slots ───────────────────────────────────────────────────────────────

/// A 32-bit location holding a link that may need patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSlot {
    /// Head slot of bucket `i` in the header table.
    BucketHead(usize),
    /// Free-list head slot in the header.
    FreeHead,
    /// The `next` field of the record (or free region) starting at this offset.
    Record(u32),
}

impl LinkSlot {
    /// Absolute byte position of the slot in the bundle file.
    pub fn position(self, bucket_count: u32) -> u64 {
        match self {
            LinkSlot::BucketHead(i) => BUCKET_TABLE_OFFSET + 4 * i as u64,
            LinkSlot::FreeHead      => BUCKET_TABLE_OFFSET + 4 * bucket_count as u64,
            LinkSlot::Record(off)   => off as u64,
        }
    }
}

const BUCKET_TABLE_OFFSET: u64 = 8;

// ── BundleHeader ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHeader {
    pub version:   u8,
    pub buckets:   Vec<ChainOffset>,
    pub free_head: FreeOffset,
}

impl BundleHeader {
    pub fn new(bucket_count: u32) -> Result<Self> {
        if bucket_count == 0 {
            return Err(BundleError::InvalidBucketCount(bucket_count));
        }
        Ok(Self {
            version:   VERSION,
            buckets:   vec![ChainOffset::NONE; bucket_count as usize],
            free_head: FreeOffset::NONE,
        })
    }

    #[inline]
    pub fn bucket_count(&self) -> u32 { self.buckets.len() as u32 }

    /// Total header length; the first record can start here.
    pub fn encoded_len(&self) -> u64 {
        BUCKET_TABLE_OFFSET + 4 * self.buckets.len() as u64 + 4
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u8(self.version)?;
        writer.write_u32::<BigEndian>(self.bucket_count())?;
        for head in &self.buckets {
            writer.write_u32::<BigEndian>(head.0)?;
        }
        writer.write_u32::<BigEndian>(self.free_head.0)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 3];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(BundleError::InvalidMagic);
        }
        let version = reader.read_u8()?;
        if version > VERSION {
            return Err(BundleError::UnsupportedVersion(version));
        }
        let bucket_count = reader.read_u32::<BigEndian>()?;
        if bucket_count == 0 {
            return Err(BundleError::InvalidBucketCount(0));
        }
        let mut buckets = Vec::with_capacity(bucket_count.min(1 << 16) as usize);
        for _ in 0..bucket_count {
            buckets.push(ChainOffset(reader.read_u32::<BigEndian>()?));
        }
        let free_head = FreeOffset(reader.read_u32::<BigEndian>()?);
        Ok(Self { version, buckets, free_head })
    }

    /// Write `value` into `slot` on disk and mirror it in memory when the
    /// slot lives in the header.
    pub fn patch<S: Write + Seek>(&mut self, store: &mut S, slot: LinkSlot, value: u32) -> io::Result<()> {
        store.seek(SeekFrom::Start(slot.position(self.bucket_count())))?;
        store.write_u32::<BigEndian>(value)?;
        match slot {
            LinkSlot::BucketHead(i) => self.buckets[i] = ChainOffset(value),
            LinkSlot::FreeHead      => self.free_head = FreeOffset(value),
            LinkSlot::Record(_)     => {}
        }
        Ok(())
    }
}

/// Read the 32-bit link stored at `offset`.
pub fn read_link<S: Read + Seek>(store: &mut S, offset: u32) -> io::Result<u32> {
    store.seek(SeekFrom::Start(offset as u64))?;
    store.read_u32::<BigEndian>()
}
