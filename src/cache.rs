//! Fixed-size ring of recently resolved entries.
//!
//! Never authoritative: a miss falls back to the bucket chain, and every
//! structural change to an entry must invalidate or refresh its slot.

use crate::hash::names_equal;
use crate::record::FileInfo;

pub const RECENT_CACHE_SLOTS: usize = 16;

#[derive(Debug, Default)]
pub struct RecentCache {
    slots:  [Option<FileInfo>; RECENT_CACHE_SLOTS],
    /// Slot the next insert overwrites; also the oldest entry once full.
    cursor: usize,
}

impl RecentCache {
    pub fn new() -> Self { Self::default() }

    /// Newest-first scan, wrapping once around the ring.
    pub fn get(&self, name: &str) -> Option<&FileInfo> {
        (1..=RECENT_CACHE_SLOTS)
            .map(|back| (self.cursor + RECENT_CACHE_SLOTS - back) % RECENT_CACHE_SLOTS)
            .filter_map(|i| self.slots[i].as_ref())
            .find(|info| names_equal(&info.name, name))
    }

    pub fn insert(&mut self, info: FileInfo) {
        self.slots[self.cursor] = Some(info);
        self.cursor = (self.cursor + 1) % RECENT_CACHE_SLOTS;
    }

    /// Drop every slot naming `name`.
    pub fn invalidate(&mut self, name: &str) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|info| names_equal(&info.name, name)) {
                *slot = None;
            }
        }
    }

    /// Replace the cached copy of `info.name` in place, if present.
    pub fn refresh(&mut self, info: &FileInfo) {
        for slot in self.slots.iter_mut().flatten() {
            if names_equal(&slot.name, &info.name) {
                *slot = info.clone();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
