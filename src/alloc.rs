//! Free-space allocator.
//!
//! Deleted records are appended to a singly-linked free list rooted in the
//! header.  [`allocate`] walks that list once and takes the smallest region
//! whose footprint still fits the new record (best fit).  A winner with more
//! than [`SPLIT_THRESHOLD`] bytes to spare is split and the tail stays on the
//! free list in the winner's place; smaller remainders are absorbed into the
//! new record as untracked slack.  When nothing fits, the record goes at
//! end-of-file.
//!
//! Adjacent free regions are never merged.

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::error::{BundleError, Result};
use crate::header::{read_link, BundleHeader, ChainOffset, FreeOffset, LinkSlot};
use crate::record::FreeRegion;

/// Leftover bytes above which a reused region is split.
pub const SPLIT_THRESHOLD: u64 = 64;

struct Candidate {
    offset: FreeOffset,
    prev:   LinkSlot,
    region: FreeRegion,
}

/// Reserve `needed` bytes and return where the record must be written.
///
/// The free list and header are already patched on return; the caller owns
/// the returned span.
pub fn allocate<S: Read + Write + Seek>(
    store:  &mut S,
    header: &mut BundleHeader,
    needed: u64,
) -> Result<ChainOffset> {
    let Some(best) = best_fit(store, header, needed)? else {
        return allocate_at_end(store, needed);
    };

    let leftover = best.region.footprint() - needed;
    let replacement = if leftover > SPLIT_THRESHOLD {
        let split_at = best.offset.get() + needed;
        store.seek(SeekFrom::Start(split_at))?;
        FreeRegion::write_span(&mut *store, best.region.next, leftover)?;
        debug!(offset = best.offset.0, needed, leftover, "split free region");
        split_at as u32
    } else {
        debug!(offset = best.offset.0, needed, slack = leftover, "reused free region");
        best.region.next
    };
    header.patch(store, best.prev, replacement)?;

    Ok(best.offset.into_chain())
}

fn best_fit<S: Read + Seek>(
    store:  &mut S,
    header: &BundleHeader,
    needed: u64,
) -> Result<Option<Candidate>> {
    let mut best: Option<Candidate> = None;
    let mut prev = LinkSlot::FreeHead;
    let mut cur  = header.free_head;

    while !cur.is_none() {
        store.seek(SeekFrom::Start(cur.get()))?;
        let region = FreeRegion::read(&mut *store)?;
        let fits    = region.footprint() >= needed;
        let tighter = best.as_ref().map_or(true, |b| region.footprint() < b.region.footprint());
        if fits && tighter {
            best = Some(Candidate { offset: cur, prev, region });
        }
        prev = LinkSlot::Record(cur.0);
        cur  = FreeOffset(region.next);
    }
    Ok(best)
}

fn allocate_at_end<S: Seek>(store: &mut S, needed: u64) -> Result<ChainOffset> {
    let end = store.seek(SeekFrom::End(0))?;
    if end + needed > u32::MAX as u64 {
        return Err(BundleError::OffsetOverflow);
    }
    debug!(offset = end, needed, "appending at end of bundle");
    Ok(ChainOffset(end as u32))
}

/// Append the region at `offset` to the tail of the free list.
///
/// The region's own `next` is zeroed first, so it never points back into the
/// bucket chain it came from.
pub fn release<S: Read + Write + Seek>(
    store:  &mut S,
    header: &mut BundleHeader,
    offset: FreeOffset,
) -> Result<()> {
    header.patch(store, LinkSlot::Record(offset.0), 0)?;

    if header.free_head.is_none() {
        header.patch(store, LinkSlot::FreeHead, offset.0)?;
        return Ok(());
    }

    let mut tail = header.free_head.0;
    loop {
        let next = read_link(store, tail)?;
        if next == 0 {
            break;
        }
        tail = next;
    }
    header.patch(store, LinkSlot::Record(tail), offset.0)?;
    Ok(())
}

/// Every region currently on the free list, in list order.
pub fn free_regions<S: Read + Seek>(
    store:  &mut S,
    header: &BundleHeader,
) -> Result<Vec<(FreeOffset, FreeRegion)>> {
    let mut out = Vec::new();
    let mut cur = header.free_head;
    while !cur.is_none() {
        store.seek(SeekFrom::Start(cur.get()))?;
        let region = FreeRegion::read(&mut *store)?;
        out.push((cur, region));
        cur = FreeOffset(region.next);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{footprint, RecordHeader};
    use proptest::prelude::*;
    use std::io::Cursor;

    /// A bundle image with one bucket and the given records placed back to
    /// back after the header.  Returns the store, header and record offsets.
    fn image(records: &[(&str, u32)]) -> (Cursor<Vec<u8>>, BundleHeader, Vec<u32>) {
        let header = BundleHeader::new(1).unwrap();
        let mut store = Cursor::new(Vec::new());
        header.write(&mut store).unwrap();
        let mut offsets = Vec::new();
        for (name, size) in records {
            let at = store.position();
            offsets.push(at as u32);
            RecordHeader { next: 0, size: *size, modified: 0, name: (*name).into() }
                .write(&mut store).unwrap();
            store.write_all(&vec![0xEE; *size as usize]).unwrap();
        }
        (store, header, offsets)
    }

    #[test]
    fn empty_free_list_appends() {
        let (mut store, mut header, _) = image(&[("a", 4)]);
        let end = store.get_ref().len() as u32;
        let at = allocate(&mut store, &mut header, 30).unwrap();
        assert_eq!(at, ChainOffset(end));
    }

    #[test]
    fn picks_smallest_sufficient_region() {
        let (mut store, mut header, offs) = image(&[("big", 200), ("small", 20), ("tiny", 1)]);
        for &o in &offs {
            release(&mut store, &mut header, FreeOffset(o)).unwrap();
        }

        let needed = footprint(5, 10);
        let at = allocate(&mut store, &mut header, needed).unwrap();
        assert_eq!(at, ChainOffset(offs[1]));

        let left: Vec<u32> = free_regions(&mut store, &header).unwrap()
            .into_iter().map(|(o, _)| o.0).collect();
        assert_eq!(left, [offs[0], offs[2]]);
    }

    #[test]
    fn large_leftover_is_split() {
        let (mut store, mut header, offs) = image(&[("big", 200)]);
        release(&mut store, &mut header, FreeOffset(offs[0])).unwrap();

        let region_fp = footprint(3, 200);
        let needed = footprint(1, 10);
        let at = allocate(&mut store, &mut header, needed).unwrap();
        assert_eq!(at, ChainOffset(offs[0]));

        let left = free_regions(&mut store, &header).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].0, FreeOffset(offs[0] + needed as u32));
        assert_eq!(left[0].1.footprint(), region_fp - needed);
    }

    #[test]
    fn small_leftover_is_absorbed() {
        let (mut store, mut header, offs) = image(&[("abc", 60)]);
        release(&mut store, &mut header, FreeOffset(offs[0])).unwrap();

        let needed = footprint(3, 60) - SPLIT_THRESHOLD;
        let at = allocate(&mut store, &mut header, needed).unwrap();
        assert_eq!(at, ChainOffset(offs[0]));
        assert!(header.free_head.is_none());
    }

    #[test]
    fn first_leftover_above_threshold_is_split() {
        let (mut store, mut header, offs) = image(&[("abc", 60)]);
        release(&mut store, &mut header, FreeOffset(offs[0])).unwrap();

        let needed = footprint(3, 60) - (SPLIT_THRESHOLD + 1);
        let at = allocate(&mut store, &mut header, needed).unwrap();
        assert_eq!(at, ChainOffset(offs[0]));

        let left = free_regions(&mut store, &header).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].0, FreeOffset(offs[0] + needed as u32));
        assert_eq!(left[0].1.footprint(), SPLIT_THRESHOLD + 1);
    }

    #[test]
    fn release_appends_at_tail() {
        let (mut store, mut header, offs) = image(&[("a", 1), ("b", 1), ("c", 1)]);
        release(&mut store, &mut header, FreeOffset(offs[2])).unwrap();
        release(&mut store, &mut header, FreeOffset(offs[0])).unwrap();
        release(&mut store, &mut header, FreeOffset(offs[1])).unwrap();

        let order: Vec<u32> = free_regions(&mut store, &header).unwrap()
            .into_iter().map(|(o, _)| o.0).collect();
        assert_eq!(order, [offs[2], offs[0], offs[1]]);
    }

    proptest! {
        #[test]
        fn allocation_never_overlaps_free_space(
            sizes in prop::collection::vec(0u32..300, 1..12),
            want  in 0u32..400,
        ) {
            let names: Vec<String> = (0..sizes.len()).map(|i| format!("r{i}")).collect();
            let recs: Vec<(&str, u32)> = names.iter().map(String::as_str).zip(sizes).collect();
            let (mut store, mut header, offs) = image(&recs);
            for &o in &offs {
                release(&mut store, &mut header, FreeOffset(o)).unwrap();
            }

            let needed = footprint(4, want);
            let at = allocate(&mut store, &mut header, needed).unwrap().get();
            for (off, region) in free_regions(&mut store, &header).unwrap() {
                let start = off.get();
                let end = start + region.footprint();
                prop_assert!(end <= at || start >= at + needed);
            }
        }
    }
}
