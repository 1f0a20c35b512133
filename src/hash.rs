//! Case-insensitive path hashing.
//!
//! The accumulator is multiplied (in 64 bits) by `lower(c) * ((acc & 0xFF) + 1)`
//! for every character and folded back to 32 bits by XOR-ing the halves.
//! The result is stable across platforms and builds; changing it would
//! orphan every record in existing bundles.
//!
//! Case folding is per character via `char::to_lowercase`.  Names whose
//! uppercase form lowercases back to the original (`lower(upper(c)) ==
//! lower(c)`) share a bucket with it; characters such as `ß`, which
//! uppercases to `SS`, do not, and are treated as distinct names.

const SEED: u32 = 0x811C_9DC5;

#[inline]
fn fold(x: u64) -> u32 {
    ((x >> 32) as u32) ^ (x as u32)
}

/// 32-bit hash of `path`, identical for any casing of the same path.
pub fn path_hash(path: &str) -> u32 {
    let mut acc = SEED;
    for c in path.chars().flat_map(char::to_lowercase) {
        let factor = c as u64 * ((acc & 0xFF) as u64 + 1);
        acc = fold((acc as u64).wrapping_mul(factor));
    }
    acc
}

/// Bucket index of `path` in a table of `bucket_count` slots.
#[inline]
pub fn bucket_index(path: &str, bucket_count: u32) -> usize {
    (path_hash(path) % bucket_count) as usize
}

/// Case-insensitive exact name comparison used by every lookup.
pub fn names_equal(a: &str, b: &str) -> bool {
    if a.is_ascii() && b.is_ascii() {
        return a.eq_ignore_ascii_case(b);
    }
    a.chars().flat_map(char::to_lowercase).eq(b.chars().flat_map(char::to_lowercase))
}
