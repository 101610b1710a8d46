//! Canonical cache-key hashing for queries, grounded on the same
//! xxHash-with-fixed-seed pattern used elsewhere in this codebase for
//! deterministic row/key identifiers.

use xxhash_rust::xxh64;

use crate::query::query::Query;

const SEED: u64 = 0x517cc1b727220a95;

/// A deterministic 64-bit cache key for `query`, derived from its canonical
/// rendered text. Two queries that render identically hash identically,
/// regardless of how they were built.
pub fn query_cache_key(query: &Query) -> u64 {
    xxh64::xxh64(query.to_string().as_bytes(), SEED)
}

/// Hashes several strings into one key, record-separator delimited so that
/// `hash_multi(["ab", "c"]) != hash_multi(["a", "bc"])`.
pub fn hash_multi<'a>(parts: impl IntoIterator<Item = &'a str>) -> u64 {
    let mut combined = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            combined.push('\x1E');
        }
        combined.push_str(part);
    }
    xxh64::xxh64(combined.as_bytes(), SEED)
}
