//! Canonical serialization for fingerprints.
//!
//! Graph digests, parameter hashes and result fingerprints are computed over
//! the canonical JSON form of a value.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - Stable collection order: only `Vec`, `BTreeMap` and `BTreeSet` are hashed
//! - No `HashMap` in hashed data

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes.
///
/// Panics only if the value's `Serialize` impl fails, which the crate's
/// types (plain data, string-keyed maps) never do.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// xxh64 of the canonical bytes.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// [`canonical_hash`] as 16 lowercase hex digits.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::types::NodeSource;

    #[test]
    fn test_determinism() {
        let sources: BTreeSet<NodeSource> = ["b/B.kt", "a/A.java"].into_iter().map(NodeSource::new).collect();
        assert_eq!(canonical_hash(&sources), canonical_hash(&sources.clone()));
    }

    #[test]
    fn test_insertion_order_irrelevant() {
        let forward: BTreeSet<NodeSource> = ["a/A.java", "b/B.kt"].into_iter().map(NodeSource::new).collect();
        let backward: BTreeSet<NodeSource> = ["b/B.kt", "a/A.java"].into_iter().map(NodeSource::new).collect();
        assert_eq!(canonical_hash_hex(&forward), canonical_hash_hex(&backward));
    }

    #[test]
    fn test_hex_width() {
        assert_eq!(canonical_hash_hex(&0u8).len(), 16);
    }
}
