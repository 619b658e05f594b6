//! Canonical JSON and SHA-256 content addressing.
//!
//! Canonical JSON here means: object keys sorted lexicographically, no
//! insignificant whitespace, UTF-8, numbers in shortest round-trip form,
//! strings JSON-escaped. `serde_jcs` implements exactly this (RFC 8785-style
//! JSON Canonicalization Scheme); every hash input in this service is routed
//! through it so that byte-identical inputs always produce identical ids.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Serializes `value` to its canonical JSON byte form.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_jcs::to_vec(value).map_err(|err| Error::Canonicalization(err.to_string()))
}

/// Hashes `value`'s canonical JSON form with SHA-256, returning lowercase hex.
pub fn canonical_sha256_hex<T: Serialize>(value: &T) -> Result<String> {
    let bytes = to_canonical_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

/// SHA-256 of raw bytes, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 over a sorted sequence of hex-encoded ids, length-prefixed with
/// the count (as decimal ASCII followed by a newline) so that the empty set
/// and a set containing one empty-string id cannot collide.
///
/// Used for `FindingsDigest`: order-independent because callers sort first.
pub fn digest_sorted_ids<S: AsRef<str>>(ids: &[S]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ids.len().to_string().as_bytes());
    hasher.update(b"\n");
    for id in ids {
        hasher.update(id.as_ref().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_bytes_sort_keys() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(
            to_canonical_bytes(&a).unwrap(),
            to_canonical_bytes(&b).unwrap()
        );
    }

    #[test]
    fn canonical_hash_is_deterministic() {
        let a = json!({"x": [1,2,3], "y": "hello"});
        let h1 = canonical_sha256_hex(&a).unwrap();
        let h2 = canonical_sha256_hex(&a).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn digest_sorted_ids_is_order_sensitive_to_input_order() {
        // callers are responsible for sorting; this just verifies the
        // length-prefix avoids trivial concatenation collisions.
        let d1 = digest_sorted_ids(&["ab", "c"]);
        let d2 = digest_sorted_ids(&["a", "bc"]);
        assert_ne!(d1, d2);
    }

    #[test]
    fn digest_empty_differs_from_digest_of_empty_string() {
        let empty: [&str; 0] = [];
        let d1 = digest_sorted_ids(&empty);
        let d2 = digest_sorted_ids(&[""]);
        assert_ne!(d1, d2);
    }
}
