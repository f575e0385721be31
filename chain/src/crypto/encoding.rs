//! Canonical encoding and object hashing.
//!
//! Every hash and signature in the chain is computed over one reproducible
//! byte sequence: the compact JSON rendering of a value with all object keys
//! sorted lexicographically. Two logically equal values always produce
//! byte-identical output, so transaction ids, block hashes, state roots and
//! signatures are stable across independently-built nodes.
//!
//! No component may hash or sign bytes produced by any other route.

use serde::Serialize;
use serde_json::Value;
use sha3::{Digest, Sha3_256};

use crate::types::Hash256;

/// Converts any serializable value into its canonical [`Value`] tree.
///
/// `serde_json`'s default object representation is a BTree map, so object
/// keys come out sorted; nested maps (e.g. the free-form `data` field of a
/// transaction) are sorted recursively for free.
///
/// # Panics
///
/// Panics if the value cannot be represented as JSON. This is considered a
/// programming error, because every signable type in this crate is built
/// from booleans, integers, strings, sequences and string-keyed maps.
pub fn canonical_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).expect("signable values should always be representable as JSON")
}

/// Renders a canonical [`Value`] tree as the canonical byte form.
///
/// The output is compact JSON: `,` and `:` separators with no whitespace,
/// integers in plain decimal, strings minimally escaped. Combined with the
/// sorted keys of [`canonical_value`] this is the one true encoding used for
/// hashing and signing.
pub fn canonical_json(value: &Value) -> String {
    value.to_string()
}

/// SHA3-256 over raw bytes.
pub fn sha3_256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    Hash256(hasher.finalize().into())
}

/// Deterministic hash of any serializable value.
///
/// Defined as `sha3_256(canonical_json(canonical_value(v)))`. This is the
/// `hash(v)` of the protocol: transaction ids, block hashes, merkle leaves
/// and state roots are all produced here.
pub fn hash_value<T: Serialize>(value: &T) -> Hash256 {
    let canonical = canonical_json(&canonical_value(value));
    sha3_256(canonical.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted() {
        let v = json!({"zeta": 1, "alpha": 2, "mid": {"b": 1, "a": 2}});
        assert_eq!(
            canonical_json(&v),
            r#"{"alpha":2,"mid":{"a":2,"b":1},"zeta":1}"#
        );
    }

    #[test]
    fn encoding_is_key_order_insensitive() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":[1,2,3]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":[1,2,3],"x":1}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn integers_render_in_plain_decimal() {
        let v = json!({"amount": 1_000_000u64, "nonce": 0});
        assert_eq!(canonical_json(&v), r#"{"amount":1000000,"nonce":0}"#);
    }

    #[test]
    fn hash_value_is_a_function() {
        let v = json!({"a": 1, "b": "two"});
        assert_eq!(hash_value(&v), hash_value(&v));

        let w = json!({"a": 1, "b": "three"});
        assert_ne!(hash_value(&v), hash_value(&w));
    }

    #[test]
    fn null_and_nested_values_encode_stably() {
        let v = json!({"recipient": null, "data": {}});
        assert_eq!(canonical_json(&v), r#"{"data":{},"recipient":null}"#);
    }
}
