use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::constants::HASH_SIZE;

/// SHA-256 over the JSON form of `values`, independent of their order.
///
/// Each value is stringified, the strings are sorted and joined with a single
/// space before hashing, so `crypto_hash(&[a, b]) == crypto_hash(&[b, a])`.
pub fn crypto_hash_bytes(values: &[Value]) -> [u8; HASH_SIZE] {
    let mut parts: Vec<String> = values.iter().map(Value::to_string).collect();
    parts.sort();

    let mut hasher = Sha256::new();
    hasher.update(parts.join(" ").as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&digest[..]);
    out
}

/// Hex form of [`crypto_hash_bytes`].
pub fn crypto_hash(values: &[Value]) -> String {
    hex::encode(crypto_hash_bytes(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HASH_HEX_SIZE;
    use serde_json::json;

    #[test]
    fn hashes_json_form_of_a_string() {
        assert_eq!(
            crypto_hash(&[json!("foo")]),
            "b2213295d564916f89a6a42455567c87c3f480fcd7a1c15e220f17d7169a790b"
        );
    }

    #[test]
    fn argument_order_does_not_matter() {
        let forward = crypto_hash(&[json!("one"), json!("two"), json!("three")]);
        let shuffled = crypto_hash(&[json!("three"), json!("one"), json!("two")]);
        assert_eq!(forward, shuffled);

        let mixed = crypto_hash(&[json!(42), json!({"a": 1}), json!([1, 2])]);
        let mixed_rev = crypto_hash(&[json!([1, 2]), json!({"a": 1}), json!(42)]);
        assert_eq!(mixed, mixed_rev);
    }

    #[test]
    fn different_inputs_hash_differently() {
        assert_ne!(crypto_hash(&[json!("foo")]), crypto_hash(&[json!("bar")]));
        // a number and its string form stringify differently
        assert_ne!(crypto_hash(&[json!(1)]), crypto_hash(&[json!("1")]));
    }

    #[test]
    fn digest_is_fixed_width_hex() {
        let h = crypto_hash(&[json!({"nested": [1, 2, 3]})]);
        assert_eq!(h.len(), HASH_HEX_SIZE);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hex::decode(&h).unwrap(), crypto_hash_bytes(&[json!({"nested": [1, 2, 3]})]));
    }
}
