//! Payload canonicalization and integrity hashes.
//!
//! Every offline record carries a SHA-256 checksum of its canonicalized
//! payload. Canonical form sorts object keys recursively so the same logical
//! payload always hashes to the same value regardless of insertion order.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compute the checksum for a record payload.
pub fn record_checksum(data: &Value) -> String {
    sha256_hex(canonical_json(data).as_bytes())
}

/// Check a payload against a previously stored checksum.
pub fn verify(data: &Value, checksum: &str) -> bool {
    record_checksum(data) == checksum
}

/// Hex-encoded SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Serialize a JSON value in canonical form (recursively sorted keys).
pub fn canonical_json(value: &Value) -> String {
    // A JSON value with string keys always serializes.
    serde_json::to_string(&canonicalize(value)).expect("JSON value serialization cannot fail")
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn checksum_is_stable_across_key_order() {
        let a = json!({"unit": "mm", "value": 4.2, "nested": {"b": 1, "a": 2}});
        let b = json!({"nested": {"a": 2, "b": 1}, "value": 4.2, "unit": "mm"});
        assert_eq!(record_checksum(&a), record_checksum(&b));
    }

    #[test]
    fn checksum_changes_with_payload() {
        let a = json!({"value": 4.2});
        let b = json!({"value": 4.3});
        assert_ne!(record_checksum(&a), record_checksum(&b));
    }

    #[test]
    fn verify_detects_tampering() {
        let data = json!({"status": "pass"});
        let checksum = record_checksum(&data);
        assert!(verify(&data, &checksum));
        assert!(!verify(&json!({"status": "fail"}), &checksum));
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let value = json!({"b": 1, "a": [ {"z": 0, "y": 1} ]});
        assert_eq!(canonical_json(&value), r#"{"a":[{"y":1,"z":0}],"b":1}"#);
    }
}
