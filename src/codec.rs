//! Content codec: canonicalize, hash, and (optionally) compress payloads.
//!
//! Grounded on the teacher's `store::log` WAL framing (length-prefixed
//! records) for the on-disk envelope, generalized to add a content hash
//! and a self-describing compression tag so `decode` never needs
//! out-of-band context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{FloridifyError, Result};

/// Codec tag stored alongside encoded bytes so decode is self-describing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionCodec {
    None,
    Zstd,
}

/// Stable SHA-256 digest of a payload's canonical serialization, as hex.
pub type ContentHash = String;

/// Canonicalize a JSON value: sort object keys recursively and drop any
/// field named in `volatile_fields` at every nesting level (timestamps,
/// random ids — anything explicitly excluded from hashing per spec §4.1).
pub fn canonicalize(value: &Value, volatile_fields: &[&str]) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> =
                std::collections::BTreeMap::new();
            for (k, v) in map {
                if volatile_fields.contains(&k.as_str()) {
                    continue;
                }
                sorted.insert(k.clone(), canonicalize(v, volatile_fields));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| canonicalize(v, volatile_fields)).collect())
        }
        other => other.clone(),
    }
}

/// Hash the canonical serialization of `value`. Deterministic over content
/// only (I3): two payloads that canonicalize identically hash identically,
/// regardless of field order or excluded volatile fields.
pub fn hash_canonical(value: &Value, volatile_fields: &[&str]) -> ContentHash {
    let canonical = canonicalize(value, volatile_fields);
    // serde_json serializes a BTreeMap-backed Object in key order, so this
    // byte stream is stable across runs and processes.
    let bytes = serde_json::to_vec(&canonical).expect("canonical value is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

/// Encode a payload: serialize to JSON, compress if it crosses
/// `compression_threshold`, and return `(bytes, content_hash, codec,
/// original_len)` — `original_len` is the pre-compression byte length, so
/// callers that split inline/external storage can record it distinctly
/// from the final `bytes.len()` (spec §3 `ContentLocation.size_original`).
pub fn encode(
    value: &Value,
    volatile_fields: &[&str],
    compression_threshold: usize,
    compression_level: i32,
) -> Result<(Vec<u8>, ContentHash, CompressionCodec, usize)> {
    let hash = hash_canonical(value, volatile_fields);
    let raw = serde_json::to_vec(value)?;
    let original_len = raw.len();

    if raw.len() >= compression_threshold {
        let compressed = zstd::encode_all(&raw[..], compression_level)
            .map_err(|e| FloridifyError::persistence(format!("zstd compression failed: {e}")))?;
        Ok((compressed, hash, CompressionCodec::Zstd, original_len))
    } else {
        Ok((raw, hash, CompressionCodec::None, original_len))
    }
}

/// Decode bytes produced by [`encode`] back into a [`Value`].
///
/// Fails with `CorruptContent` if the codec tag is unknown, decompression
/// fails, or the resulting bytes don't parse as JSON. Callers must not
/// retry — the content itself is broken, not the I/O path.
pub fn decode(bytes: &[u8], codec: CompressionCodec) -> Result<Value> {
    let raw = match codec {
        CompressionCodec::None => bytes.to_vec(),
        CompressionCodec::Zstd => zstd::decode_all(bytes)
            .map_err(|e| FloridifyError::corrupt_content(format!("zstd decompression failed: {e}")))?,
    };
    serde_json::from_slice(&raw)
        .map_err(|e| FloridifyError::corrupt_content(format!("payload did not parse as JSON: {e}")))
}

// Tiny local hex encoder so we don't pull in the `hex` crate for one call site.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        use std::fmt::Write;
        let mut s = String::with_capacity(bytes.as_ref().len() * 2);
        for b in bytes.as_ref() {
            write!(s, "{b:02x}").unwrap();
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_sorts_keys_and_drops_volatile_fields() {
        let a = json!({"b": 1, "a": 2, "created_at": "2024-01-01"});
        let b = json!({"a": 2, "created_at": "2099-12-31", "b": 1});
        assert_eq!(
            hash_canonical(&a, &["created_at"]),
            hash_canonical(&b, &["created_at"])
        );
    }

    #[test]
    fn hash_is_sensitive_to_payload_content() {
        let a = json!({"x": 1});
        let b = json!({"x": 2});
        assert_ne!(hash_canonical(&a, &[]), hash_canonical(&b, &[]));
    }

    #[test]
    fn round_trip_small_payload_is_uncompressed() {
        let value = json!({"word": "apple"});
        let (bytes, hash1, codec, original_len) = encode(&value, &[], 4096, 3).unwrap();
        assert_eq!(codec, CompressionCodec::None);
        assert_eq!(original_len, bytes.len());
        let decoded = decode(&bytes, codec).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(hash1, hash_canonical(&value, &[]));
    }

    #[test]
    fn round_trip_large_payload_is_compressed() {
        let big_text = "word ".repeat(10_000);
        let value = json!({"text": big_text});
        let (bytes, _hash, codec, original_len) = encode(&value, &[], 4096, 3).unwrap();
        assert_eq!(codec, CompressionCodec::Zstd);
        assert!(original_len > bytes.len(), "compressed payload should shrink");
        let decoded = decode(&bytes, codec).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn decode_rejects_corrupt_bytes() {
        let err = decode(b"not json and not zstd", CompressionCodec::Zstd).unwrap_err();
        assert!(matches!(err, FloridifyError::CorruptContent(_)));
    }
}
