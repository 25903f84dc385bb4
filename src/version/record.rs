//! Resource identity and version record types (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::CompressionCodec;

/// Closed enum of resource types (spec §3 "Resource identity").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    Dictionary,
    Corpus,
    Language,
    Literature,
    Search,
    Trie,
    Semantic,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dictionary => "dictionary",
            Self::Corpus => "corpus",
            Self::Language => "language",
            Self::Literature => "literature",
            Self::Search => "search",
            Self::Trie => "trie",
            Self::Semantic => "semantic",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Names a version chain: `(resource_type, resource_id[, discriminator])`.
/// The discriminator extends the key when multiple independent chains
/// share an id (e.g. a `SemanticIndex` keyed by corpus id *and* embedding
/// model name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub discriminator: Option<String>,
}

impl ResourceKey {
    pub fn new(resource_type: ResourceType, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type,
            resource_id: resource_id.into(),
            discriminator: None,
        }
    }

    pub fn with_discriminator(
        resource_type: ResourceType,
        resource_id: impl Into<String>,
        discriminator: impl Into<String>,
    ) -> Self {
        Self {
            resource_type,
            resource_id: resource_id.into(),
            discriminator: Some(discriminator.into()),
        }
    }

    /// A flat string safe to use as a cache/blob key: type, id and
    /// discriminator joined so distinct chains never collide.
    pub fn chain_key(&self) -> String {
        match &self.discriminator {
            Some(d) => format!("{}:{}:{}", self.resource_type.as_str(), self.resource_id, d),
            None => format!("{}:{}", self.resource_type.as_str(), self.resource_id),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.chain_key())
    }
}

/// Per-version metadata (spec §3 `VersionInfo`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub data_hash: String,
    pub created_at: DateTime<Utc>,
    pub is_latest: bool,
    pub supersedes: Option<Uuid>,
    pub superseded_by: Option<Uuid>,
    pub parent_version: Option<String>,
    pub change_log: String,
    pub dependencies: Vec<Uuid>,
}

/// Where the payload actually lives (spec §3 `ContentLocation`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContentLocation {
    Inline {
        bytes: Vec<u8>,
        compression_codec: CompressionCodec,
    },
    External {
        namespace: String,
        key: String,
        size_original: u64,
        size_compressed: u64,
        compression_codec: CompressionCodec,
        encrypted: bool,
    },
}

/// Supplies decryption keys for encrypted external blobs (spec §9 DESIGN
/// NOTES "External blob encryption"). The key source itself is out of
/// scope; this seam only lets the version store enforce that an
/// `encrypted` blob decodes only when a key is actually available.
pub trait KeyProvider: Send + Sync {
    fn has_key_for(&self, namespace: &str, key: &str) -> bool;
}

/// A single version in a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: Uuid,
    pub key: ResourceKey,
    pub version_info: VersionInfo,
    pub content_location: ContentLocation,
    pub metadata: serde_json::Value,
}

/// Bump a human-readable `major.minor.patch` version string by
/// incrementing the patch component. Non-semver strings are treated as
/// `patch`-only and incremented as integers; anything unparseable starts
/// a fresh chain at `1.0.0`.
pub fn bump_version(previous: &str) -> String {
    let parts: Vec<&str> = previous.split('.').collect();
    match parts.as_slice() {
        [major, minor, patch] => {
            if let Ok(p) = patch.parse::<u64>() {
                return format!("{major}.{minor}.{}", p + 1);
            }
        }
        [only] => {
            if let Ok(p) = only.parse::<u64>() {
                return (p + 1).to_string();
            }
        }
        _ => {}
    }
    "1.0.0".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_increments_patch() {
        assert_eq!(bump_version("1.0.0"), "1.0.1");
        assert_eq!(bump_version("2.4.9"), "2.4.10");
    }

    #[test]
    fn bump_handles_non_semver_gracefully() {
        assert_eq!(bump_version("weird"), "1.0.0");
    }

    #[test]
    fn chain_key_distinguishes_discriminators() {
        let a = ResourceKey::new(ResourceType::Semantic, "corpus-1");
        let b = ResourceKey::with_discriminator(ResourceType::Semantic, "corpus-1", "minilm");
        assert_ne!(a.chain_key(), b.chain_key());
    }
}
