//! External blob store (spec §4.2): a byte-addressable store keyed by
//! `(namespace, key)`, concrete implementations filesystem- and
//! memory-backed.
//!
//! Grounded on the teacher's `Storage`/`StorageFactory` seam (inferred
//! from call sites in `lexical/store.rs` and `vector/engine.rs`:
//! `StorageConfig::{Memory, File}`, `MemoryStorage`, `FileStorage`), kept
//! as an object-safe trait so the version store and cache can be
//! constructed over either backend interchangeably.

pub mod file;
pub mod memory;

use crate::codec::CompressionCodec;
use crate::error::Result;

/// Where a piece of external content physically lives, returned by `put`
/// and embedded in a `ContentLocation` (spec §3) by callers that also
/// track inline-vs-external decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobLocation {
    pub namespace: String,
    pub key: String,
    pub size_original: u64,
    pub size_compressed: u64,
    pub compression_codec: CompressionCodec,
    pub encrypted: bool,
}

/// A predicate used by `cleanup_expired` to decide whether a stored blob
/// (identified by namespace/key and its age) should be removed.
pub type ExpiryPredicate<'a> = dyn Fn(&str, &str, std::time::SystemTime) -> bool + Send + Sync + 'a;

pub trait BlobStore: std::fmt::Debug + Send + Sync {
    /// Durably write `bytes` under `(namespace, key)`. Atomic: callers never
    /// observe a partially-written blob (write-to-temp + rename). `encrypted`
    /// is recorded on the returned [`BlobLocation`] so the version layer can
    /// gate decode behind a key provider (spec §9 "External blob
    /// encryption"); this store does not itself transform `bytes`.
    fn put(&self, namespace: &str, key: &str, bytes: &[u8], encrypted: bool) -> Result<BlobLocation>;

    /// Read the bytes stored under `(namespace, key)`, or `None` if absent.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove the blob at `(namespace, key)`, if any. Idempotent.
    fn delete(&self, namespace: &str, key: &str) -> Result<()>;

    /// Does a blob exist at `(namespace, key)`?
    fn exists(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Remove every blob in `namespace` for which `predicate` returns true.
    /// Returns the number of blobs removed.
    fn cleanup_expired(&self, namespace: &str, predicate: &ExpiryPredicate<'_>) -> Result<usize>;
}

/// Construction-time choice of backend, mirroring the teacher's
/// `StorageConfig` enum.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Memory,
    File { root_dir: std::path::PathBuf },
}

pub struct StorageFactory;

impl StorageFactory {
    pub fn build(config: &StorageConfig) -> Result<std::sync::Arc<dyn BlobStore>> {
        match config {
            StorageConfig::Memory => Ok(std::sync::Arc::new(memory::MemoryBlobStore::new())),
            StorageConfig::File { root_dir } => {
                Ok(std::sync::Arc::new(file::FileBlobStore::new(root_dir)?))
            }
        }
    }
}

/// Directory-shard prefix: first two hex chars of the key, per spec §6
/// ("Path: `<root>/<namespace>/<first2hex>/<key>`").
pub(crate) fn shard_prefix(key: &str) -> &str {
    let end = key.char_indices().nth(2).map(|(i, _)| i).unwrap_or(key.len());
    &key[..end]
}
