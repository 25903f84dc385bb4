//! In-memory [`BlobStore`], used by tests and by callers that don't need
//! durability (mirrors the teacher's `MemoryStorage`).

use std::collections::HashMap;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::codec::CompressionCodec;
use crate::error::Result;
use crate::storage::{BlobLocation, BlobStore, ExpiryPredicate};

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    data: RwLock<HashMap<(String, String), (Vec<u8>, SystemTime)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, namespace: &str, key: &str, bytes: &[u8], encrypted: bool) -> Result<BlobLocation> {
        self.data.write().insert(
            (namespace.to_string(), key.to_string()),
            (bytes.to_vec(), SystemTime::now()),
        );
        Ok(BlobLocation {
            namespace: namespace.to_string(),
            key: key.to_string(),
            size_original: bytes.len() as u64,
            size_compressed: bytes.len() as u64,
            compression_codec: CompressionCodec::None,
            encrypted,
        })
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .data
            .read()
            .get(&(namespace.to_string(), key.to_string()))
            .map(|(bytes, _)| bytes.clone()))
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.data.write().remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.data.read().contains_key(&(namespace.to_string(), key.to_string())))
    }

    fn cleanup_expired(&self, namespace: &str, predicate: &ExpiryPredicate<'_>) -> Result<usize> {
        let mut data = self.data.write();
        let to_remove: Vec<(String, String)> = data
            .iter()
            .filter(|((ns, key), (_, modified))| ns == namespace && predicate(ns, key, *modified))
            .map(|(k, _)| k.clone())
            .collect();
        let removed = to_remove.len();
        for k in to_remove {
            data.remove(&k);
        }
        Ok(removed)
    }
}
