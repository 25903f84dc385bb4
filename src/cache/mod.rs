//! Two-tier cache (spec §4.3): a bounded, TTL'd L1 in front of the L2
//! external blob store. One [`Cache`] instance is shared across namespaces;
//! each namespace gets its own L1 critical section (spec §5 "one critical
//! section per namespace").
//!
//! Grounded on the teacher's choice of `parking_lot` for in-process
//! locking and `lru` for bounded maps (the same crate the teacher's later
//! `laurus` iteration depends on).

mod l1;

pub use l1::CacheStats;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;

use crate::codec::{self, CompressionCodec};
use crate::config::Config;
use crate::error::Result;
use crate::storage::BlobStore;
use l1::L1Cache;

/// Closed enum of logical caches (spec §3 `CacheNamespace`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheNamespace {
    Dictionary,
    Corpus,
    Search,
    Trie,
    Semantic,
    Literature,
}

impl CacheNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dictionary => "dictionary",
            Self::Corpus => "corpus",
            Self::Search => "search",
            Self::Trie => "trie",
            Self::Semantic => "semantic",
            Self::Literature => "literature",
        }
    }
}

/// A value stored alongside an L2 TTL, as the wire-encoded form.
#[derive(serde::Serialize, serde::Deserialize)]
struct L2Envelope {
    value: Value,
    stored_at_epoch_secs: u64,
    ttl_secs: u64,
}

impl L2Envelope {
    fn is_expired(&self, now_epoch_secs: u64) -> bool {
        now_epoch_secs.saturating_sub(self.stored_at_epoch_secs) >= self.ttl_secs
    }
}

pub struct Cache {
    config: Config,
    blob_store: Arc<dyn BlobStore>,
    l1_by_namespace: DashMap<CacheNamespace, Arc<L1Cache>>,
}

impl Cache {
    pub fn new(config: Config, blob_store: Arc<dyn BlobStore>) -> Self {
        Self {
            config,
            blob_store,
            l1_by_namespace: DashMap::new(),
        }
    }

    fn l1(&self, ns: CacheNamespace) -> Arc<L1Cache> {
        self.l1_by_namespace
            .entry(ns)
            .or_insert_with(|| Arc::new(L1Cache::new(self.config.l1_max_size(ns))))
            .clone()
    }

    /// `get(ns, key)`: L1 on hit, else L2 decode-and-promote, else `None`.
    pub fn get(&self, ns: CacheNamespace, key: &str) -> Result<Option<Value>> {
        let l1 = self.l1(ns);
        if let Some(value) = l1.get(key) {
            return Ok(Some(value));
        }

        let blob_key = l2_key(ns, key);
        let Some(bytes) = self.blob_store.get(ns.as_str(), &blob_key)? else {
            return Ok(None);
        };

        let envelope: L2Envelope = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(_) => {
                // Corrupt L2 entry: evict and report a clean miss rather than
                // propagating — spec §7 says decode corruption here is
                // surfaced via eviction + cleanup, not panics.
                let _ = self.blob_store.delete(ns.as_str(), &blob_key);
                return Ok(None);
            }
        };

        let now = now_epoch_secs();
        if envelope.is_expired(now) {
            let _ = self.blob_store.delete(ns.as_str(), &blob_key);
            return Ok(None);
        }

        let remaining = Duration::from_secs(envelope.ttl_secs.saturating_sub(now.saturating_sub(envelope.stored_at_epoch_secs)));
        l1.set(key.to_string(), envelope.value.clone(), remaining);
        Ok(Some(envelope.value))
    }

    /// `set(ns, key, value, ttl)`: writes both tiers.
    pub fn set(&self, ns: CacheNamespace, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let l1 = self.l1(ns);
        l1.set(key.to_string(), value.clone(), ttl);

        let envelope = L2Envelope {
            value,
            stored_at_epoch_secs: now_epoch_secs(),
            ttl_secs: ttl.as_secs(),
        };
        let bytes = serde_json::to_vec(&envelope)?;
        self.blob_store.put(ns.as_str(), &l2_key(ns, key), &bytes, false)?;
        Ok(())
    }

    /// `delete(ns, key)`: removes from both tiers.
    pub fn delete(&self, ns: CacheNamespace, key: &str) -> Result<()> {
        self.l1(ns).delete(key);
        self.blob_store.delete(ns.as_str(), &l2_key(ns, key))?;
        Ok(())
    }

    pub fn stats(&self, ns: CacheNamespace) -> CacheStats {
        self.l1(ns).stats()
    }

    pub fn l1_len(&self, ns: CacheNamespace) -> usize {
        self.l1(ns).len()
    }

    /// Codec-encode `value` before handing it to `set`, matching spec §4.3
    /// ("Values are codec-encoded as in §4.1"). Exposed separately from
    /// `set` because most in-process callers want the decoded `Value` in
    /// L1, not raw bytes — only L2 needs the compressed encoding, which
    /// `set`/`get` already apply transparently via JSON; this helper is for
    /// callers (e.g. the version store) that want the content hash too.
    pub fn encode_for_storage(&self, value: &Value) -> Result<(Vec<u8>, String, CompressionCodec)> {
        codec::encode(
            value,
            &[],
            self.config.compression_threshold_bytes,
            self.config.compression_level,
        )
    }
}

fn l2_key(ns: CacheNamespace, key: &str) -> String {
    format!("{}__{}", ns.as_str(), key)
}

fn now_epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBlobStore;
    use serde_json::json;

    fn make_cache() -> Cache {
        Cache::new(Config::default(), Arc::new(MemoryBlobStore::new()))
    }

    #[test]
    fn miss_then_set_then_hit() {
        let cache = make_cache();
        assert_eq!(cache.get(CacheNamespace::Corpus, "k1").unwrap(), None);

        cache
            .set(CacheNamespace::Corpus, "k1", json!({"v": 1}), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get(CacheNamespace::Corpus, "k1").unwrap(), Some(json!({"v": 1})));

        let stats = cache.stats(CacheNamespace::Corpus);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
    }

    #[test]
    fn delete_removes_from_both_tiers() {
        let cache = make_cache();
        cache
            .set(CacheNamespace::Trie, "k1", json!(1), Duration::from_secs(60))
            .unwrap();
        cache.delete(CacheNamespace::Trie, "k1").unwrap();
        assert_eq!(cache.get(CacheNamespace::Trie, "k1").unwrap(), None);
    }

    #[test]
    fn l2_hit_promotes_into_l1() {
        let cache = make_cache();
        cache
            .set(CacheNamespace::Search, "k1", json!("v"), Duration::from_secs(60))
            .unwrap();
        // Evict from L1 directly, leaving only L2.
        cache.l1(CacheNamespace::Search).delete("k1");
        assert_eq!(cache.l1_len(CacheNamespace::Search), 0);

        assert_eq!(cache.get(CacheNamespace::Search, "k1").unwrap(), Some(json!("v")));
        assert_eq!(cache.l1_len(CacheNamespace::Search), 1);
    }

    #[test]
    fn namespaces_are_independent() {
        let cache = make_cache();
        cache
            .set(CacheNamespace::Corpus, "k", json!(1), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get(CacheNamespace::Semantic, "k").unwrap(), None);
    }

    #[test]
    fn l1_respects_max_size() {
        let mut config = Config::default();
        config.l1_max_size_per_namespace = 2;
        let cache = Cache::new(config, Arc::new(MemoryBlobStore::new()));

        for i in 0..5 {
            cache
                .set(CacheNamespace::Dictionary, &format!("k{i}"), json!(i), Duration::from_secs(60))
                .unwrap();
        }
        assert!(cache.l1_len(CacheNamespace::Dictionary) <= 2);
    }
}
