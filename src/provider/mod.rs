//! Provider connector seam (spec §6 "Provider connector interface"): the
//! core doesn't care how a dictionary entry was fetched, only that it can
//! ask `fetch(word) -> DictionaryEntry?` and persist what comes back.
//!
//! Grounded on the teacher's `async-trait` provider-style seams (mirrored
//! from [`crate::embedding::Embedder`]); concrete connectors (scraper, API,
//! bulk import) are supplied by a binary built on this crate.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Result;
use crate::version::{ResourceKey, ResourceType, SaveConfig, VersionStore};

/// An opaque fetched entry; the concrete dictionary schema is outside
/// this crate's scope (spec §1 Non-goals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub word: String,
    pub provider_name: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn provider_name(&self) -> &str;
    async fn fetch(&self, word: &str) -> Result<Option<DictionaryEntry>>;
}

/// A provider that never has anything, used as a test double and as the
/// default when no real connector is configured.
pub struct NullProvider {
    name: &'static str,
}

impl NullProvider {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Provider for NullProvider {
    fn provider_name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, _word: &str) -> Result<Option<DictionaryEntry>> {
        Ok(None)
    }
}

/// What actually gets persisted per `(provider_name, word)`: either the
/// fetched entry, or a record that the provider was tried and came back
/// empty/failed, so a subsequent lookup doesn't immediately re-fetch
/// (spec §7 "Provider").
#[derive(Debug, Clone, Serialize, Deserialize)]
enum FetchRecord {
    Found(DictionaryEntry),
    Failed { message: String },
}

/// Caches provider fetches by `(provider_name, word)` through the version
/// store (spec §6 "it caches by `(provider_name, word)` and persists
/// successful fetches via the version store").
pub struct ProviderCache {
    store: Arc<VersionStore>,
}

impl ProviderCache {
    pub fn new(store: Arc<VersionStore>) -> Self {
        Self { store }
    }

    fn key(provider_name: &str, word: &str) -> ResourceKey {
        ResourceKey::with_discriminator(ResourceType::Dictionary, word, provider_name)
    }

    /// Fetch `word` from `provider`, consulting and updating the persisted
    /// record. `force_refetch` bypasses a prior `Failed` record (the
    /// caller's retry policy, spec §7: "persistent failures are recorded...
    /// with TTL short enough to retry later" — here expressed as an
    /// explicit retry flag rather than a wall-clock TTL, since the version
    /// store has no time-based expiry of its own).
    pub async fn fetch(&self, provider: &dyn Provider, word: &str, force_refetch: bool) -> Result<Option<DictionaryEntry>> {
        let key = Self::key(provider.provider_name(), word);

        if !force_refetch {
            if let Some(record) = self.store.get_latest(&key).await? {
                let value = self.store.decode_content(&record)?;
                if let Ok(fetch_record) = serde_json::from_value::<FetchRecord>(value) {
                    return Ok(match fetch_record {
                        FetchRecord::Found(entry) => Some(entry),
                        FetchRecord::Failed { .. } => None,
                    });
                }
            }
        }

        match provider.fetch(word).await {
            Ok(Some(entry)) => {
                let content = serde_json::to_value(FetchRecord::Found(entry.clone()))?;
                self.store.save(key, content, SaveConfig::default(), json!({}), vec![]).await?;
                Ok(Some(entry))
            }
            Ok(None) => {
                let content = serde_json::to_value(FetchRecord::Failed {
                    message: "provider returned no entry".to_string(),
                })?;
                self.store.save(key, content, SaveConfig::default(), json!({}), vec![]).await?;
                Ok(None)
            }
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => {
                let content = serde_json::to_value(FetchRecord::Failed { message: e.to_string() })?;
                self.store.save(key, content, SaveConfig::default(), json!({}), vec![]).await?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::Config;
    use crate::registry::{ModelRegistry, ResourceSchema};
    use crate::storage::memory::MemoryBlobStore;
    use crate::storage::BlobStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        entry: Option<DictionaryEntry>,
    }

    #[async_trait]
    impl Provider for CountingProvider {
        fn provider_name(&self) -> &str {
            "counting"
        }

        async fn fetch(&self, word: &str) -> Result<Option<DictionaryEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.entry.clone().map(|mut e| {
                e.word = word.to_string();
                e
            }))
        }
    }

    fn make_cache() -> ProviderCache {
        let registry = Arc::new(ModelRegistry::new());
        registry.register_schema(ResourceType::Dictionary, ResourceSchema::new("dictionary")).unwrap();
        let blob_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let cache = Arc::new(Cache::new(Config::default(), blob_store.clone()));
        let store = Arc::new(VersionStore::new(Config::default(), cache, blob_store, registry));
        ProviderCache::new(store)
    }

    #[tokio::test]
    async fn repeat_fetch_does_not_call_the_provider_again() {
        let cache = make_cache();
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            entry: Some(DictionaryEntry {
                word: String::new(),
                provider_name: "counting".into(),
                payload: json!({"definition": "a fruit"}),
            }),
        };

        let first = cache.fetch(&provider, "apple", false).await.unwrap();
        assert!(first.is_some());
        let second = cache.fetch(&provider, "apple", false).await.unwrap();
        assert!(second.is_some());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refetch_calls_the_provider_again() {
        let cache = make_cache();
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            entry: Some(DictionaryEntry {
                word: String::new(),
                provider_name: "counting".into(),
                payload: json!({"definition": "a fruit"}),
            }),
        };

        cache.fetch(&provider, "apple", false).await.unwrap();
        cache.fetch(&provider, "apple", true).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn null_provider_always_misses() {
        let cache = make_cache();
        let provider = NullProvider::new("null");
        let result = cache.fetch(&provider, "apple", false).await.unwrap();
        assert!(result.is_none());
    }
}
