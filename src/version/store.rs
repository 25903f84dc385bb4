//! Version store (spec §4.5): the core persistence component. An
//! append-only metadata chain per resource, with inline/external content
//! split, a per-resource lock serializing writes to a chain, and a
//! two-tier cache in front of reads.
//!
//! Grounded on the teacher's `store::log::DocumentLog`: monotonic id
//! generation plus durable append-only storage, generalized here from
//! "one WAL for all documents" to "one independently-lockable chain per
//! resource" since, per spec §5, saves to *different* chains must
//! proceed in parallel rather than serialize behind a single writer.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::cache::{Cache, CacheNamespace};
use crate::codec;
use crate::config::Config;
use crate::error::{FloridifyError, Result};
use crate::registry::ModelRegistry;
use crate::storage::BlobStore;

use super::locks::LockTable;
use super::record::{bump_version, ContentLocation, KeyProvider, ResourceKey, ResourceType, VersionInfo, VersionRecord};

/// Options for `save` (spec §4.5): explicit version override, whether to
/// skip the dedup short-circuit, and whether external content should be
/// flagged encrypted (spec §9 "External blob encryption").
#[derive(Debug, Clone, Default)]
pub struct SaveConfig {
    pub force_rebuild: bool,
    pub version: Option<String>,
    pub encrypt: bool,
}

pub struct VersionStore {
    config: Config,
    cache: Arc<Cache>,
    blob_store: Arc<dyn BlobStore>,
    registry: Arc<ModelRegistry>,
    locks: LockTable,
    chains: DashMap<ResourceKey, Arc<RwLock<Vec<VersionRecord>>>>,
    key_provider: Option<Arc<dyn KeyProvider>>,
}

impl VersionStore {
    pub fn new(
        config: Config,
        cache: Arc<Cache>,
        blob_store: Arc<dyn BlobStore>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            config,
            cache,
            blob_store,
            registry,
            locks: LockTable::new(),
            chains: DashMap::new(),
            key_provider: None,
        }
    }

    /// Attach the key provider that gates decode of encrypted external
    /// blobs (spec §9). Additive: stores built without one simply never
    /// accept `encrypt: true` saves being read back.
    pub fn with_key_provider(mut self, key_provider: Arc<dyn KeyProvider>) -> Self {
        self.key_provider = Some(key_provider);
        self
    }

    fn chain(&self, key: &ResourceKey) -> Arc<RwLock<Vec<VersionRecord>>> {
        self.chains.entry(key.clone()).or_insert_with(|| Arc::new(RwLock::new(Vec::new()))).clone()
    }

    fn cache_namespace(resource_type: ResourceType) -> CacheNamespace {
        match resource_type {
            ResourceType::Dictionary | ResourceType::Language => CacheNamespace::Dictionary,
            ResourceType::Corpus => CacheNamespace::Corpus,
            ResourceType::Literature => CacheNamespace::Literature,
            ResourceType::Search => CacheNamespace::Search,
            ResourceType::Trie => CacheNamespace::Trie,
            ResourceType::Semantic => CacheNamespace::Semantic,
        }
    }

    fn latest_in_chain(chain: &[VersionRecord]) -> Option<&VersionRecord> {
        chain.iter().find(|r| r.version_info.is_latest)
    }

    /// Decode a record's payload, resolving external blobs through the
    /// blob store. Fails with `CorruptContent` if decode fails — callers
    /// must not retry (spec §4.1).
    pub fn decode_content(&self, record: &VersionRecord) -> Result<Value> {
        match &record.content_location {
            ContentLocation::Inline { bytes, compression_codec } => {
                codec::decode(bytes, *compression_codec)
            }
            ContentLocation::External {
                namespace,
                key,
                compression_codec,
                encrypted,
                ..
            } => {
                if *encrypted {
                    let has_key = self.key_provider.as_ref().is_some_and(|kp| kp.has_key_for(namespace, key));
                    if !has_key {
                        return Err(FloridifyError::encryption_key_required(format!(
                            "no key available for encrypted blob {namespace}/{key}"
                        )));
                    }
                }
                let bytes = self
                    .blob_store
                    .get(namespace, key)?
                    .ok_or_else(|| FloridifyError::corrupt_content(format!("missing external blob {namespace}/{key}")))?;
                codec::decode(&bytes, *compression_codec)
            }
        }
    }

    /// `save` (spec §4.5 algorithm).
    pub async fn save(
        &self,
        key: ResourceKey,
        content: Value,
        config: SaveConfig,
        metadata: Value,
        dependencies: Vec<Uuid>,
    ) -> Result<VersionRecord> {
        if !self.registry.is_registered(key.resource_type) {
            return Err(FloridifyError::unknown_resource_type(key.resource_type.to_string()));
        }

        let hash = codec::hash_canonical(&content, &[]);

        // Step 2: dedup short-circuit before taking the lock.
        if !config.force_rebuild {
            if let Some(latest) = self.get_latest(&key).await? {
                if latest.version_info.data_hash == hash && self.decode_content(&latest).is_ok() {
                    return Ok(latest);
                }
            }
        }

        // Step 3: the per-resource lock totally orders writes to this chain.
        let _guard = self.locks.lock(&key).await;

        let chain_arc = self.chain(&key);
        let (new_record, previous_id) = {
            let chain = chain_arc.read();
            let latest = Self::latest_in_chain(&chain).cloned();

            // 3a: recheck under the lock.
            if !config.force_rebuild {
                if let Some(l) = &latest {
                    if l.version_info.data_hash == hash && self.decode_content(l).is_ok() {
                        return Ok(l.clone());
                    }
                }
            }

            let version = config
                .version
                .clone()
                .unwrap_or_else(|| latest.as_ref().map(|l| bump_version(&l.version_info.version)).unwrap_or_else(|| "1.0.0".to_string()));

            let (bytes, _hash, codec_used, original_len) = codec::encode(
                &content,
                &[],
                self.config.compression_threshold_bytes,
                self.config.compression_level,
            )?;

            let content_location = if bytes.len() >= self.config.inline_threshold_bytes {
                let namespace = key.resource_type.as_str().to_string();
                let blob_key = format!("{}-{}-{}", key.chain_key(), version, &hash[..16.min(hash.len())]);
                // Blob must be durable before the record referencing it is
                // committed (spec §4.5/§9: no partial writes).
                self.blob_store.put(&namespace, &blob_key, &bytes, config.encrypt)?;
                ContentLocation::External {
                    namespace,
                    key: blob_key,
                    size_original: original_len as u64,
                    size_compressed: bytes.len() as u64,
                    compression_codec: codec_used,
                    encrypted: config.encrypt,
                }
            } else {
                ContentLocation::Inline { bytes, compression_codec: codec_used }
            };

            let new_id = Uuid::new_v4();
            let record = VersionRecord {
                id: new_id,
                key: key.clone(),
                version_info: VersionInfo {
                    version,
                    data_hash: hash,
                    created_at: chrono::Utc::now(),
                    is_latest: true,
                    supersedes: latest.as_ref().map(|l| l.id),
                    superseded_by: None,
                    parent_version: latest.as_ref().map(|l| l.version_info.version.clone()),
                    change_log: String::new(),
                    dependencies,
                },
                content_location,
                metadata,
            };
            (record, latest.map(|l| l.id))
        };

        {
            let mut chain = chain_arc.write();
            if let Some(prev_id) = previous_id {
                if let Some(prev) = chain.iter_mut().find(|r| r.id == prev_id) {
                    prev.version_info.is_latest = false;
                    prev.version_info.superseded_by = Some(new_record.id);
                }
            }
            chain.push(new_record.clone());
        }

        self.invalidate_chain_cache(&key);
        Ok(new_record)
    }

    fn invalidate_chain_cache(&self, key: &ResourceKey) {
        let ns = Self::cache_namespace(key.resource_type);
        let _ = self.cache.delete(ns, &format!("{}:latest", key.chain_key()));
    }

    /// `get_latest` (spec §4.5): two-tier cache in front of the chain.
    pub async fn get_latest(&self, key: &ResourceKey) -> Result<Option<VersionRecord>> {
        let ns = Self::cache_namespace(key.resource_type);
        let cache_key = format!("{}:latest", key.chain_key());

        if let Some(cached) = self.cache.get(ns, &cache_key)? {
            if let Ok(record) = serde_json::from_value::<VersionRecord>(cached) {
                return Ok(Some(record));
            }
        }

        let chain_arc = self.chain(key);
        let latest = {
            let chain = chain_arc.read();
            Self::latest_in_chain(&chain).cloned()
        };

        if let Some(record) = &latest {
            let encoded = serde_json::to_value(record)?;
            self.cache.set(ns, &cache_key, encoded, self.config.l2_ttl(ns))?;
        }
        Ok(latest)
    }

    pub fn get_by_version(&self, key: &ResourceKey, version: &str) -> Option<VersionRecord> {
        let chain_arc = self.chain(key);
        let chain = chain_arc.read();
        chain.iter().find(|r| r.version_info.version == version).cloned()
    }

    pub fn get_by_hash(&self, key: &ResourceKey, data_hash: &str) -> Option<VersionRecord> {
        let chain_arc = self.chain(key);
        let chain = chain_arc.read();
        chain.iter().find(|r| r.version_info.data_hash == data_hash).cloned()
    }

    /// Ordered sequence of version strings, oldest first.
    pub fn list_versions(&self, key: &ResourceKey) -> Vec<String> {
        let chain_arc = self.chain(key);
        let chain = chain_arc.read();
        chain.iter().map(|r| r.version_info.version.clone()).collect()
    }

    /// `delete_version` (spec §4.5): removes one record, patches neighbors,
    /// deletes its external blob if any.
    pub async fn delete_version(&self, key: &ResourceKey, version: &str) -> Result<bool> {
        let _guard = self.locks.lock(key).await;
        let chain_arc = self.chain(key);

        let removed = {
            let mut chain = chain_arc.write();
            let Some(idx) = chain.iter().position(|r| r.version_info.version == version) else {
                return Ok(false);
            };
            let record = chain.remove(idx);

            let supersedes = record.version_info.supersedes;
            let superseded_by = record.version_info.superseded_by;

            if let Some(pred_id) = supersedes {
                if let Some(pred) = chain.iter_mut().find(|r| r.id == pred_id) {
                    pred.version_info.superseded_by = superseded_by;
                    if record.version_info.is_latest {
                        pred.version_info.is_latest = true;
                    }
                }
            }
            if let Some(succ_id) = superseded_by {
                if let Some(succ) = chain.iter_mut().find(|r| r.id == succ_id) {
                    succ.version_info.supersedes = supersedes;
                }
            }

            record
        };

        if let ContentLocation::External { namespace, key: blob_key, .. } = &removed.content_location {
            self.blob_store.delete(namespace, blob_key)?;
        }

        self.invalidate_chain_cache(key);
        Ok(true)
    }

    /// Delete every version in a chain, including external blobs. Used by
    /// cascade delete (spec §4.5/§4.6, P7).
    pub async fn delete_chain(&self, key: &ResourceKey) -> Result<usize> {
        let _guard = self.locks.lock(key).await;
        let chain_arc = self.chain(key);
        let removed: Vec<VersionRecord> = {
            let mut chain = chain_arc.write();
            std::mem::take(&mut *chain)
        };
        for record in &removed {
            if let ContentLocation::External { namespace, key: blob_key, .. } = &record.content_location {
                self.blob_store.delete(namespace, blob_key)?;
            }
        }
        self.invalidate_chain_cache(key);
        Ok(removed.len())
    }

    /// Cascade delete: removes `key`'s chain, then recursively removes
    /// every chain the model registry's `dependents_of` reports for it
    /// (spec §4.5 "Cascade").
    pub async fn delete_cascade(&self, key: &ResourceKey) -> Result<usize> {
        let dependents = self.registry.dependents_of(key.resource_type, &key.resource_id);
        let mut total = self.delete_chain(key).await?;
        for dep in dependents {
            total += Box::pin(self.delete_cascade(&dep)).await?;
        }
        Ok(total)
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBlobStore;
    use serde_json::json;

    fn make_store() -> VersionStore {
        let registry = Arc::new(ModelRegistry::new());
        for rt in [
            ResourceType::Dictionary,
            ResourceType::Corpus,
            ResourceType::Trie,
            ResourceType::Semantic,
            ResourceType::Search,
        ] {
            registry
                .register_schema(rt, crate::registry::ResourceSchema::new("test"))
                .unwrap();
        }
        let blob_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let cache = Arc::new(Cache::new(Config::default(), blob_store.clone()));
        VersionStore::new(Config::default(), cache, blob_store, registry)
    }

    #[tokio::test]
    async fn dedup_on_identical_save_returns_same_record() {
        let store = make_store();
        let key = ResourceKey::new(ResourceType::Dictionary, "foo");

        let r1 = store
            .save(key.clone(), json!({"x": 1}), SaveConfig::default(), json!({}), vec![])
            .await
            .unwrap();
        let r2 = store
            .save(key.clone(), json!({"x": 1}), SaveConfig::default(), json!({}), vec![])
            .await
            .unwrap();

        assert_eq!(r1.id, r2.id);
        assert_eq!(store.list_versions(&key).len(), 1);
        assert!(r2.version_info.is_latest);
    }

    #[tokio::test]
    async fn save_unknown_resource_type_fails() {
        let registry = Arc::new(ModelRegistry::new());
        let blob_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let cache = Arc::new(Cache::new(Config::default(), blob_store.clone()));
        let store = VersionStore::new(Config::default(), cache, blob_store, registry);

        let key = ResourceKey::new(ResourceType::Dictionary, "foo");
        let err = store
            .save(key, json!({"x": 1}), SaveConfig::default(), json!({}), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, FloridifyError::UnknownResourceType(_)));
    }

    #[tokio::test]
    async fn concurrent_saves_to_same_chain_are_serialized() {
        let store = Arc::new(make_store());
        let key = ResourceKey::new(ResourceType::Dictionary, "bar");

        let mut handles = Vec::new();
        for i in 0..5 {
            let store = store.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store
                    .save(key, json!({"i": i}), SaveConfig::default(), json!({}), vec![])
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let versions = store.list_versions(&key);
        assert_eq!(versions.len(), 5);

        // Exactly one is_latest.
        let chain_arc = store.chain(&key);
        let chain = chain_arc.read();
        assert_eq!(chain.iter().filter(|r| r.version_info.is_latest).count(), 1);

        // supersedes links form a single chain back to the root.
        let latest = chain.iter().find(|r| r.version_info.is_latest).unwrap();
        let mut steps = 0;
        let mut cursor = Some(latest.id);
        while let Some(id) = cursor {
            let rec = chain.iter().find(|r| r.id == id).unwrap();
            cursor = rec.version_info.supersedes;
            steps += 1;
        }
        assert_eq!(steps, 5);
    }

    #[tokio::test]
    async fn get_latest_round_trips_through_cache() {
        let store = make_store();
        let key = ResourceKey::new(ResourceType::Corpus, "c1");
        store
            .save(key.clone(), json!({"vocab": ["a", "b"]}), SaveConfig::default(), json!({}), vec![])
            .await
            .unwrap();

        let latest = store.get_latest(&key).await.unwrap().unwrap();
        let content = store.decode_content(&latest).unwrap();
        assert_eq!(content, json!({"vocab": ["a", "b"]}));
    }

    #[tokio::test]
    async fn delete_version_promotes_predecessor() {
        let store = make_store();
        let key = ResourceKey::new(ResourceType::Dictionary, "chain");
        store.save(key.clone(), json!(1), SaveConfig::default(), json!({}), vec![]).await.unwrap();
        store.save(key.clone(), json!(2), SaveConfig::default(), json!({}), vec![]).await.unwrap();

        let versions = store.list_versions(&key);
        let latest_version = versions.last().unwrap().clone();

        let deleted = store.delete_version(&key, &latest_version).await.unwrap();
        assert!(deleted);

        let latest = store.get_latest(&key).await.unwrap().unwrap();
        assert_eq!(latest.version_info.version, versions[0]);
        assert!(latest.version_info.is_latest);
    }

    #[tokio::test]
    async fn large_payload_is_stored_externally() {
        let store = make_store();
        let key = ResourceKey::new(ResourceType::Semantic, "big");
        let big_text = "x".repeat(100_000);
        let record = store
            .save(key, json!({"blob": big_text}), SaveConfig::default(), json!({}), vec![])
            .await
            .unwrap();
        assert!(matches!(record.content_location, ContentLocation::External { .. }));
    }

    #[tokio::test]
    async fn small_payload_is_stored_inline() {
        let store = make_store();
        let key = ResourceKey::new(ResourceType::Dictionary, "small");
        let record = store
            .save(key, json!({"word": "apple"}), SaveConfig::default(), json!({}), vec![])
            .await
            .unwrap();
        assert!(matches!(record.content_location, ContentLocation::Inline { .. }));
    }

    struct TestKeyProvider {
        known_namespace: String,
    }

    impl crate::version::record::KeyProvider for TestKeyProvider {
        fn has_key_for(&self, namespace: &str, _key: &str) -> bool {
            self.known_namespace == namespace
        }
    }

    #[tokio::test]
    async fn encrypted_external_content_requires_a_key_provider() {
        let store = make_store();
        let key = ResourceKey::new(ResourceType::Semantic, "secret");
        let big_text = "x".repeat(100_000);
        let record = store
            .save(key, json!({"blob": big_text}), SaveConfig { encrypt: true, ..Default::default() }, json!({}), vec![])
            .await
            .unwrap();

        let err = store.decode_content(&record).unwrap_err();
        assert!(matches!(err, FloridifyError::EncryptionKeyRequired(_)));
    }

    #[tokio::test]
    async fn encrypted_external_content_decodes_once_a_key_provider_knows_it() {
        let registry = Arc::new(ModelRegistry::new());
        registry.register_schema(ResourceType::Semantic, crate::registry::ResourceSchema::new("test")).unwrap();
        let blob_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let cache = Arc::new(Cache::new(Config::default(), blob_store.clone()));

        let store = VersionStore::new(Config::default(), cache, blob_store, registry)
            .with_key_provider(Arc::new(TestKeyProvider { known_namespace: ResourceType::Semantic.as_str().to_string() }));

        let key = ResourceKey::new(ResourceType::Semantic, "secret");
        let big_text = "x".repeat(100_000);
        let record = store
            .save(key, json!({"blob": big_text.clone()}), SaveConfig { encrypt: true, ..Default::default() }, json!({}), vec![])
            .await
            .unwrap();

        let content = store.decode_content(&record).unwrap();
        assert_eq!(content, json!({"blob": big_text}));
    }

    #[tokio::test]
    async fn cascade_delete_removes_dependent_chains() {
        let store = make_store();
        let corpus_key = ResourceKey::new(ResourceType::Corpus, "c1");
        let trie_key = ResourceKey::new(ResourceType::Trie, "c1");

        store.save(corpus_key.clone(), json!({"vocab": []}), SaveConfig::default(), json!({}), vec![]).await.unwrap();
        store.save(trie_key.clone(), json!({"sorted": []}), SaveConfig::default(), json!({}), vec![]).await.unwrap();

        store.registry.register_dependents(ResourceType::Corpus, |id| {
            vec![ResourceKey::new(ResourceType::Trie, id.to_string())]
        });

        let removed = store.delete_cascade(&corpus_key).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get_latest(&corpus_key).await.unwrap().is_none());
        assert!(store.get_latest(&trie_key).await.unwrap().is_none());
    }
}
