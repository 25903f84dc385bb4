//! Search facade (spec §3 `SearchIndex`, §4.10): resolves the indices for
//! a corpus and cascades exact → prefix → fuzzy → semantic lookups,
//! merging and sorting the results.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::corpus::{Corpus, CorpusTree};
use crate::dedup::DedupGate;
use crate::error::{FloridifyError, Result};
use crate::registry::ModelRegistry;
use crate::version::{ResourceKey, ResourceType, SaveConfig, VersionStore};

use super::semantic::{Embedder, SemanticIndex, SemanticStore};
use super::trie::{TrieIndex, TrieStore};
use super::{fuzzy, merge_results, sort_results, SearchResult};

/// Which tiers to run for a query (spec §4.10 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodHint {
    Exact,
    Prefix,
    Fuzzy,
    Semantic,
    Auto,
    Hybrid,
}

/// A corpus's search configuration and a pointer to its built indices
/// (spec §3 `SearchIndex`). Persisted so that `has_semantic`/`semantic_model`
/// survive a restart without re-probing the embedder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndex {
    pub corpus_id: String,
    pub vocabulary_hash: String,
    pub has_trie: bool,
    pub has_fuzzy: bool,
    pub has_semantic: bool,
    pub semantic_model: Option<String>,
    pub min_score: f32,
    pub vocabulary_size: usize,
}

/// Score at or above which a result is "strong" enough to short-circuit
/// the cascade (spec §4.10 step 2 "stop as soon as... strong results").
const DEFAULT_STRONG_THRESHOLD: f32 = 0.8;
const DEFAULT_MIN_SCORE: f32 = 0.3;

pub struct SearchFacade {
    store: Arc<VersionStore>,
    corpus_tree: Arc<CorpusTree>,
    trie_store: TrieStore,
    semantic_store: SemanticStore,
    dedup_gate: Arc<DedupGate>,
    embedder: Option<Arc<dyn Embedder>>,
    strong_threshold: f32,
}

impl SearchFacade {
    pub fn new(
        store: Arc<VersionStore>,
        corpus_tree: Arc<CorpusTree>,
        dedup_gate: Arc<DedupGate>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            trie_store: TrieStore::new(store.clone()),
            semantic_store: SemanticStore::new(store.clone()),
            store,
            corpus_tree,
            dedup_gate,
            embedder,
            strong_threshold: DEFAULT_STRONG_THRESHOLD,
        }
    }

    pub fn with_strong_threshold(mut self, threshold: f32) -> Self {
        self.strong_threshold = threshold;
        self
    }

    fn key(corpus_id: &str) -> ResourceKey {
        ResourceKey::new(ResourceType::Search, corpus_id)
    }

    /// Build-or-load the `SearchIndex` for a corpus, single-flighted per
    /// corpus id so concurrent first callers don't both rebuild (spec §4.4,
    /// §4.10 step 1).
    async fn resolve_index(&self, corpus_id: &str, vocabulary_hash: &str, vocabulary_size: usize) -> Result<SearchIndex> {
        if let Some(record) = self.store.get_latest(&Self::key(corpus_id)).await? {
            let value = self.store.decode_content(&record)?;
            if let Ok(index) = serde_json::from_value::<SearchIndex>(value) {
                if index.vocabulary_hash == vocabulary_hash {
                    return Ok(index);
                }
            }
        }

        let call_key = format!("search-index:{corpus_id}");
        let embedder = self.embedder.clone();
        let store = self.store.clone();
        let corpus_id_owned = corpus_id.to_string();
        let vocabulary_hash_owned = vocabulary_hash.to_string();

        let value = self
            .dedup_gate
            .call(&call_key, move || async move {
                let index = SearchIndex {
                    corpus_id: corpus_id_owned.clone(),
                    vocabulary_hash: vocabulary_hash_owned,
                    has_trie: true,
                    has_fuzzy: true,
                    has_semantic: embedder.is_some(),
                    semantic_model: embedder.map(|e| e.model_name().to_string()),
                    min_score: DEFAULT_MIN_SCORE,
                    vocabulary_size,
                };
                let content = serde_json::to_value(&index)?;
                store
                    .save(
                        ResourceKey::new(ResourceType::Search, corpus_id_owned.clone()),
                        content,
                        SaveConfig::default(),
                        json!({}),
                        vec![],
                    )
                    .await?;
                Ok(serde_json::to_value(&index)?)
            })
            .await?;

        serde_json::from_value(value).map_err(FloridifyError::from)
    }

    /// `search(query, corpus_id, method_hint, max_results, min_score)`
    /// (spec §4.10): cascade per `method_hint`, merge, sort, clip.
    pub async fn search(
        &self,
        query: &str,
        corpus_id: &str,
        method_hint: MethodHint,
        max_results: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let corpus = self
            .corpus_tree
            .get_corpus(corpus_id)
            .await?
            .ok_or_else(|| FloridifyError::not_found(format!("corpus {corpus_id}")))?;

        let _index = self
            .resolve_index(corpus_id, &corpus.vocabulary_hash, corpus.vocabulary.len())
            .await?;

        let mut pool: Vec<SearchResult> = Vec::new();

        let strong_enough = |pool: &[SearchResult]| -> bool {
            pool.iter().filter(|r| r.score >= self.strong_threshold).count() >= max_results
        };

        match method_hint {
            MethodHint::Exact => {
                if let Some(trie) = self.load_trie(&corpus).await {
                    pool = trie.search_exact(query);
                }
            }
            MethodHint::Prefix => {
                if let Some(trie) = self.load_trie(&corpus).await {
                    pool = trie.search_prefix(query, max_results);
                }
            }
            MethodHint::Fuzzy => {
                pool = fuzzy::search(&corpus, query, max_results, min_score);
            }
            MethodHint::Semantic => {
                if let Some(embedder) = &self.embedder {
                    if let Some(index) = self.load_semantic(&corpus, embedder.as_ref()).await {
                        pool = index.search(embedder.as_ref(), query, max_results, min_score).await?;
                    }
                }
            }
            MethodHint::Auto | MethodHint::Hybrid => {
                if let Some(trie) = self.load_trie(&corpus).await {
                    merge_results(&mut pool, trie.search_exact(query));

                    if pool.len() < max_results && !strong_enough(&pool) {
                        merge_results(&mut pool, trie.search_prefix(query, max_results));
                    }
                }

                if pool.len() < max_results && !strong_enough(&pool) {
                    merge_results(&mut pool, fuzzy::search(&corpus, query, max_results, min_score));
                }

                if pool.len() < max_results && !strong_enough(&pool) {
                    if let Some(embedder) = &self.embedder {
                        if let Some(index) = self.load_semantic(&corpus, embedder.as_ref()).await {
                            let semantic_results = index.search(embedder.as_ref(), query, max_results, min_score).await?;
                            merge_results(&mut pool, semantic_results);
                        }
                    }
                }
            }
        }

        sort_results(&mut pool);
        pool.retain(|r| r.score >= min_score);
        pool.truncate(max_results);
        Ok(pool)
    }

    /// Build-or-load the trie tier, logging and skipping on failure rather
    /// than aborting the whole cascade (spec §7 "any tier failure... is
    /// logged and skipped; the cascade continues").
    async fn load_trie(&self, corpus: &Corpus) -> Option<TrieIndex> {
        match self.trie_store.build_or_load(corpus).await {
            Ok(trie) => Some(trie),
            Err(err) => {
                tracing::warn!(corpus_id = %corpus.corpus_id, error = %err, "trie tier failed; skipping");
                None
            }
        }
    }

    async fn load_semantic(&self, corpus: &Corpus, embedder: &dyn Embedder) -> Option<SemanticIndex> {
        match self.semantic_store.build_or_load(corpus, embedder).await {
            Ok(index) => Some(index),
            Err(err) => {
                tracing::warn!(corpus_id = %corpus.corpus_id, error = %err, "semantic tier failed; skipping");
                None
            }
        }
    }

    pub fn registry_cascade_hook() -> fn(&ModelRegistry) {
        crate::corpus::register_cascade_dependents
    }
}
