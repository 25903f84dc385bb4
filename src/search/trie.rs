//! Trie index (spec §3 `TrieIndex`, §4.7): sorted-vocabulary binary
//! search standing in for an in-memory prefix structure. Persistence is
//! the sorted list plus metadata; the structure itself is reconstructed
//! deterministically on load, so nothing index-shaped needs to survive a
//! restart beyond this record.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::corpus::Corpus;
use crate::error::Result;
use crate::text;
use crate::version::{ResourceKey, ResourceType, SaveConfig, VersionStore};

use super::{SearchMethod, SearchResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrieIndex {
    pub corpus_id: String,
    pub vocabulary_hash: String,
    pub trie_data: Vec<String>,
    pub word_frequencies: Option<HashMap<String, u64>>,
    pub normalized_to_original: HashMap<String, String>,
    pub max_frequency: u64,
    pub word_count: usize,
    pub build_time_seconds: f64,
}

impl TrieIndex {
    /// Build from a corpus's normalized vocabulary (spec §4.7 "Build").
    pub fn build(corpus: &Corpus) -> Self {
        let start = std::time::Instant::now();

        let mut normalized_to_original = HashMap::new();
        let mut trie_data: Vec<String> = Vec::with_capacity(corpus.vocabulary.len());
        let mut word_frequencies: HashMap<String, u64> = HashMap::new();

        for (i, term) in corpus.vocabulary.iter().enumerate() {
            let normalized = text::normalize(term);
            let original = corpus.original_vocabulary.get(i).cloned().unwrap_or_else(|| term.clone());
            normalized_to_original.entry(normalized.clone()).or_insert(original);
            if let Some(freq) = corpus.word_frequencies.as_ref().and_then(|m| m.get(term)) {
                *word_frequencies.entry(normalized.clone()).or_insert(0) += freq;
            }
            trie_data.push(normalized);
        }
        trie_data.sort();
        trie_data.dedup();

        let max_frequency = word_frequencies.values().copied().max().unwrap_or(0);
        let word_count = trie_data.len();

        Self {
            corpus_id: corpus.corpus_id.clone(),
            vocabulary_hash: corpus.vocabulary_hash.clone(),
            trie_data,
            word_frequencies: if word_frequencies.is_empty() { None } else { Some(word_frequencies) },
            normalized_to_original,
            max_frequency,
            word_count,
            build_time_seconds: start.elapsed().as_secs_f64(),
        }
    }

    fn original_of(&self, normalized: &str) -> String {
        self.normalized_to_original.get(normalized).cloned().unwrap_or_else(|| normalized.to_string())
    }

    fn frequency_of(&self, normalized: &str) -> u64 {
        self.word_frequencies.as_ref().and_then(|m| m.get(normalized)).copied().unwrap_or(0)
    }

    /// `search_exact(term)` (spec §4.7): zero or one result, score 1.0.
    pub fn search_exact(&self, term: &str) -> Vec<SearchResult> {
        let normalized = text::normalize(term);
        match self.trie_data.binary_search(&normalized) {
            Ok(idx) => vec![SearchResult {
                word: self.original_of(&self.trie_data[idx]),
                score: 1.0,
                method: SearchMethod::Exact,
                frequency: self.frequency_of(&self.trie_data[idx]),
            }],
            Err(_) => Vec::new(),
        }
    }

    /// `search_prefix(prefix, max_results)` (spec §4.7): binary search for
    /// the lower bound, walk forward while the prefix matches.
    pub fn search_prefix(&self, prefix: &str, max_results: usize) -> Vec<SearchResult> {
        let normalized_prefix = text::normalize(prefix);
        if normalized_prefix.is_empty() {
            return Vec::new();
        }

        let start = self.trie_data.partition_point(|t| t.as_str() < normalized_prefix.as_str());
        let mut candidates: Vec<SearchResult> = Vec::new();
        for term in &self.trie_data[start..] {
            if !term.starts_with(normalized_prefix.as_str()) {
                break;
            }
            let score = if term == &normalized_prefix {
                1.0
            } else {
                let len_penalty = (term.len() as f32 - normalized_prefix.len() as f32) * 0.01;
                (1.0 - len_penalty).max(0.0)
            };
            candidates.push(SearchResult {
                word: self.original_of(term),
                score,
                method: SearchMethod::Prefix,
                frequency: self.frequency_of(term),
            });
        }

        super::sort_results(&mut candidates);
        candidates.truncate(max_results);
        candidates
    }
}

/// Persists [`TrieIndex`] records through the version store and enforces
/// the staleness rule (spec §4.6 "Change detection", P8): a stored index
/// whose `vocabulary_hash` no longer matches the corpus is rebuilt.
pub struct TrieStore {
    store: Arc<VersionStore>,
}

impl TrieStore {
    pub fn new(store: Arc<VersionStore>) -> Self {
        Self { store }
    }

    fn key(corpus_id: &str) -> ResourceKey {
        ResourceKey::new(ResourceType::Trie, corpus_id)
    }

    /// Load a current `TrieIndex` for `corpus`, rebuilding and persisting
    /// a fresh one if none exists or the stored `vocabulary_hash` is stale.
    pub async fn build_or_load(&self, corpus: &Corpus) -> Result<TrieIndex> {
        if let Some(record) = self.store.get_latest(&Self::key(&corpus.corpus_id)).await? {
            match self.store.decode_content(&record) {
                Ok(value) => {
                    if let Ok(index) = serde_json::from_value::<TrieIndex>(value) {
                        if index.vocabulary_hash == corpus.vocabulary_hash {
                            return Ok(index);
                        }
                    }
                }
                Err(_) => {
                    // Corrupt blob: fall through and rebuild (spec §4.9 "Failure").
                }
            }
        }

        let index = TrieIndex::build(corpus);
        let content = serde_json::to_value(&index)?;
        self.store
            .save(Self::key(&corpus.corpus_id), content, SaveConfig::default(), json!({}), vec![])
            .await?;
        Ok(index)
    }
}
