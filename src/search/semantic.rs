//! Semantic index (spec §3 `SemanticIndex`, §4.9): vocabulary embeddings
//! plus an approximate nearest-neighbor structure with quantization
//! tiers selected by vocabulary size.
//!
//! The concrete embedding model is an external collaborator (§6); this
//! module only defines the `Embedder` seam (grounded on the teacher's
//! `embedding::embedder::Embedder` trait, `async-trait`-based) and the
//! index built on top of it. A full multi-layer HNSW graph is out of
//! scope for this budget (documented in DESIGN.md); the ANN structure
//! here is a single-layer coarse partitioning over quantized vectors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::corpus::Corpus;
use crate::error::Result;
use crate::text;
use crate::version::{ResourceKey, ResourceType, SaveConfig, VersionStore};

use super::{SearchMethod, SearchResult};

/// `embed(text) -> vector` / `embed_batch` (spec §6): a fixed-dimension,
/// thread-safe-under-the-worker-pool embedding provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Index style selected by vocabulary size (spec §4.9 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantizationTier {
    Flat,
    Fp16,
    Int8,
    Int8Coarse,
}

pub fn tier_for_vocab_size(n: usize) -> QuantizationTier {
    match n {
        0..=999 => QuantizationTier::Flat,
        1_000..=9_999 => QuantizationTier::Fp16,
        10_000..=99_999 => QuantizationTier::Int8,
        _ => QuantizationTier::Int8Coarse,
    }
}

fn quantize(vectors: &[Vec<f32>], tier: QuantizationTier) -> Vec<Vec<f32>> {
    match tier {
        QuantizationTier::Flat => vectors.to_vec(),
        QuantizationTier::Fp16 => vectors
            .par_iter()
            .map(|v| v.iter().map(|x| ((x * 2048.0).round() / 2048.0).clamp(-1.0, 1.0)).collect())
            .collect(),
        QuantizationTier::Int8 | QuantizationTier::Int8Coarse => vectors
            .par_iter()
            .map(|v| v.iter().map(|x| ((x * 127.0).round() / 127.0).clamp(-1.0, 1.0)).collect())
            .collect(),
    }
}

fn normalize_unit(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity of two unit vectors, mapped into `[0,1]` (spec §4.9
/// "Convert distances to similarity scores in [0,1]").
fn cosine_similarity_01(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    ((dot + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Deterministic coarse partitioning: centroids are sampled at a fixed
/// stride through the build-time vector order, so the same corpus always
/// yields the same partitioning (R4 determinism).
fn build_partitions(vectors: &[Vec<f32>], num_partitions: usize) -> (Vec<Vec<f32>>, Vec<usize>) {
    let n = vectors.len();
    let num_partitions = num_partitions.max(1);
    let stride = (n + num_partitions - 1) / num_partitions;
    let stride = stride.max(1);

    let centroids: Vec<Vec<f32>> = (0..n).step_by(stride).map(|i| vectors[i].clone()).collect();
    let assignments: Vec<usize> = vectors
        .iter()
        .map(|v| {
            centroids
                .iter()
                .enumerate()
                .map(|(ci, c)| (ci, cosine_similarity_01(v, c)))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(ci, _)| ci)
                .unwrap_or(0)
        })
        .collect();
    (centroids, assignments)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticIndex {
    pub corpus_id: String,
    pub model_name: String,
    pub vocabulary_hash: String,
    pub vocabulary: Vec<String>,
    pub lemmatized_vocabulary: Option<Vec<String>>,
    pub dimension: usize,
    pub tier: QuantizationTier,
    pub vectors: Vec<Vec<f32>>,
    pub centroids: Option<Vec<Vec<f32>>>,
    pub partition_of: Option<Vec<usize>>,
    pub variant_mapping: HashMap<usize, usize>,
    pub lemma_to_embeddings: HashMap<usize, Vec<usize>>,
    pub build_time_seconds: f64,
}

impl SemanticIndex {
    /// Build (spec §4.9 "Build"): embed, unit-normalize, quantize by
    /// tier, and group surface forms by lemma.
    pub async fn build(corpus: &Corpus, embedder: &dyn Embedder) -> Result<Self> {
        let start = std::time::Instant::now();
        let normalized_vocab: Vec<String> = corpus.vocabulary.iter().map(|t| text::normalize(t)).collect();

        if normalized_vocab.is_empty() {
            return Ok(Self {
                corpus_id: corpus.corpus_id.clone(),
                model_name: embedder.model_name().to_string(),
                vocabulary_hash: corpus.vocabulary_hash.clone(),
                vocabulary: Vec::new(),
                lemmatized_vocabulary: None,
                dimension: embedder.dimension(),
                tier: QuantizationTier::Flat,
                vectors: Vec::new(),
                centroids: None,
                partition_of: None,
                variant_mapping: HashMap::new(),
                lemma_to_embeddings: HashMap::new(),
                build_time_seconds: start.elapsed().as_secs_f64(),
            });
        }

        let mut raw = embedder.embed_batch(&normalized_vocab).await?;
        for v in raw.iter_mut() {
            normalize_unit(v);
        }
        let tier = tier_for_vocab_size(raw.len());
        let vectors = quantize(&raw, tier);

        let lemma_strings: Vec<String> = match &corpus.lemmatized_vocabulary {
            Some(l) => l.iter().map(|s| text::normalize(s)).collect(),
            None => normalized_vocab.clone(),
        };

        let mut lemma_index: HashMap<String, usize> = HashMap::new();
        let mut variant_mapping = HashMap::new();
        let mut lemma_to_embeddings: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, lemma) in lemma_strings.iter().enumerate() {
            let next_idx = lemma_index.len();
            let lemma_idx = *lemma_index.entry(lemma.clone()).or_insert(next_idx);
            variant_mapping.insert(i, lemma_idx);
            lemma_to_embeddings.entry(lemma_idx).or_default().push(i);
        }

        let (centroids, partition_of) = if matches!(tier, QuantizationTier::Int8 | QuantizationTier::Int8Coarse) {
            let num_partitions = (vectors.len() as f64).sqrt().ceil() as usize;
            let (c, a) = build_partitions(&vectors, num_partitions);
            (Some(c), Some(a))
        } else {
            (None, None)
        };

        Ok(Self {
            corpus_id: corpus.corpus_id.clone(),
            model_name: embedder.model_name().to_string(),
            vocabulary_hash: corpus.vocabulary_hash.clone(),
            vocabulary: normalized_vocab,
            lemmatized_vocabulary: corpus.lemmatized_vocabulary.clone(),
            dimension: embedder.dimension(),
            tier,
            vectors,
            centroids,
            partition_of,
            variant_mapping,
            lemma_to_embeddings,
            build_time_seconds: start.elapsed().as_secs_f64(),
        })
    }

    /// `search(query, k, min_score)` (spec §4.9 "Search").
    pub async fn search(&self, embedder: &dyn Embedder, query: &str, k: usize, min_score: f32) -> Result<Vec<SearchResult>> {
        if self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_vector = embedder.embed(&text::normalize(query)).await?;
        normalize_unit(&mut query_vector);

        let k_prime = (k * 4).max(10);
        let candidate_indices: Vec<usize> = match (&self.centroids, &self.partition_of) {
            (Some(centroids), Some(partition_of)) => {
                let mut ranked: Vec<(usize, f32)> = centroids
                    .iter()
                    .enumerate()
                    .map(|(ci, c)| (ci, cosine_similarity_01(&query_vector, c)))
                    .collect();
                ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                let probe: HashSet<usize> = ranked.into_iter().take(4.min(centroids.len())).map(|(ci, _)| ci).collect();
                (0..self.vectors.len()).filter(|i| probe.contains(&partition_of[*i])).collect()
            }
            _ => (0..self.vectors.len()).collect(),
        };

        let mut scored: Vec<(usize, f32)> = candidate_indices
            .into_par_iter()
            .map(|i| (i, cosine_similarity_01(&query_vector, &self.vectors[i])))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k_prime);

        // Collapse by lemma: best surface form per lemma survives.
        let mut best_by_lemma: HashMap<usize, (usize, f32)> = HashMap::new();
        for (idx, score) in scored {
            let lemma_idx = *self.variant_mapping.get(&idx).unwrap_or(&idx);
            best_by_lemma
                .entry(lemma_idx)
                .and_modify(|existing| {
                    if score > existing.1 {
                        *existing = (idx, score);
                    }
                })
                .or_insert((idx, score));
        }

        let mut results: Vec<(usize, f32)> = best_by_lemma.into_values().filter(|(_, score)| *score >= min_score).collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.vocabulary[a.0].cmp(&self.vocabulary[b.0]))
        });
        results.truncate(k);

        Ok(results
            .into_iter()
            .map(|(idx, score)| SearchResult {
                word: self.vocabulary[idx].clone(),
                score,
                method: SearchMethod::Semantic,
                frequency: 0,
            })
            .collect())
    }

}

/// Persists [`SemanticIndex`] records, discriminated by `model_name`
/// since a corpus may have independent indices per embedding model.
pub struct SemanticStore {
    store: Arc<VersionStore>,
}

impl SemanticStore {
    pub fn new(store: Arc<VersionStore>) -> Self {
        Self { store }
    }

    fn key(corpus_id: &str, model_name: &str) -> ResourceKey {
        ResourceKey::with_discriminator(ResourceType::Semantic, corpus_id, model_name)
    }

    /// Load a current index, rebuilding if absent or stale (spec §4.9
    /// "Cache coherence", P8).
    pub async fn build_or_load(&self, corpus: &Corpus, embedder: &dyn Embedder) -> Result<SemanticIndex> {
        let key = Self::key(&corpus.corpus_id, embedder.model_name());
        if let Some(record) = self.store.get_latest(&key).await? {
            match self.store.decode_content(&record) {
                Ok(value) => {
                    if let Ok(index) = serde_json::from_value::<SemanticIndex>(value) {
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

        let index = SemanticIndex::build(corpus, embedder).await?;
        let content = serde_json::to_value(&index)?;
        self.store.save(key, content, SaveConfig::default(), json!({}), vec![]).await?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CorpusType;

    struct HashEmbedder {
        dimension: usize,
    }

    #[async_trait]
    impl Embedder for HashEmbedder {
        fn model_name(&self) -> &str {
            "test-hash"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0f32; self.dimension];
            for (i, byte) in text.bytes().enumerate() {
                v[i % self.dimension] += byte as f32;
            }
            Ok(v)
        }
    }

    fn corpus_with(terms: &[&str]) -> Corpus {
        let mut corpus = Corpus::new("test", CorpusType::Custom, "en");
        corpus.corpus_id = "c1".into();
        corpus.vocabulary = terms.iter().map(|s| s.to_string()).collect();
        corpus.original_vocabulary = corpus.vocabulary.clone();
        corpus.vocabulary_hash = crate::corpus::CorpusTree::vocabulary_hash(&corpus.vocabulary);
        corpus
    }

    #[tokio::test]
    async fn build_assigns_flat_tier_for_small_vocab() {
        let corpus = corpus_with(&["apple", "banana", "cherry"]);
        let embedder = HashEmbedder { dimension: 8 };
        let index = SemanticIndex::build(&corpus, &embedder).await.unwrap();
        assert_eq!(index.tier, QuantizationTier::Flat);
        assert_eq!(index.vectors.len(), 3);
    }

    #[tokio::test]
    async fn search_returns_the_exact_term_as_top_result() {
        let corpus = corpus_with(&["apple", "banana", "cherry"]);
        let embedder = HashEmbedder { dimension: 8 };
        let index = SemanticIndex::build(&corpus, &embedder).await.unwrap();
        let results = index.search(&embedder, "apple", 3, 0.0).await.unwrap();
        assert_eq!(results[0].word, "apple");
    }

    #[tokio::test]
    async fn empty_vocabulary_yields_no_results() {
        let corpus = corpus_with(&[]);
        let embedder = HashEmbedder { dimension: 8 };
        let index = SemanticIndex::build(&corpus, &embedder).await.unwrap();
        let results = index.search(&embedder, "anything", 3, 0.0).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn build_or_load_rebuilds_on_stale_hash() {
        use crate::cache::Cache;
        use crate::config::Config;
        use crate::registry::{ModelRegistry, ResourceSchema};
        use crate::storage::memory::MemoryBlobStore;
        use crate::storage::BlobStore;

        let registry = Arc::new(ModelRegistry::new());
        registry.register_schema(ResourceType::Semantic, ResourceSchema::new("semantic")).unwrap();
        let blob_store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let cache = Arc::new(Cache::new(Config::default(), blob_store.clone()));
        let store = Arc::new(VersionStore::new(Config::default(), cache, blob_store, registry));
        let semantic_store = SemanticStore::new(store);
        let embedder = HashEmbedder { dimension: 8 };

        let mut corpus = corpus_with(&["apple", "banana"]);
        let first = semantic_store.build_or_load(&corpus, &embedder).await.unwrap();
        assert_eq!(first.vectors.len(), 2);

        corpus.vocabulary.push("cherry".into());
        corpus.original_vocabulary.push("cherry".into());
        corpus.vocabulary_hash = crate::corpus::CorpusTree::vocabulary_hash(&corpus.vocabulary);

        let second = semantic_store.build_or_load(&corpus, &embedder).await.unwrap();
        assert_eq!(second.vectors.len(), 3);
    }
}
