//! Embedding provider seam (spec §6 "Embedding model interface"): a
//! fixed-dimension `embed`/`embed_batch` trait the semantic index builds
//! on top of. The core ships no real model — callers supply one, or use
//! [`StaticEmbedder`] for tests and local experimentation.
//!
//! Grounded on the teacher's `vector::store::embedder` module: an
//! `async-trait` seam the storage layer drives without knowing the
//! concrete backend.

#[cfg(feature = "embeddings-openai")]
pub mod openai;

pub use crate::search::semantic::Embedder;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

/// A deterministic, dependency-free [`Embedder`] for tests: each term maps
/// to a vector drawn from a fixed lookup table, falling back to a
/// character-frequency hash so arbitrary queries still get a vector.
pub struct StaticEmbedder {
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
}

impl StaticEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            table: HashMap::new(),
        }
    }

    pub fn with_vector(mut self, term: impl Into<String>, vector: Vec<f32>) -> Self {
        self.table.insert(term.into(), vector);
        self
    }

    fn hash_vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            v[i % self.dimension] += byte as f32;
        }
        v
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    fn model_name(&self) -> &str {
        "static-test-embedder"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.table.get(text).cloned().unwrap_or_else(|| self.hash_vector(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_table_hit_returns_the_configured_vector() {
        let embedder = StaticEmbedder::new(3).with_vector("apple", vec![1.0, 0.0, 0.0]);
        let v = embedder.embed("apple").await.unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn lookup_table_miss_falls_back_to_a_hash_vector() {
        let embedder = StaticEmbedder::new(3);
        let v = embedder.embed("unknown-term").await.unwrap();
        assert_eq!(v.len(), 3);
    }
}
