//! OpenAI-backed [`Embedder`] (spec §6), gated behind the
//! `embeddings-openai` feature so the crate's default build carries no
//! HTTP client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FloridifyError, Result};

use super::Embedder;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_batch(std::slice::from_ref(&text.to_string())).await?.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest { model: &self.model, input: texts })
            .send()
            .await
            .map_err(|e| FloridifyError::provider(format!("openai request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FloridifyError::rate_limited("openai embeddings endpoint"));
        }
        if !response.status().is_success() {
            return Err(FloridifyError::provider(format!("openai returned status {}", response.status())));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| FloridifyError::provider(format!("openai response decode failed: {e}")))?;

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
