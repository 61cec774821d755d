// SPDX-License-Identifier: MIT

//! Text embeddings over an OpenAI-compatible `/embeddings` endpoint

use crate::adk::error::{AgentError, Result};
use crate::config::EmbeddingSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Maximum texts sent in one request
const BATCH_SIZE: usize = 64;

#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Embed a batch of texts, one vector per text in input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| AgentError::api("embeddings", "empty embedding response"))
    }
}

/// Embeddings served by Ollama, OpenAI or any server speaking the same API
pub struct OpenAICompatEmbeddings {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAICompatEmbeddings {
    pub fn new(base_url: &str, api_key: Option<&str>, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
            model: model.to_string(),
        }
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> Self {
        Self::new(
            &settings.base_url,
            settings.api_key.as_deref(),
            &settings.model,
        )
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let mut req = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::api(
                "embeddings",
                format!("{}: {}", status, body),
            ));
        }

        let body: EmbeddingResponse = resp.json().await?;
        into_vectors(body, texts.len())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Order vectors by their `index` field and check the count
fn into_vectors(mut body: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    if body.data.len() != expected {
        return Err(AgentError::api(
            "embeddings",
            format!("expected {} vectors, got {}", expected, body.data.len()),
        ));
    }
    if body.data.iter().all(|d| d.index.is_some()) {
        body.data.sort_by_key(|d| d.index);
    }
    Ok(body.data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Embeddings for OpenAICompatEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            log::debug!("Embedding {} texts with {}", batch.len(), self.model);
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, na, nb), (x, y)| {
            (d + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
