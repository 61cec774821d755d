// SPDX-License-Identifier: MIT

//! Brute-force in-memory vector store

use super::document::{Document, ScoredDocument};
use super::embeddings::{cosine_similarity, Embeddings};
use crate::adk::error::{AgentError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add_documents(&self, docs: Vec<Document>) -> Result<()>;

    /// The `k` most similar documents, best first
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>>;
}

struct Entry {
    document: Document,
    vector: Vec<f32>,
}

/// Keeps every vector in memory and scores all of them on each query
pub struct InMemoryVectorStore {
    embeddings: Arc<dyn Embeddings>,
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryVectorStore {
    pub fn new(embeddings: Arc<dyn Embeddings>) -> Self {
        Self {
            embeddings,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_documents(&self, docs: Vec<Document>) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = docs.iter().map(|d| d.page_content.clone()).collect();
        let vectors = self.embeddings.embed_documents(&texts).await?;
        if vectors.len() != docs.len() {
            return Err(AgentError::api(
                "embeddings",
                format!("expected {} vectors, got {}", docs.len(), vectors.len()),
            ));
        }

        let mut entries = self.entries.write().await;
        entries.extend(
            docs.into_iter()
                .zip(vectors)
                .map(|(document, vector)| Entry { document, vector }),
        );
        log::info!("Vector store holds {} documents", entries.len());
        Ok(())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        let query_vec = self.embeddings.embed_query(query).await?;
        let entries = self.entries.read().await;

        let mut scored: Vec<ScoredDocument> = entries
            .iter()
            .map(|e| ScoredDocument {
                document: e.document.clone(),
                score: cosine_similarity(&query_vec, &e.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}
