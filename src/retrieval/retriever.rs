// SPDX-License-Identifier: MIT

//! Retrievers answer a query with relevant documents

use super::document::Document;
use super::embeddings::Embeddings;
use super::loader::{load_sources, DocumentLoader};
use super::splitter::RecursiveTextSplitter;
use super::store::{InMemoryVectorStore, VectorStore};
use crate::adk::error::{AgentError, Result};
use crate::config::RagSettings;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>>;
}

enum Sources {
    Paths(Vec<String>),
    Loader(Arc<dyn DocumentLoader>),
}

/// Builds its index on first use (load, split, embed, store) and keeps it for
/// the lifetime of the retriever.
pub struct LazyRetriever {
    sources: Sources,
    splitter: RecursiveTextSplitter,
    embeddings: Arc<dyn Embeddings>,
    k: usize,
    store: OnceCell<InMemoryVectorStore>,
}

impl LazyRetriever {
    pub fn new(settings: &RagSettings, embeddings: Arc<dyn Embeddings>) -> Result<Self> {
        Ok(Self {
            sources: Sources::Paths(settings.sources.clone()),
            splitter: RecursiveTextSplitter::new(settings.chunk_size, settings.chunk_overlap)?,
            embeddings,
            k: settings.top_k,
            store: OnceCell::new(),
        })
    }

    /// Index whatever `loader` produces instead of the configured sources
    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.sources = Sources::Loader(loader);
        self
    }

    pub fn is_built(&self) -> bool {
        self.store.initialized()
    }

    async fn build(&self) -> Result<InMemoryVectorStore> {
        let docs = match &self.sources {
            Sources::Paths(paths) => {
                if paths.is_empty() {
                    return Err(AgentError::config("no retrieval sources configured"));
                }
                load_sources(paths).await?
            }
            Sources::Loader(loader) => loader.load().await?,
        };

        let chunks = self.splitter.split_documents(&docs);
        log::info!(
            "Indexing {} chunks from {} documents",
            chunks.len(),
            docs.len()
        );

        let store = InMemoryVectorStore::new(self.embeddings.clone());
        store.add_documents(chunks).await?;
        Ok(store)
    }
}

#[async_trait]
impl Retriever for LazyRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let store = self.store.get_or_try_init(|| self.build()).await?;
        let hits = store.similarity_search(query, self.k).await?;
        log::debug!(
            "Retrieved {} documents (best score {:?})",
            hits.len(),
            hits.first().map(|h| h.score)
        );
        Ok(hits.into_iter().map(|h| h.document).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::store::tests::LetterEmbeddings;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl DocumentLoader for CountingLoader {
        async fn load(&self) -> Result<Vec<Document>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                Document::new("xxxx yyyy").with_metadata("source", "a"),
                Document::new("aaaa bbbb").with_metadata("source", "b"),
            ])
        }
    }

    fn settings() -> RagSettings {
        RagSettings {
            sources: Vec::new(),
            chunk_size: 100,
            chunk_overlap: 10,
            top_k: 1,
        }
    }

    #[tokio::test]
    async fn test_index_built_once() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
        });
        let retriever = LazyRetriever::new(&settings(), Arc::new(LetterEmbeddings))
            .unwrap()
            .with_loader(loader.clone());
        assert!(!retriever.is_built());

        let first = retriever.retrieve("aaab").await.unwrap();
        let second = retriever.retrieve("xyxy").await.unwrap();

        assert!(retriever.is_built());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(first[0].source(), Some("b"));
        assert_eq!(second[0].source(), Some("a"));
    }

    #[tokio::test]
    async fn test_no_sources_is_config_error() {
        let retriever = LazyRetriever::new(&settings(), Arc::new(LetterEmbeddings)).unwrap();
        let err = retriever.retrieve("q").await.unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
        assert!(!retriever.is_built());
    }
}
