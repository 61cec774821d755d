// SPDX-License-Identifier: MIT

//! Index the configured sources and show what a query retrieves

use super::preview;
use crate::adk::agent::Agent;
use crate::adk::error::Result;
use crate::retrieval::{Document, Retriever};
use async_trait::async_trait;
use std::sync::Arc;

pub const EXAMPLE_QUERY: &str = "What does Lilian Weng say about the types of agent memory?";

const PREVIEW_CHARS: usize = 300;

pub struct LocalRetriever {
    retriever: Arc<dyn Retriever>,
}

impl LocalRetriever {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }
}

/// One numbered block per document, with its source when known
pub fn render(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "No documents found.".to_string();
    }
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let source = doc.source().unwrap_or("unknown source");
            format!(
                "[{}] {}\n{}",
                i + 1,
                source,
                preview(&doc.page_content, PREVIEW_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Agent for LocalRetriever {
    fn name(&self) -> &str {
        "local-retriever"
    }

    async fn run(&self, input: String) -> Result<String> {
        let documents = self.retriever.retrieve(input.trim()).await?;
        log::info!("Retrieved {} documents", documents.len());
        Ok(render(&documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagSettings;
    use crate::retrieval::store::tests::LetterEmbeddings;
    use crate::retrieval::{DocumentLoader, LazyRetriever};

    struct Notes;

    #[async_trait]
    impl DocumentLoader for Notes {
        async fn load(&self) -> Result<Vec<Document>> {
            Ok(vec![
                Document::new("aaaa memory").with_metadata("source", "notes/memory.md"),
                Document::new("zzzz unrelated").with_metadata("source", "notes/other.md"),
            ])
        }
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[]), "No documents found.");
    }

    #[tokio::test]
    async fn test_prints_top_documents() {
        let settings = RagSettings {
            sources: Vec::new(),
            chunk_size: 500,
            chunk_overlap: 100,
            top_k: 1,
        };
        let retriever = LazyRetriever::new(&settings, Arc::new(LetterEmbeddings))
            .unwrap()
            .with_loader(Arc::new(Notes));
        let agent = LocalRetriever::new(Arc::new(retriever));

        let out = agent.run("aaa".to_string()).await.unwrap();
        assert_eq!(out, "[1] notes/memory.md\naaaa memory");
    }
}
