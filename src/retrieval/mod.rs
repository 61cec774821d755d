// SPDX-License-Identifier: MIT

//! Retrieval: load documents, split them, embed them and search them

pub mod document;
pub mod embeddings;
pub mod loader;
pub mod retriever;
pub mod splitter;
pub mod store;

pub use document::{format_docs, Document, ScoredDocument};
pub use embeddings::{cosine_similarity, Embeddings, OpenAICompatEmbeddings};
pub use loader::{load_sources, DocumentLoader, FileLoader, WebLoader};
pub use retriever::{LazyRetriever, Retriever};
pub use splitter::RecursiveTextSplitter;
pub use store::{InMemoryVectorStore, VectorStore};
