// SPDX-License-Identifier: MIT

//! Corrective RAG
//!
//! ```text
//! retrieve -> grade_documents -> generate -> END
//!                   \-> transform_query -> web_search_node -> generate
//! ```
//!
//! Documents the grader rejects are dropped; if any was rejected the question
//! is rewritten and a web search result is added before generating.

use super::rag::RagToolkit;
use super::{preview, GraphAgent};
use crate::adk::error::Result;
use crate::adk::model::Model;
use crate::adk::tool::Tool;
use crate::graph::{node_fn, route_fn, CompiledGraph, GraphState, StateGraph, END};
use crate::retrieval::{Document, Retriever};
use std::sync::Arc;

pub const EXAMPLE_QUESTION: &str = "What are the types of agent memory?";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CragState {
    pub question: String,
    pub generation: String,
    /// Set when the grader rejected at least one document
    pub web_search: bool,
    pub documents: Vec<Document>,
}

/// Every present field overwrites the state
#[derive(Debug, Default)]
pub struct CragUpdate {
    pub question: Option<String>,
    pub generation: Option<String>,
    pub web_search: Option<bool>,
    pub documents: Option<Vec<Document>>,
}

impl GraphState for CragState {
    type Update = CragUpdate;

    fn apply(&mut self, update: CragUpdate) {
        if let Some(question) = update.question {
            self.question = question;
        }
        if let Some(generation) = update.generation {
            self.generation = generation;
        }
        if let Some(web_search) = update.web_search {
            self.web_search = web_search;
        }
        if let Some(documents) = update.documents {
            self.documents = documents;
        }
    }
}

pub fn decide_to_generate(state: &CragState) -> String {
    if state.web_search {
        log::info!("Decision: some documents are not relevant, transform query");
        "transform_query".to_string()
    } else {
        log::info!("Decision: generate");
        "generate".to_string()
    }
}

pub fn build_graph(
    toolkit: Arc<RagToolkit>,
    retriever: Arc<dyn Retriever>,
) -> Result<CompiledGraph<CragState>> {
    let mut graph = StateGraph::new();

    graph.add_node(
        "retrieve",
        node_fn(move |state: CragState| {
            let retriever = retriever.clone();
            async move {
                log::info!("---RETRIEVE---");
                let documents = retriever.retrieve(&state.question).await?;
                Ok(CragUpdate {
                    documents: Some(documents),
                    ..Default::default()
                })
            }
        }),
    );

    let kit = toolkit.clone();
    graph.add_node(
        "grade_documents",
        node_fn(move |state: CragState| {
            let kit = kit.clone();
            async move {
                log::info!("---CHECK DOCUMENT RELEVANCE TO QUESTION---");
                let (relevant, dropped) =
                    kit.grade_documents(&state.question, &state.documents).await?;
                Ok(CragUpdate {
                    documents: Some(relevant),
                    web_search: Some(dropped),
                    ..Default::default()
                })
            }
        }),
    );

    let kit = toolkit.clone();
    graph.add_node(
        "transform_query",
        node_fn(move |state: CragState| {
            let kit = kit.clone();
            async move {
                log::info!("---TRANSFORM QUERY---");
                let question = kit.rewrite_question(&state.question).await?;
                Ok(CragUpdate {
                    question: Some(question),
                    ..Default::default()
                })
            }
        }),
    );

    let kit = toolkit.clone();
    graph.add_node(
        "web_search_node",
        node_fn(move |state: CragState| {
            let kit = kit.clone();
            async move {
                log::info!("---WEB SEARCH---");
                let mut documents = state.documents;
                documents.push(kit.web_search(&state.question).await);
                Ok(CragUpdate {
                    documents: Some(documents),
                    ..Default::default()
                })
            }
        }),
    );

    let kit = toolkit;
    graph.add_node(
        "generate",
        node_fn(move |state: CragState| {
            let kit = kit.clone();
            async move {
                log::info!("---GENERATE---");
                let generation = kit.generate(&state.question, &state.documents).await?;
                Ok(CragUpdate {
                    generation: Some(generation),
                    ..Default::default()
                })
            }
        }),
    );

    graph
        .set_entry_point("retrieve")
        .add_edge("retrieve", "grade_documents")
        .add_conditional_edges(
            "grade_documents",
            route_fn(decide_to_generate),
            [
                ("transform_query", "transform_query"),
                ("generate", "generate"),
            ],
        )
        .add_edge("transform_query", "web_search_node")
        .add_edge("web_search_node", "generate")
        .add_edge("generate", END);

    Ok(graph.compile()?)
}

pub fn build(
    model: Arc<dyn Model>,
    retriever: Arc<dyn Retriever>,
    search: Arc<dyn Tool>,
) -> Result<GraphAgent<CragState>> {
    let toolkit = Arc::new(RagToolkit::new(model, search)?);
    Ok(GraphAgent::new(
        "crag",
        build_graph(toolkit, retriever)?,
        |question| CragState {
            question,
            ..Default::default()
        },
        |state| state.generation.clone(),
    )
    .with_describe(|node, state| match node {
        "grade_documents" => format!(
            "{} relevant documents, web search: {}",
            state.documents.len(),
            state.web_search
        ),
        "transform_query" => format!("question: {}", state.question),
        "generate" => preview(&state.generation, 80),
        _ => format!("{} documents", state.documents.len()),
    }))
}
