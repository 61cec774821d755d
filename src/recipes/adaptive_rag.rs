// SPDX-License-Identifier: MIT

//! Adaptive RAG
//!
//! The question is routed to the vector store or the web. Retrieved documents
//! are graded; with nothing relevant left the question is rewritten and
//! retrieval repeats. Each generation is checked for grounding in the
//! documents and for answering the question:
//!
//! - not grounded: generate again
//! - grounded but not answering: rewrite the question
//! - grounded and answering: done
//!
//! At most [`MAX_GENERATIONS`] generations are made per run.

use super::rag::RagToolkit;
use super::{preview, GraphAgent};
use crate::adk::error::Result;
use crate::adk::model::{generate_text, Content, GenerationConfig, Model};
use crate::adk::prompt::PromptTemplate;
use crate::adk::structured::parse_json_text;
use crate::adk::tool::Tool;
use crate::graph::{
    async_route_fn, node_fn, route_fn, CompiledGraph, GraphState, StateGraph, END, START,
};
use crate::retrieval::{format_docs, Document, Retriever};
use serde::Deserialize;
use std::sync::Arc;

pub const EXAMPLE_QUESTION: &str = "What is prompt engineering?";

pub const MAX_GENERATIONS: u32 = 3;

const ROUTER_PROMPT: &str = r#"You are an expert at routing a user question to a vectorstore or web search.
The vectorstore contains documents related to agents, prompt engineering, and adversarial attacks.

ROUTING RULES:
- If the question is about AI agents, agent memory, agent planning, agent tools, or agent systems -> use "vectorstore"
- If the question is about prompt engineering, prompting techniques, or prompt design -> use "vectorstore"
- If the question is about adversarial attacks on LLMs or AI security -> use "vectorstore"
- For all other questions (current events, general knowledge, specific facts) -> use "web_search"

Your task is to analyze the question and return a JSON object with the following structure:
{
  "datasource": "vectorstore|web_search"
}

IMPORTANT: Return ONLY a valid JSON object, without any additional text or explanations."#;

const HALLUCINATION_PROMPT: &str = "You are a grader assessing whether an LLM generation is grounded in / supported by a set of retrieved facts. \n
Give a binary score 'yes' or 'no'. 'Yes' means that the answer is grounded in / supported by the set of facts.
Provide the binary score as a JSON with a single key 'score' and no preamble or explanation.";

const ANSWER_PROMPT: &str = "You are a grader assessing whether an answer addresses and/or resolves a question. \n\n
Give a binary score 'yes' or 'no'. Yes, means that the answer resolves the question otherwise return 'no'.
Provide the binary score as a JSON with a single key 'score' and no preamble or explanation.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Vectorstore,
    WebSearch,
}

impl DataSource {
    pub fn route_key(&self) -> &'static str {
        match self {
            DataSource::Vectorstore => "vectorstore",
            DataSource::WebSearch => "web_search",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouteQuery {
    datasource: DataSource,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdaptiveRagState {
    pub question: String,
    pub generation: Option<String>,
    pub documents: Vec<Document>,
    /// Generations made so far
    pub generations: u32,
}

/// Present fields overwrite; a generation also bumps the counter
#[derive(Debug, Default)]
pub struct AdaptiveRagUpdate {
    pub question: Option<String>,
    pub generation: Option<String>,
    pub documents: Option<Vec<Document>>,
}

impl GraphState for AdaptiveRagState {
    type Update = AdaptiveRagUpdate;

    fn apply(&mut self, update: AdaptiveRagUpdate) {
        if let Some(question) = update.question {
            self.question = question;
        }
        if let Some(generation) = update.generation {
            self.generation = Some(generation);
            self.generations += 1;
        }
        if let Some(documents) = update.documents {
            self.documents = documents;
        }
    }
}

/// Routing and generation grading on top of the shared toolkit
pub struct AdaptiveRag {
    toolkit: RagToolkit,
    facts: PromptTemplate,
    answer: PromptTemplate,
}

impl AdaptiveRag {
    pub fn new(model: Arc<dyn Model>, search: Arc<dyn Tool>) -> Result<Self> {
        Ok(Self {
            toolkit: RagToolkit::new(model, search)?,
            facts: PromptTemplate::new(
                "Set of facts: \n\n {documents} \n\n LLM generation: {generation}",
            )?,
            answer: PromptTemplate::new(
                "User question: \n\n {question} \n\n LLM generation: {generation}",
            )?,
        })
    }

    /// Pick the datasource; a reply that does not parse goes to the vector store
    pub async fn route_question(&self, question: &str) -> Result<DataSource> {
        let history = [
            Content::system(ROUTER_PROMPT),
            Content::user(format!(
                "Please analyze this question and determine the appropriate datasource: {}",
                question
            )),
        ];
        let config = GenerationConfig::deterministic().with_json_mode();
        let text = generate_text(self.toolkit.model().as_ref(), &history, Some(&config)).await?;

        let source = match parse_json_text::<RouteQuery>(&text) {
            Ok(route) => route.datasource,
            Err(e) => {
                log::warn!("Error routing question: {}", e);
                DataSource::Vectorstore
            }
        };
        log::info!("Route question to {}", source.route_key());
        Ok(source)
    }

    /// `"useful"`, `"not useful"` or `"not supported"`; `"exhausted"` once
    /// the generation budget is spent.
    pub async fn grade_generation(&self, state: &AdaptiveRagState) -> Result<String> {
        if state.generations >= MAX_GENERATIONS {
            log::warn!(
                "Decision: {} generations made, giving up",
                state.generations
            );
            return Ok("exhausted".to_string());
        }

        let generation = state.generation.as_deref().unwrap_or_default();
        let documents = format_docs(&state.documents);

        let prompt = self.facts.format(&[
            ("documents", documents.as_str()),
            ("generation", generation),
        ])?;
        if !self
            .toolkit
            .yes_no(Some(HALLUCINATION_PROMPT), &prompt)
            .await?
        {
            log::info!("Decision: generation is not grounded in documents, re-try");
            return Ok("not supported".to_string());
        }

        let prompt = self.answer.format(&[
            ("question", state.question.as_str()),
            ("generation", generation),
        ])?;
        if self.toolkit.yes_no(Some(ANSWER_PROMPT), &prompt).await? {
            log::info!("Decision: generation addresses question");
            Ok("useful".to_string())
        } else {
            log::info!("Decision: generation does not address question");
            Ok("not useful".to_string())
        }
    }
}

pub fn decide_to_generate(state: &AdaptiveRagState) -> String {
    if state.documents.is_empty() {
        log::info!("Decision: all documents are not relevant to question, transform query");
        "transform_query".to_string()
    } else {
        log::info!("Decision: generate");
        "generate".to_string()
    }
}

pub fn build_graph(
    rag: Arc<AdaptiveRag>,
    retriever: Arc<dyn Retriever>,
) -> Result<CompiledGraph<AdaptiveRagState>> {
    let mut graph = StateGraph::new();

    let r = rag.clone();
    graph.add_node(
        "web_search",
        node_fn(move |state: AdaptiveRagState| {
            let r = r.clone();
            async move {
                log::info!("---WEB SEARCH---");
                let doc = r.toolkit.web_search(&state.question).await;
                Ok(AdaptiveRagUpdate {
                    documents: Some(vec![doc]),
                    ..Default::default()
                })
            }
        }),
    );

    graph.add_node(
        "retrieve",
        node_fn(move |state: AdaptiveRagState| {
            let retriever = retriever.clone();
            async move {
                log::info!("---RETRIEVE---");
                let documents = retriever.retrieve(&state.question).await?;
                Ok(AdaptiveRagUpdate {
                    documents: Some(documents),
                    ..Default::default()
                })
            }
        }),
    );

    let r = rag.clone();
    graph.add_node(
        "grade_documents",
        node_fn(move |state: AdaptiveRagState| {
            let r = r.clone();
            async move {
                log::info!("---CHECK DOCUMENT RELEVANCE TO QUESTION---");
                let (relevant, _) = r
                    .toolkit
                    .grade_documents(&state.question, &state.documents)
                    .await?;
                Ok(AdaptiveRagUpdate {
                    documents: Some(relevant),
                    ..Default::default()
                })
            }
        }),
    );

    let r = rag.clone();
    graph.add_node(
        "generate",
        node_fn(move |state: AdaptiveRagState| {
            let r = r.clone();
            async move {
                log::info!("---GENERATE---");
                let generation = r
                    .toolkit
                    .generate(&state.question, &state.documents)
                    .await?;
                Ok(AdaptiveRagUpdate {
                    generation: Some(generation),
                    ..Default::default()
                })
            }
        }),
    );

    let r = rag.clone();
    graph.add_node(
        "transform_query",
        node_fn(move |state: AdaptiveRagState| {
            let r = r.clone();
            async move {
                log::info!("---TRANSFORM QUERY---");
                let question = r.toolkit.rewrite_question(&state.question).await?;
                Ok(AdaptiveRagUpdate {
                    question: Some(question),
                    ..Default::default()
                })
            }
        }),
    );

    let router = rag.clone();
    let grader = rag;
    graph
        .add_conditional_edges(
            START,
            async_route_fn(move |state: AdaptiveRagState| {
                let router = router.clone();
                async move {
                    log::info!("---ROUTE QUESTION---");
                    let source = router.route_question(&state.question).await?;
                    Ok(source.route_key().to_string())
                }
            }),
            [("web_search", "web_search"), ("vectorstore", "retrieve")],
        )
        .add_edge("web_search", "generate")
        .add_edge("retrieve", "grade_documents")
        .add_conditional_edges(
            "grade_documents",
            route_fn(decide_to_generate),
            [
                ("transform_query", "transform_query"),
                ("generate", "generate"),
            ],
        )
        .add_edge("transform_query", "retrieve")
        .add_conditional_edges(
            "generate",
            async_route_fn(move |state: AdaptiveRagState| {
                let grader = grader.clone();
                async move {
                    log::info!("---CHECK HALLUCINATIONS---");
                    grader.grade_generation(&state).await
                }
            }),
            [
                ("not supported", "generate"),
                ("useful", END),
                ("not useful", "transform_query"),
                ("exhausted", END),
            ],
        );

    Ok(graph.compile()?)
}

pub fn build(
    model: Arc<dyn Model>,
    retriever: Arc<dyn Retriever>,
    search: Arc<dyn Tool>,
) -> Result<GraphAgent<AdaptiveRagState>> {
    let rag = Arc::new(AdaptiveRag::new(model, search)?);
    Ok(GraphAgent::new(
        "adaptive-rag",
        build_graph(rag, retriever)?,
        |question| AdaptiveRagState {
            question,
            ..Default::default()
        },
        |state| state.generation.clone().unwrap_or_default(),
    )
    .with_describe(|node, state| match node {
        "generate" => format!(
            "generation {}: {}",
            state.generations,
            preview(state.generation.as_deref().unwrap_or_default(), 80)
        ),
        "transform_query" => format!("question: {}", state.question),
        _ => format!("{} documents", state.documents.len()),
    }))
}
