// SPDX-License-Identifier: MIT

//! Recipes - one composed graph, prompt set and tool set per CLI subcommand
//!
//! Every recipe is exposed as an [`Agent`]. [`RecipeFactory`] wires a recipe
//! to the configured model, the shared [`ToolRegistry`] and, for the
//! retrieval recipes, a lazily built retriever.

pub mod adaptive_rag;
pub mod chatbot;
pub mod crag;
pub mod local_retriever;
pub mod plan_execute;
pub mod rag;
pub mod react;
pub mod reflection;
pub mod reflexion;
pub mod rewoo;
pub mod search_agent;
pub mod structured_output;

use crate::adk::agent::{stream_steps, Agent, AgentEvent};
use crate::adk::error::{AgentError, Result};
use crate::adk::model::{Model, OpenAICompatModel};
use crate::adk::tool::{SchemaTool, Tool};
use crate::config::Settings;
use crate::graph::{CompiledGraph, GraphState};
use crate::retrieval::{LazyRetriever, OpenAICompatEmbeddings, Retriever};
use crate::tools::arithmetic::calculator_tools;
use crate::tools::{engine_from_settings, ToolRegistry, WebSearchTool};
use async_trait::async_trait;
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Name of the web search tool in the registry
pub const WEB_SEARCH_TOOL: &str = "web_search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::Subcommand)]
pub enum Recipe {
    /// Draft, search and revise an answer with self-critique
    Reflexion,
    /// Plan, execute one step with a search agent, replan
    PlanExecute,
    /// Plan all tool calls up front, run them, then solve
    Rewoo,
    /// Corrective RAG: grade retrieved documents, fall back to web search
    Crag,
    /// Route between the vector store and the web, grade every generation
    AdaptiveRag,
    /// Gather prompt requirements over several turns, then write the prompt
    Chatbot,
    /// Calculator agent looping between the model and arithmetic tools
    React,
    /// ReAct agent with web search
    SearchAgent,
    /// Generate and critique a draft for a few rounds
    Reflection,
    /// Classify cabin-assistant requests into scenario and action
    StructuredOutput,
    /// Index the configured sources and show the best matches
    LocalRetriever,
}

impl Recipe {
    pub const ALL: [Recipe; 11] = [
        Recipe::Reflexion,
        Recipe::PlanExecute,
        Recipe::Rewoo,
        Recipe::Crag,
        Recipe::AdaptiveRag,
        Recipe::Chatbot,
        Recipe::React,
        Recipe::SearchAgent,
        Recipe::Reflection,
        Recipe::StructuredOutput,
        Recipe::LocalRetriever,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Recipe::Reflexion => "reflexion",
            Recipe::PlanExecute => "plan-execute",
            Recipe::Rewoo => "rewoo",
            Recipe::Crag => "crag",
            Recipe::AdaptiveRag => "adaptive-rag",
            Recipe::Chatbot => "chatbot",
            Recipe::React => "react",
            Recipe::SearchAgent => "search-agent",
            Recipe::Reflection => "reflection",
            Recipe::StructuredOutput => "structured-output",
            Recipe::LocalRetriever => "local-retriever",
        }
    }

    /// Input used when nothing arrives on stdin
    pub fn example_input(&self) -> &'static str {
        match self {
            Recipe::Reflexion => reflexion::EXAMPLE_QUESTION,
            Recipe::PlanExecute => plan_execute::EXAMPLE_OBJECTIVE,
            Recipe::Rewoo => rewoo::EXAMPLE_TASK,
            Recipe::Crag => crag::EXAMPLE_QUESTION,
            Recipe::AdaptiveRag => adaptive_rag::EXAMPLE_QUESTION,
            Recipe::Chatbot => chatbot::EXAMPLE_OPENING,
            Recipe::React => react::EXAMPLE_QUESTION,
            Recipe::SearchAgent => search_agent::EXAMPLE_QUERY,
            Recipe::Reflection => reflection::EXAMPLE_TASK,
            Recipe::StructuredOutput => structured_output::EXAMPLE_REQUESTS,
            Recipe::LocalRetriever => local_retriever::EXAMPLE_QUERY,
        }
    }

    pub fn needs_web_search(&self) -> bool {
        matches!(
            self,
            Recipe::Reflexion
                | Recipe::PlanExecute
                | Recipe::Rewoo
                | Recipe::Crag
                | Recipe::AdaptiveRag
                | Recipe::SearchAgent
        )
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Recipe {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().replace('_', "-").to_ascii_lowercase();
        Recipe::ALL
            .into_iter()
            .find(|r| r.name() == wanted)
            .ok_or_else(|| AgentError::config(format!("unknown recipe: {}", s)))
    }
}

/// Runs a compiled graph as an [`Agent`]: `input` seeds the state, `output`
/// reads the answer off the final state and `describe` renders each step.
pub struct GraphAgent<S: GraphState> {
    name: &'static str,
    graph: CompiledGraph<S>,
    input: fn(String) -> S,
    output: fn(&S) -> String,
    describe: fn(&str, &S) -> String,
}

impl<S: GraphState> GraphAgent<S> {
    pub fn new(
        name: &'static str,
        graph: CompiledGraph<S>,
        input: fn(String) -> S,
        output: fn(&S) -> String,
    ) -> Self {
        Self {
            name,
            graph,
            input,
            output,
            describe: |node, _| format!("{} done", node),
        }
    }

    pub fn with_describe(mut self, describe: fn(&str, &S) -> String) -> Self {
        self.describe = describe;
        self
    }

    pub fn graph(&self) -> &CompiledGraph<S> {
        &self.graph
    }

    /// Run and return the whole final state
    pub async fn invoke(&self, input: String) -> Result<S> {
        self.graph.invoke((self.input)(input)).await
    }
}

#[async_trait]
impl<S: GraphState> Agent for GraphAgent<S> {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, input: String) -> Result<String> {
        log::info!("Running {}", self.name);
        let state = self.invoke(input).await?;
        Ok((self.output)(&state))
    }

    async fn run_stream(&self, input: String, tx: mpsc::Sender<AgentEvent>) -> Result<String> {
        let state = (self.input)(input);
        match stream_steps(&self.graph, state, &tx, self.describe).await {
            Ok(state) => {
                let answer = (self.output)(&state);
                let _ = tx.send(AgentEvent::Answer(answer.clone())).await;
                Ok(answer)
            }
            Err(e) => {
                let _ = tx.send(AgentEvent::Error(e.to_string())).await;
                Err(e)
            }
        }
    }

    fn mermaid(&self) -> Option<String> {
        Some(self.graph.draw_mermaid())
    }
}

/// Shorten `text` to `max` characters for step logs
pub(crate) fn preview(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut)
}

/// Builds recipe agents from settings
pub struct RecipeFactory {
    settings: Settings,
    model: Arc<dyn Model>,
    registry: ToolRegistry,
}

impl RecipeFactory {
    pub fn new(settings: Settings, model: Arc<dyn Model>, registry: ToolRegistry) -> Self {
        Self {
            settings,
            model,
            registry,
        }
    }

    /// Model from `settings.llm`, calculator tools always, web search when the
    /// configured provider has its API key.
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let model: Arc<dyn Model> = Arc::new(OpenAICompatModel::from_settings(&settings.llm)?);
        log::info!(
            "Using model {} at {}",
            settings.llm.model,
            settings.llm.base_url
        );

        let registry = ToolRegistry::new();
        registry.register_all(calculator_tools()).await;
        match engine_from_settings(&settings.search) {
            Ok(engine) => {
                registry
                    .register(Arc::new(WebSearchTool::new(
                        engine,
                        settings.search.max_results,
                    )))
                    .await
            }
            Err(e) => log::warn!("Web search unavailable: {}", e),
        }

        Ok(Self::new(settings, model, registry))
    }

    pub fn model(&self) -> Arc<dyn Model> {
        self.model.clone()
    }

    /// Tools the recipes can draw from
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    fn retriever(&self) -> Result<Arc<dyn Retriever>> {
        let embeddings = Arc::new(OpenAICompatEmbeddings::from_settings(
            &self.settings.embedding,
        ));
        Ok(Arc::new(LazyRetriever::new(&self.settings.rag, embeddings)?))
    }

    pub async fn build(&self, recipe: Recipe) -> Result<Arc<dyn Agent>> {
        let web_search = if recipe.needs_web_search() {
            Some(self.registry.require(WEB_SEARCH_TOOL).await?)
        } else {
            None
        };
        self.assemble(recipe, web_search).await
    }

    /// Mermaid diagram of `recipe`, `None` when it is not a graph.
    ///
    /// Drawing runs nothing, so without a configured web search a schema-only
    /// stand-in takes its place.
    pub async fn draw(&self, recipe: Recipe) -> Result<Option<String>> {
        let web_search: Arc<dyn Tool> = match self.registry.get(WEB_SEARCH_TOOL).await {
            Some(tool) => tool,
            None => Arc::new(SchemaTool::new(
                WEB_SEARCH_TOOL,
                "Web search (not configured)",
                json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"]
                }),
            )),
        };
        Ok(self.assemble(recipe, Some(web_search)).await?.mermaid())
    }

    async fn assemble(
        &self,
        recipe: Recipe,
        web_search: Option<Arc<dyn Tool>>,
    ) -> Result<Arc<dyn Agent>> {
        log::info!("Building recipe '{}'", recipe);
        let model = self.model.clone();
        let search = || {
            web_search
                .clone()
                .ok_or_else(|| AgentError::tool_not_found(WEB_SEARCH_TOOL))
        };

        let agent: Arc<dyn Agent> = match recipe {
            Recipe::Reflexion => Arc::new(reflexion::build(model, search()?)?),
            Recipe::PlanExecute => Arc::new(plan_execute::build(model, vec![search()?])?),
            Recipe::Rewoo => Arc::new(rewoo::build(model, search()?)?),
            Recipe::Crag => Arc::new(crag::build(model, self.retriever()?, search()?)?),
            Recipe::AdaptiveRag => {
                Arc::new(adaptive_rag::build(model, self.retriever()?, search()?)?)
            }
            Recipe::Chatbot => Arc::new(chatbot::Chatbot::new(model)?),
            Recipe::React => {
                let tools = self
                    .registry
                    .require_all(&react::CALCULATOR_TOOLS)
                    .await?;
                Arc::new(react::build(model, tools)?)
            }
            Recipe::SearchAgent => Arc::new(search_agent::build(model, vec![search()?])?),
            Recipe::Reflection => Arc::new(reflection::build(
                model,
                reflection::DEFAULT_ROUNDS,
            )?),
            Recipe::StructuredOutput => {
                Arc::new(structured_output::CabinClassifier::new(model)?)
            }
            Recipe::LocalRetriever => {
                Arc::new(local_retriever::LocalRetriever::new(self.retriever()?))
            }
        };
        Ok(agent)
    }
}
