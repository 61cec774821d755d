// SPDX-License-Identifier: MIT

//! Prebuilt pieces for message-driven graphs: a conversation state, a node that
//! executes tool calls, the matching router and a ready-made ReAct agent.

use super::compiled::CompiledGraph;
use super::node::{route_fn, GraphState, Node};
use super::state_graph::StateGraph;
use super::END;
use crate::adk::error::{GraphError, Result};
use crate::adk::model::{Content, GenerationConfig, Model};
use crate::adk::tool::Tool;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Conversation state; updates are appended
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesState {
    pub messages: Vec<Content>,
}

impl MessagesState {
    pub fn new(messages: Vec<Content>) -> Self {
        Self { messages }
    }

    pub fn from_user(text: impl Into<String>) -> Self {
        Self::new(vec![Content::user(text)])
    }

    pub fn last_message(&self) -> Option<&Content> {
        self.messages.last()
    }

    /// Text of the last message, empty if there is none
    pub fn last_text(&self) -> String {
        self.last_message().map(Content::text).unwrap_or_default()
    }
}

impl GraphState for MessagesState {
    type Update = Vec<Content>;

    fn apply(&mut self, update: Vec<Content>) {
        self.messages.extend(update);
    }
}

/// Executes every function call in the last message.
///
/// Each call is answered with one tool message. Unknown tools and tool
/// failures are reported to the model as `{"error": ...}` instead of aborting
/// the run.
pub struct ToolNode {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolNode {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            tools: tools
                .into_iter()
                .map(|t| (t.name().to_string(), t))
                .collect(),
        }
    }

    /// Run the calls carried by `message`, returning one tool message per call
    pub async fn execute_calls(&self, message: &Content) -> Vec<Content> {
        let calls = message.function_calls();
        let mut responses = Vec::with_capacity(calls.len());

        for (id, name, args) in calls {
            log::info!("Tool call: {} {}", name, args);

            let response = match self.tools.get(name) {
                Some(tool) => match tool.execute(args.clone()).await {
                    Ok(res) => res,
                    Err(e) => {
                        log::error!("Tool {} failed: {}", name, e);
                        json!({ "error": e.to_string() })
                    }
                },
                None => {
                    log::error!("Tool {} not found", name);
                    json!({ "error": format!("Tool {} not found", name) })
                }
            };

            log::debug!("Tool {} response: {}", name, response);
            responses.push(Content::tool_response(
                id.map(str::to_string),
                name,
                response,
            ));
        }

        responses
    }
}

#[async_trait]
impl Node<MessagesState> for ToolNode {
    async fn run(&self, state: &MessagesState) -> Result<Vec<Content>> {
        match state.last_message() {
            Some(last) if last.has_function_calls() => Ok(self.execute_calls(last).await),
            _ => {
                log::warn!("Tool node reached without pending tool calls");
                Ok(Vec::new())
            }
        }
    }
}

/// `"tools"` when the last message asks for tool calls, `END` otherwise
pub fn tools_condition(state: &MessagesState) -> String {
    match state.last_message() {
        Some(last) if last.has_function_calls() => "tools".to_string(),
        _ => END.to_string(),
    }
}

/// Calls a model with an optional system prompt and bound tools, appending
/// the reply to the conversation.
pub struct ModelNode {
    model: Arc<dyn Model>,
    tools: Vec<Arc<dyn Tool>>,
    system_prompt: Option<String>,
    config: Option<GenerationConfig>,
}

impl ModelNode {
    pub fn new(model: Arc<dyn Model>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            model,
            tools,
            system_prompt: None,
            config: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = Some(config);
        self
    }
}

#[async_trait]
impl Node<MessagesState> for ModelNode {
    async fn run(&self, state: &MessagesState) -> Result<Vec<Content>> {
        let mut history = Vec::with_capacity(state.messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            history.push(Content::system(prompt.clone()));
        }
        history.extend_from_slice(&state.messages);

        let tools = (!self.tools.is_empty()).then_some(self.tools.as_slice());
        let reply = self
            .model
            .generate_content(&history, self.config.as_ref(), tools)
            .await?;

        log::info!(
            "Model replied with {} parts ({} tool calls)",
            reply.parts.len(),
            reply.function_calls().len()
        );
        Ok(vec![reply])
    }
}

/// `agent ⇄ tools` loop: the model is called until it stops asking for tools.
pub fn create_react_agent(
    model: Arc<dyn Model>,
    tools: Vec<Arc<dyn Tool>>,
    system_prompt: Option<String>,
) -> std::result::Result<CompiledGraph<MessagesState>, GraphError> {
    let mut agent = ModelNode::new(model, tools.clone());
    if let Some(prompt) = system_prompt {
        agent = agent.with_system_prompt(prompt);
    }

    let mut graph = StateGraph::new();
    graph
        .add_node("agent", Arc::new(agent))
        .add_node("tools", Arc::new(ToolNode::new(tools)))
        .set_entry_point("agent")
        .add_conditional_edges(
            "agent",
            route_fn(tools_condition),
            [("tools", "tools"), (END, END)],
        )
        .add_edge("tools", "agent");
    graph.compile()
}
