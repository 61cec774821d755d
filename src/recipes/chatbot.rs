// SPDX-License-Identifier: MIT

//! Information-gathering chatbot
//!
//! The `info` node chats with the user until it can fill in
//! [`PromptInstructions`], which it does by calling the function of the same
//! name. The call is acknowledged and the `prompt` node then writes a prompt
//! template from the collected requirements. Conversations are kept per
//! thread by a [`MemorySaver`].

use super::preview;
use crate::adk::agent::Agent;
use crate::adk::error::Result;
use crate::adk::model::{Content, GenerationConfig, Model, ROLE_TOOL, ROLE_USER};
use crate::adk::prompt::PromptTemplate;
use crate::adk::structured::StructuredOutput;
use crate::adk::tool::Tool;
use crate::graph::{node_fn, route_fn, CompiledGraph, MemorySaver, MessagesState, StateGraph, END};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub const EXAMPLE_OPENING: &str = "hi!";

pub const TOOL_ACK: &str = "Prompt generated!";

const FALLBACK_REPLY: &str =
    "I need more information to understand your requirements. Could you please provide more details?";

const INFO_PROMPT: &str = "Your job is to get information from a user about what type of prompt template they want to create.
You should get the following information:

- objective: What the objective of the prompt is
- variables: What variables will be passed into the prompt template
- constraints: Any constraints for what the output should NOT do
- requirements: Any requirements that the output MUST adhere to

If you are not able to discern this info, ask them to clarify! Do not attempt to wildly guess.

After you are able to discern all the information, call the PromptInstructions function, or reply with only a JSON object matching this schema:
{format_instructions}";

const PROMPT_SYSTEM: &str = "Based on the following requirements, write a good prompt template:

{reqs}";

/// Instructions on how to prompt the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PromptInstructions {
    pub objective: String,
    pub variables: Vec<String>,
    pub constraints: Vec<String>,
    pub requirements: Vec<String>,
}

/// Where to go after `info`
pub fn get_state(state: &MessagesState) -> String {
    match state.last_message() {
        Some(last) if last.has_function_calls() => "add_tool_message".to_string(),
        Some(last) if !last.is_role(ROLE_USER) => END.to_string(),
        _ => "info".to_string(),
    }
}

/// The system prompt carrying the requirements of the latest call, followed
/// by every non-tool message after it
pub fn prompt_messages(messages: &[Content], prompt: &PromptTemplate) -> Result<Vec<Content>> {
    let mut reqs = None;
    let mut others = Vec::new();
    for m in messages {
        if let Some((_, _, args)) = m.function_calls().first() {
            reqs = Some((*args).clone());
        } else if m.is_role(ROLE_TOOL) {
            continue;
        } else if reqs.is_some() {
            others.push(m.clone());
        }
    }
    let reqs = reqs.unwrap_or_else(|| json!({})).to_string();
    let mut out = vec![Content::system(prompt.format(&[("reqs", reqs.as_str())])?)];
    out.extend(others);
    Ok(out)
}

struct Gatherer {
    model: Arc<dyn Model>,
    output: StructuredOutput<PromptInstructions>,
    system: String,
    prompt: PromptTemplate,
}

impl Gatherer {
    fn new(model: Arc<dyn Model>) -> Result<Self> {
        let output = StructuredOutput::<PromptInstructions>::new(
            "PromptInstructions",
            "Instructions on how to prompt the LLM.",
        );
        let schema = serde_json::to_string_pretty(output.schema())?;
        let system = PromptTemplate::new(INFO_PROMPT)?
            .format(&[("format_instructions", schema.as_str())])?;
        Ok(Self {
            model,
            output,
            system,
            prompt: PromptTemplate::new(PROMPT_SYSTEM)?,
        })
    }

    async fn info(&self, state: &MessagesState) -> Content {
        let mut history = vec![Content::system(self.system.clone())];
        history.extend_from_slice(&state.messages);
        let tools: Vec<Arc<dyn Tool>> = vec![self.output.tool()];
        let config = GenerationConfig::deterministic();

        match self
            .model
            .generate_content(&history, Some(&config), Some(tools.as_slice()))
            .await
        {
            Ok(reply) if reply.has_function_calls() => reply,
            Ok(reply) => match self.output.parse(&reply) {
                // a JSON answer from a model without tool calling
                Ok(instructions) => match serde_json::to_value(&instructions) {
                    Ok(args) => Content::function_call(
                        uuid::Uuid::new_v4().to_string(),
                        self.output.name(),
                        args,
                    ),
                    Err(_) => reply,
                },
                Err(_) => reply,
            },
            Err(e) => {
                log::warn!("Info gathering failed: {}", e);
                Content::model(FALLBACK_REPLY)
            }
        }
    }

    async fn generate_prompt(&self, state: &MessagesState) -> Result<Content> {
        let messages = prompt_messages(&state.messages, &self.prompt)?;
        self.model.generate_content(&messages, None, None).await
    }
}

fn add_tool_message(state: &MessagesState) -> Vec<Content> {
    let id = state
        .last_message()
        .and_then(|m| m.function_calls().first().and_then(|(id, _, _)| id.map(str::to_string)));
    vec![Content::tool_response(id, "PromptInstructions", json!(TOOL_ACK))]
}

pub fn build_graph(model: Arc<dyn Model>) -> Result<CompiledGraph<MessagesState>> {
    let gatherer = Arc::new(Gatherer::new(model)?);
    let mut graph = StateGraph::new();

    let g = gatherer.clone();
    graph.add_node(
        "info",
        node_fn(move |state: MessagesState| {
            let g = g.clone();
            async move { Ok(vec![g.info(&state).await]) }
        }),
    );
    graph.add_node(
        "add_tool_message",
        node_fn(|state: MessagesState| async move { Ok(add_tool_message(&state)) }),
    );
    let g = gatherer;
    graph.add_node(
        "prompt",
        node_fn(move |state: MessagesState| {
            let g = g.clone();
            async move { Ok(vec![g.generate_prompt(&state).await?]) }
        }),
    );

    graph
        .set_entry_point("info")
        .add_conditional_edges(
            "info",
            route_fn(get_state),
            [
                ("add_tool_message", "add_tool_message"),
                ("info", "info"),
                (END, END),
            ],
        )
        .add_edge("add_tool_message", "prompt")
        .add_edge("prompt", END);

    Ok(graph
        .compile()?
        .with_checkpointer(Arc::new(MemorySaver::<MessagesState>::new())))
}

/// What one user line produced
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub replies: Vec<Content>,
    /// Set when this turn ended with a generated prompt template
    pub prompt_generated: bool,
}

impl ChatTurn {
    pub fn last_text(&self) -> String {
        self.replies.last().map(Content::text).unwrap_or_default()
    }
}

pub struct Chatbot {
    graph: CompiledGraph<MessagesState>,
    thread_id: String,
}

impl Chatbot {
    /// A chatbot on a fresh thread
    pub fn new(model: Arc<dyn Model>) -> Result<Self> {
        Ok(Self {
            graph: build_graph(model)?,
            thread_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub async fn chat(&self, line: &str) -> Result<ChatTurn> {
        let before = self
            .graph
            .get_state(&self.thread_id)
            .await?
            .map(|s| s.messages.len())
            .unwrap_or(0);
        let state = self
            .graph
            .invoke_thread(&self.thread_id, vec![Content::user(line)])
            .await?;

        let replies: Vec<Content> = state.messages.into_iter().skip(before + 1).collect();
        let prompt_generated = replies.iter().any(|m| m.is_role(ROLE_TOOL));
        Ok(ChatTurn {
            replies,
            prompt_generated,
        })
    }
}

#[async_trait]
impl Agent for Chatbot {
    fn name(&self) -> &str {
        "chatbot"
    }

    async fn run(&self, input: String) -> Result<String> {
        let turn = self.chat(&input).await?;
        log::info!(
            "Chatbot turn: {} replies, prompt generated: {}",
            turn.replies.len(),
            turn.prompt_generated
        );
        log::debug!("Last reply: {}", preview(&turn.last_text(), 80));
        Ok(turn.last_text())
    }

    fn mermaid(&self) -> Option<String> {
        Some(self.graph.draw_mermaid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::ScriptedModel;
    use crate::adk::model::ROLE_SYSTEM;

    fn instructions() -> serde_json::Value {
        json!({
            "objective": "rag prompt",
            "variables": ["context", "question"],
            "constraints": [],
            "requirements": ["cite sources"]
        })
    }

    #[test]
    fn test_get_state() {
        let mut state = MessagesState::from_user("hi");
        assert_eq!(get_state(&state), "info");
        state.messages.push(Content::model("what is the objective?"));
        assert_eq!(get_state(&state), END);
        state
            .messages
            .push(Content::function_call("c1", "PromptInstructions", instructions()));
        assert_eq!(get_state(&state), "add_tool_message");
    }

    #[test]
    fn test_prompt_messages_skip_before_call() {
        let messages = vec![
            Content::user("hi"),
            Content::function_call("c1", "PromptInstructions", instructions()),
            Content::tool_response(Some("c1".into()), "PromptInstructions", json!(TOOL_ACK)),
            Content::user("make it red"),
        ];
        let prompt = PromptTemplate::new(PROMPT_SYSTEM).unwrap();
        let out = prompt_messages(&messages, &prompt).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, ROLE_SYSTEM);
        assert!(out[0].text().contains("\"objective\":\"rag prompt\""));
        assert_eq!(out[1].text(), "make it red");
    }

    #[tokio::test]
    async fn test_conversation_persists_per_thread() {
        let model = Arc::new(ScriptedModel::new(vec![
            Content::model("What is the objective of the prompt?"),
            Content::function_call("c1", "PromptInstructions", instructions()),
            Content::model("You are a RAG assistant. Context: {context} Question: {question}"),
        ]));
        let bot = Chatbot::new(model.clone()).unwrap();

        let first = bot.chat(EXAMPLE_OPENING).await.unwrap();
        assert!(!first.prompt_generated);
        assert_eq!(first.last_text(), "What is the objective of the prompt?");

        let second = bot.chat("rag prompt, 2 variables").await.unwrap();
        assert!(second.prompt_generated);
        assert_eq!(second.replies.len(), 3);
        assert_eq!(second.replies[1].text(), "");
        assert!(second.last_text().starts_with("You are a RAG assistant."));

        // the second info call saw the whole thread
        let calls = model.calls();
        assert_eq!(calls[1].len(), 4);
        assert!(calls[1][0].text().contains("PromptInstructions"));
        // the prompt writer only sees the requirements
        assert_eq!(calls[2].len(), 1);

        let saved = bot.graph.get_state(bot.thread_id()).await.unwrap().unwrap();
        assert_eq!(saved.messages.len(), 6);
    }

    #[tokio::test]
    async fn test_json_reply_becomes_call() {
        let model = Arc::new(ScriptedModel::from_texts([
            instructions().to_string(),
            "Prompt template".to_string(),
        ]));
        let bot = Chatbot::new(model).unwrap();
        let turn = bot.chat("rag prompt").await.unwrap();
        assert!(turn.prompt_generated);
        assert!(turn.replies[0].has_function_calls());
        assert_eq!(turn.last_text(), "Prompt template");
    }
}
