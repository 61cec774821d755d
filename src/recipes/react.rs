// SPDX-License-Identifier: MIT

//! ReAct calculator: `reasoner ⇄ tools`
//!
//! Models without native tool calling may instead answer with
//! `{"tool": "multiply", "args": [2, 3]}`; the reasoner then runs the tool
//! itself and appends the result as a user message.

use super::GraphAgent;
use crate::adk::error::{AgentError, Result};
use crate::adk::model::{Content, Model};
use crate::adk::structured::parse_json_text;
use crate::adk::tool::Tool;
use crate::graph::{
    node_fn, route_fn, tools_condition, CompiledGraph, MessagesState, StateGraph, ToolNode, END,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const EXAMPLE_QUESTION: &str = "5 * (2 + 3) / 2 = ?";

pub const CALCULATOR_TOOLS: [&str; 3] = ["add", "multiply", "divide"];

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant tasked with using performing arithmetic on a set of inputs.";

#[derive(Debug, Deserialize)]
struct JsonToolCall {
    tool: String,
    #[serde(default)]
    args: Vec<Value>,
}

pub struct Reasoner {
    model: Arc<dyn Model>,
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, Arc<dyn Tool>>,
}

impl Reasoner {
    pub fn new(model: Arc<dyn Model>, tools: Vec<Arc<dyn Tool>>) -> Self {
        let by_name = tools
            .iter()
            .map(|t| (t.name().to_string(), t.clone()))
            .collect();
        Self {
            model,
            tools,
            by_name,
        }
    }

    pub async fn reason(&self, state: &MessagesState) -> Result<Vec<Content>> {
        let mut history = Vec::with_capacity(state.messages.len() + 1);
        history.push(Content::system(SYSTEM_PROMPT));
        history.extend_from_slice(&state.messages);

        let reply = self
            .model
            .generate_content(&history, None, Some(self.tools.as_slice()))
            .await?;
        if reply.has_function_calls() {
            return Ok(vec![reply]);
        }

        let Ok(call) = parse_json_text::<JsonToolCall>(&reply.text()) else {
            return Ok(vec![reply]);
        };
        let tool = self
            .by_name
            .get(&call.tool)
            .ok_or_else(|| AgentError::tool_not_found(&call.tool))?;
        log::info!("JSON tool call: {} {:?}", call.tool, call.args);
        let result = tool.execute(Value::Array(call.args)).await?;
        Ok(vec![reply, Content::user(result.to_string())])
    }
}

pub fn build_graph(
    model: Arc<dyn Model>,
    tools: Vec<Arc<dyn Tool>>,
) -> Result<CompiledGraph<MessagesState>> {
    let reasoner = Arc::new(Reasoner::new(model, tools.clone()));

    let mut graph = StateGraph::new();
    graph
        .add_node(
            "reasoner",
            node_fn(move |state: MessagesState| {
                let reasoner = reasoner.clone();
                async move { reasoner.reason(&state).await }
            }),
        )
        .add_node("tools", Arc::new(ToolNode::new(tools)))
        .set_entry_point("reasoner")
        .add_conditional_edges(
            "reasoner",
            route_fn(tools_condition),
            [("tools", "tools"), (END, END)],
        )
        .add_edge("tools", "reasoner");
    Ok(graph.compile()?)
}

pub fn build(model: Arc<dyn Model>, tools: Vec<Arc<dyn Tool>>) -> Result<GraphAgent<MessagesState>> {
    Ok(GraphAgent::new(
        "react",
        build_graph(model, tools)?,
        MessagesState::from_user,
        MessagesState::last_text,
    )
    .with_describe(|_, state| match state.last_message() {
        Some(m) if m.has_function_calls() => m
            .function_calls()
            .iter()
            .map(|(_, name, args)| format!("{}({})", name, args))
            .collect::<Vec<_>>()
            .join(", "),
        Some(m) => format!("{}: {}", m.role, m.text()),
        None => String::new(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::agent::Agent;
    use crate::adk::model::{ScriptedModel, ROLE_TOOL, ROLE_USER};
    use crate::tools::arithmetic::calculator_tools;
    use serde_json::json;

    #[tokio::test]
    async fn test_native_tool_calls_loop() {
        let model = Arc::new(ScriptedModel::new(vec![
            Content::function_call("c1", "add", json!({"a": 2, "b": 3})),
            Content::function_call("c2", "multiply", json!({"a": 5, "b": 5})),
            Content::function_call("c3", "divide", json!({"a": 25, "b": 2})),
            Content::model("5 * (2 + 3) / 2 = 12.5"),
        ]));
        let agent = build(model.clone(), calculator_tools()).unwrap();

        let state = agent.invoke(EXAMPLE_QUESTION.to_string()).await.unwrap();
        assert_eq!(state.last_text(), "5 * (2 + 3) / 2 = 12.5");
        let tool_messages: Vec<_> = state
            .messages
            .iter()
            .filter(|m| m.is_role(ROLE_TOOL))
            .collect();
        assert_eq!(tool_messages.len(), 3);
        assert_eq!(model.call_count(), 4);
        assert_eq!(model.calls()[0][0].text(), SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_json_tool_reply_runs_inline() {
        let model = Arc::new(ScriptedModel::from_texts([r#"{"tool": "multiply", "args": [5, 2.5]}"#]));
        let agent = build(model, calculator_tools()).unwrap();

        let state = agent.invoke(EXAMPLE_QUESTION.to_string()).await.unwrap();
        let last = state.last_message().unwrap();
        assert_eq!(last.role, ROLE_USER);
        assert_eq!(last.text(), "12.5");
        assert_eq!(state.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_divide_by_zero_reported_to_model() {
        let model = Arc::new(ScriptedModel::new(vec![
            Content::function_call("c1", "divide", json!({"a": 1, "b": 0})),
            Content::model("Cannot divide by zero."),
        ]));
        let agent = build(model.clone(), calculator_tools()).unwrap();

        let state = agent.invoke("1 / 0 = ?".to_string()).await.unwrap();
        assert_eq!(state.last_text(), "Cannot divide by zero.");
        let calls = model.calls();
        let tool_reply = &calls[1][3];
        assert!(tool_reply.is_role(ROLE_TOOL));
        assert!(serde_json::to_string(tool_reply).unwrap().contains("division by zero"));
    }

    #[test]
    fn test_graph_shape() {
        let agent = build(Arc::new(ScriptedModel::new(Vec::new())), calculator_tools()).unwrap();
        let mermaid = agent.mermaid().unwrap();
        assert!(mermaid.contains("reasoner -.-> tools;"));
        assert!(mermaid.contains("tools --> reasoner;"));
    }
}
