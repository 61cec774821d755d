// SPDX-License-Identifier: MIT

//! A prebuilt ReAct agent over web search whose system prompt carries the
//! current time

use super::GraphAgent;
use crate::adk::error::Result;
use crate::adk::model::Model;
use crate::adk::prompt::PromptTemplate;
use crate::adk::tool::Tool;
use crate::graph::{create_react_agent, MessagesState};
use std::sync::Arc;

pub const EXAMPLE_QUERY: &str = "Which club has Lionel Messi played for most recently?";

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Current time: {time}";

/// The system prompt rendered at the given moment
pub fn system_prompt(now: chrono::DateTime<chrono::Local>) -> Result<String> {
    PromptTemplate::new(SYSTEM_PROMPT)?
        .partial("time", now.to_rfc3339())
        .format(&[])
}

pub fn build(model: Arc<dyn Model>, tools: Vec<Arc<dyn Tool>>) -> Result<GraphAgent<MessagesState>> {
    let prompt = system_prompt(chrono::Local::now())?;
    log::debug!("Search agent prompt: {}", prompt);
    let graph = create_react_agent(model, tools, Some(prompt))?;
    Ok(GraphAgent::new(
        "search-agent",
        graph,
        MessagesState::from_user,
        MessagesState::last_text,
    )
    .with_describe(|node, state| match node {
        "tools" => format!("{} search results", state.messages.len()),
        _ => state
            .last_message()
            .map(|m| {
                let calls = m.function_calls();
                if calls.is_empty() {
                    super::preview(&m.text(), 80)
                } else {
                    calls
                        .iter()
                        .map(|(_, name, args)| format!("{}({})", name, args))
                        .collect::<Vec<_>>()
                        .join(", ")
                }
            })
            .unwrap_or_default(),
    }))
}
