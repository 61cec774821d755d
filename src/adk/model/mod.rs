// SPDX-License-Identifier: MIT

//! Model module - defines LLM model trait and implementations
//!
//! This module provides the core Model trait and shared message types.
//! Implementations live in their own submodules:
//! - [openai] - any OpenAI-compatible chat completions endpoint (Ollama, OpenAI, Moonshot, Zhipu)
//! - [scripted] - deterministic replay of queued responses

pub mod openai;
pub mod scripted;

use crate::adk::error::Result;
use crate::adk::tool::Tool;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use openai::OpenAICompatModel;
pub use scripted::ScriptedModel;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_MODEL: &str = "model";
pub const ROLE_TOOL: &str = "tool";

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    /// Ask the endpoint for a single JSON object as the reply
    #[serde(default)]
    pub json_mode: bool,
    /// Force the model to call the named tool
    pub tool_choice: Option<String>,
}

impl GenerationConfig {
    /// Deterministic sampling, as used by graders and routers
    pub fn deterministic() -> Self {
        Self {
            temperature: Some(0.0),
            ..Default::default()
        }
    }

    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_tool_choice(mut self, name: impl Into<String>) -> Self {
        self.tool_choice = Some(name.into());
        self
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// Parts of a message - text, thinking, function calls, etc.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Part {
    /// Regular text output
    Text(String),
    /// Reasoning content from thinking models
    Thinking(String),
    /// Function/tool call requested by the model
    FunctionCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        args: serde_json::Value,
    },
    /// Response from executing a function/tool
    FunctionResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        response: serde_json::Value,
    },
}

impl Content {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(ROLE_SYSTEM, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ROLE_USER, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(ROLE_MODEL, text)
    }

    /// A model message carrying a single function call
    pub fn function_call(
        id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self {
            role: ROLE_MODEL.to_string(),
            parts: vec![Part::FunctionCall {
                id: Some(id.into()),
                name: name.into(),
                args,
            }],
        }
    }

    /// A tool message answering the call `id`
    pub fn tool_response(
        id: Option<String>,
        name: impl Into<String>,
        response: serde_json::Value,
    ) -> Self {
        Self {
            role: ROLE_TOOL.to_string(),
            parts: vec![Part::FunctionResponse {
                id,
                name: name.into(),
                response,
            }],
        }
    }

    /// Concatenated text parts (thinking excluded)
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Function calls carried by this message, in order
    pub fn function_calls(&self) -> Vec<(Option<&str>, &str, &serde_json::Value)> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionCall { id, name, args } => {
                    Some((id.as_deref(), name.as_str(), args))
                }
                _ => None,
            })
            .collect()
    }

    pub fn has_function_calls(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::FunctionCall { .. }))
    }

    pub fn is_role(&self, role: &str) -> bool {
        self.role == role
    }
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[Arc<dyn Tool>]>,
    ) -> Result<Content>;
}

/// Run the model without tools and return the text of its reply
pub async fn generate_text(
    model: &dyn Model,
    history: &[Content],
    config: Option<&GenerationConfig>,
) -> Result<String> {
    let response = model.generate_content(history, config, None).await?;
    Ok(response.text())
}
