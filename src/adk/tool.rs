// SPDX-License-Identifier: MIT

use crate::adk::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Trait for tools that can be called by a model or a graph node.
///
/// `name()` and `description()` return `&str` and `schema()` returns `&Value`
/// so implementations keep these in struct fields instead of rebuilding them.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool name (must be unique within a tool set)
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's input parameters
    fn schema(&self) -> &Value;

    /// Execute the tool with the given input and return the result
    async fn execute(&self, input: Value) -> Result<Value>;
}

/// A tool that only advertises a schema.
///
/// Binding one to a model is how structured output is requested: the model
/// "calls" the function and the arguments are the structured reply. Executing
/// it returns the input unchanged.
pub struct SchemaTool {
    name: String,
    description: String,
    schema: Value,
}

impl SchemaTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }
}

#[async_trait]
impl Tool for SchemaTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &Value {
        &self.schema
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        Ok(input)
    }
}
