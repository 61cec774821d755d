// SPDX-License-Identifier: MIT

//! Typed error handling for hello-langgraph
//!
//! Every fallible operation in the crate returns [`AgentError`]. Graph
//! construction and execution failures live in their own enum and are
//! folded into `AgentError::Graph`.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T, E = AgentError> = std::result::Result<T, E>;

/// Top-level error type for hello-langgraph
#[derive(Debug, Error)]
pub enum AgentError {
    /// API errors from external services (LLM endpoint, search, embeddings)
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Tool not found during execution
    #[error("Tool '{name}' not found")]
    ToolNotFound { name: String },

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Graph compilation or execution errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Structured output did not match the expected schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// Prompt template could not be rendered
    #[error("Template error: {0}")]
    Template(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// Max iterations/turns reached
    #[error("Max {kind} reached: {limit}")]
    MaxIterations { kind: String, limit: u32 },

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Errors raised while compiling or running a state graph
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    /// Node name registered twice
    #[error("Node '{0}' is already present")]
    DuplicateNode(String),

    /// `START` and `END` cannot be used as node names
    #[error("Node name '{0}' is reserved")]
    ReservedName(String),

    /// An edge references a node that was never added
    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    /// No edge leaves `START`
    #[error("Graph has no entry point")]
    MissingEntryPoint,

    /// A node has no outgoing edge
    #[error("Node '{0}' is a dead end")]
    DeadEnd(String),

    /// A node has more than one outgoing edge
    #[error("Node '{0}' has more than one outgoing edge")]
    AmbiguousEdge(String),

    /// A router returned a key that its path map does not know
    #[error("Router of '{node}' returned unknown route '{route}'")]
    UnknownRoute { node: String, route: String },

    /// The graph ran more steps than allowed
    #[error("Recursion limit of {0} reached without hitting END")]
    RecursionLimit(u32),

    /// `invoke_thread` called on a graph compiled without a checkpointer
    #[error("Graph has no checkpointer")]
    NoCheckpointer,
}

impl AgentError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a tool not found error
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for AgentError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for AgentError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_wraps_into_agent_error() {
        let err: AgentError = GraphError::RecursionLimit(25).into();
        assert!(matches!(err, AgentError::Graph(GraphError::RecursionLimit(25))));
        assert_eq!(
            err.to_string(),
            "Graph error: Recursion limit of 25 reached without hitting END"
        );
    }

    #[test]
    fn test_api_error_display() {
        let err = AgentError::api("tavily", "401 Unauthorized");
        assert_eq!(err.to_string(), "API error from tavily: 401 Unauthorized");
    }

    #[test]
    fn test_unknown_route_display() {
        let err = GraphError::UnknownRoute {
            node: "grade".to_string(),
            route: "maybe".to_string(),
        };
        assert_eq!(err.to_string(), "Router of 'grade' returned unknown route 'maybe'");
    }
}
