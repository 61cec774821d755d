// SPDX-License-Identifier: MIT

use crate::adk::error::{AgentError, Result};
use crate::adk::tool::Tool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name → tool map shared between recipes
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        log::info!("Registered tool: {}", tool.name());
        let mut tools = self.tools.write().await;
        tools.insert(tool.name().to_string(), tool);
    }

    pub async fn register_all(&self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool).await;
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(name).cloned()
    }

    /// Like [`get`](Self::get) but a missing tool is an error
    pub async fn require(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.get(name)
            .await
            .ok_or_else(|| AgentError::tool_not_found(name))
    }

    /// Tools for `names`, in the given order
    pub async fn require_all(&self, names: &[&str]) -> Result<Vec<Arc<dyn Tool>>> {
        let tools = self.tools.read().await;
        names
            .iter()
            .map(|name| {
                tools
                    .get(*name)
                    .cloned()
                    .ok_or_else(|| AgentError::tool_not_found(*name))
            })
            .collect()
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
