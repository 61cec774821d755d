// SPDX-License-Identifier: MIT

//! Runtime settings
//!
//! Resolution order: built-in defaults, then an optional YAML file
//! (`HELLO_LANGGRAPH_CONFIG`, or `hello-langgraph.yaml` in the working
//! directory), then environment variables. `.env` is loaded by `main` before
//! this runs.

use crate::adk::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "HELLO_LANGGRAPH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "hello-langgraph.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "llama3.2".to_string(),
            temperature: Some(0.0),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "nomic-embed-text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchSettings {
    /// `tavily`, `serper` or `brave`
    pub provider: String,
    pub max_results: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            provider: "tavily".to_string(),
            max_results: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagSettings {
    /// URLs or local file paths indexed by the retrieval recipes
    pub sources: Vec<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            sources: vec![
                "https://lilianweng.github.io/posts/2023-06-23-agent/".to_string(),
                "https://lilianweng.github.io/posts/2023-03-15-prompt-engineering/".to_string(),
                "https://lilianweng.github.io/posts/2023-10-25-adv-attack-llm/".to_string(),
            ],
            chunk_size: 500,
            chunk_overlap: 100,
            top_k: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub search: SearchSettings,
    pub rag: RagSettings,
}

impl Settings {
    /// Defaults, then the config file if any, then the process environment
    pub fn load() -> Result<Self> {
        let mut settings = match config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        let env: HashMap<String, String> = std::env::vars().collect();
        settings.apply_env(&env)?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        log::info!("Loading settings from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Apply environment overrides from `env`
    pub fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<()> {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| env.get(*k).filter(|v| !v.trim().is_empty()).cloned())
        };

        if let Some(v) = get(&["LLM_BASE_URL", "OLLAMA_BASE_URL"]) {
            self.llm.base_url = v;
        }
        if let Some(v) = get(&["LLM_API_KEY", "OPENAI_API_KEY"]) {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get(&["LLM_MODEL"]) {
            self.llm.model = v;
        }
        if let Some(v) = get(&["LLM_TEMPERATURE"]) {
            let t = v
                .parse::<f32>()
                .map_err(|_| AgentError::config(format!("LLM_TEMPERATURE '{}' is not a number", v)))?;
            self.llm.temperature = Some(t);
        }
        if let Some(v) = get(&["EMBEDDING_BASE_URL"]) {
            self.embedding.base_url = v;
        }
        if let Some(v) = get(&["EMBEDDING_MODEL"]) {
            self.embedding.model = v;
        }
        if let Some(v) = get(&["SEARCH_PROVIDER"]) {
            self.search.provider = v;
        }
        if let Some(v) = get(&["SEARCH_MAX_RESULTS"]) {
            self.search.max_results = v.parse().map_err(|_| {
                AgentError::config(format!("SEARCH_MAX_RESULTS '{}' is not a number", v))
            })?;
        }
        if let Some(v) = get(&["RAG_SOURCES"]) {
            self.rag.sources = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    default.exists().then_some(default)
}
