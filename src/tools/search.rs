// SPDX-License-Identifier: MIT

//! Web search engines and the tool that exposes them to models

use crate::adk::error::{AgentError, Result};
use crate::adk::tool::Tool;
use crate::config::SearchSettings;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;

static WEB_SEARCH_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "The search query"
            }
        },
        "required": ["query"]
    })
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A web search backend
#[async_trait]
pub trait WebSearchEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

fn api_key(var: &str) -> Result<String> {
    env::var(var).map_err(|_| AgentError::config(format!("{} must be set", var)))
}

async fn check_status(provider: &str, resp: reqwest::Response) -> Result<Value> {
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await?;
        return Err(AgentError::api(provider, format!("{}: {}", status, text)));
    }
    Ok(resp.json().await?)
}

fn str_field(v: &Value, key: &str) -> String {
    v[key].as_str().unwrap_or_default().to_string()
}

// --- Tavily ---

pub struct TavilySearch {
    client: Client,
    api_key: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Reads `TAVILY_API_KEY`
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(api_key("TAVILY_API_KEY")?))
    }

    fn parse(body: &Value) -> Result<Vec<SearchResult>> {
        let results = body["results"]
            .as_array()
            .ok_or_else(|| AgentError::api("tavily", "missing results"))?;
        Ok(results
            .iter()
            .map(|r| SearchResult {
                title: str_field(r, "title"),
                url: str_field(r, "url"),
                content: str_field(r, "content"),
                score: r["score"].as_f64(),
            })
            .collect())
    }
}

#[async_trait]
impl WebSearchEngine for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let resp = self
            .client
            .post("https://api.tavily.com/search")
            .json(&json!({
                "api_key": self.api_key,
                "query": query,
                "max_results": max_results,
                "search_depth": "basic",
            }))
            .send()
            .await?;
        let body = check_status("tavily", resp).await?;
        Self::parse(&body)
    }
}

// --- Serper (Google) ---

pub struct SerperSearch {
    client: Client,
    api_key: String,
}

impl SerperSearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Reads `SERPER_API_KEY`
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(api_key("SERPER_API_KEY")?))
    }

    fn parse(body: &Value, max_results: usize) -> Vec<SearchResult> {
        let mut results = Vec::new();

        // Answer box first when Google has one
        if let Some(answer) = body.get("answerBox") {
            let content = answer["answer"]
                .as_str()
                .or_else(|| answer["snippet"].as_str())
                .unwrap_or_default();
            if !content.is_empty() {
                results.push(SearchResult {
                    title: str_field(answer, "title"),
                    url: str_field(answer, "link"),
                    content: content.to_string(),
                    score: None,
                });
            }
        }

        if let Some(organic) = body["organic"].as_array() {
            results.extend(organic.iter().map(|r| SearchResult {
                title: str_field(r, "title"),
                url: str_field(r, "link"),
                content: str_field(r, "snippet"),
                score: None,
            }));
        }

        results.truncate(max_results);
        results
    }
}

#[async_trait]
impl WebSearchEngine for SerperSearch {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let resp = self
            .client
            .post("https://google.serper.dev/search")
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query, "num": max_results }))
            .send()
            .await?;
        let body = check_status("serper", resp).await?;
        Ok(Self::parse(&body, max_results))
    }
}

// --- Brave ---

pub struct BraveSearch {
    client: Client,
    api_key: String,
}

impl BraveSearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Reads `BRAVE_API_KEY`
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(api_key("BRAVE_API_KEY")?))
    }

    fn parse(body: &Value) -> Result<Vec<SearchResult>> {
        let results = body
            .get("web")
            .and_then(|w| w.get("results"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AgentError::api("brave", "Invalid response format: missing web.results")
            })?;
        Ok(results
            .iter()
            .map(|r| SearchResult {
                title: str_field(r, "title"),
                url: str_field(r, "url"),
                content: str_field(r, "description"),
                score: None,
            })
            .collect())
    }
}

#[async_trait]
impl WebSearchEngine for BraveSearch {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let count = max_results.clamp(1, 20);

        let mut url = reqwest::Url::parse("https://api.search.brave.com/res/v1/web/search")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("count", &count.to_string());

        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;
        let body = check_status("brave", resp).await?;
        Self::parse(&body)
    }
}

/// Build the engine named by `settings.provider` (`tavily`, `serper`/`google`, `brave`)
pub fn engine_from_settings(settings: &SearchSettings) -> Result<Arc<dyn WebSearchEngine>> {
    let engine: Arc<dyn WebSearchEngine> = match settings.provider.to_lowercase().as_str() {
        "tavily" => Arc::new(TavilySearch::from_env()?),
        "serper" | "google" => Arc::new(SerperSearch::from_env()?),
        "brave" => Arc::new(BraveSearch::from_env()?),
        other => {
            return Err(AgentError::config(format!(
                "unknown search provider '{}'",
                other
            )))
        }
    };
    log::info!("Using search provider: {}", engine.name());
    Ok(engine)
}

#[derive(Debug, Deserialize)]
struct WebSearchArgs {
    query: String,
}

/// Exposes a [`WebSearchEngine`] as a tool taking `{"query": string}`
pub struct WebSearchTool {
    engine: Arc<dyn WebSearchEngine>,
    name: String,
    description: String,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(engine: Arc<dyn WebSearchEngine>, max_results: usize) -> Self {
        Self {
            engine,
            name: "web_search".to_string(),
            description: "Searches the web for current information. Returns relevant results with titles, URLs, and content.".to_string(),
            max_results,
        }
    }

    /// Register under a different name, e.g. `Google` for plan parsers
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Search and return the raw results
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        log::info!("Searching {} for: {}", self.engine.name(), query);
        self.engine.search(query, self.max_results).await
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &Value {
        &WEB_SEARCH_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: WebSearchArgs = serde_json::from_value(input)?;
        let results = self.search(&args.query).await?;
        Ok(serde_json::to_value(results)?)
    }
}

/// Render results as the plain-text context block fed back to a model
pub fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }
    results
        .iter()
        .map(|r| format!("**{}**\n{}\nURL: {}", r.title, r.content, r.url))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
