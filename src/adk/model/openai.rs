// SPDX-License-Identifier: MIT

//! OpenAI-compatible chat completions client
//!
//! Works against any endpoint speaking the `/chat/completions` dialect:
//! Ollama (`http://localhost:11434/v1`), OpenAI, Moonshot, Zhipu.

use super::{Content, GenerationConfig, Model, Part, ROLE_MODEL, ROLE_SYSTEM, ROLE_TOOL, ROLE_USER};
use crate::adk::error::{AgentError, Result};
use crate::adk::tool::Tool;
use crate::config::LlmSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const PROVIDER: &str = "openai-compatible";

/// Chat model served by an OpenAI-compatible endpoint
pub struct OpenAICompatModel {
    client: Client,
    api_key: Option<String>,
    model_name: String,
    base_url: String,
    defaults: GenerationConfig,
}

impl OpenAICompatModel {
    /// Create a client for `model_name` at `base_url` (e.g. `http://localhost:11434/v1`).
    ///
    /// Local servers such as Ollama need no key; hosted ones take a bearer token.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model_name: model_name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            defaults: GenerationConfig::default(),
        }
    }

    /// Build from the `llm` section of the settings
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let model = Self::new(
            settings.base_url.clone(),
            settings.api_key.clone(),
            settings.model.clone(),
        )
        .with_timeout(Duration::from_secs(settings.timeout_secs))?;

        Ok(model.with_defaults(GenerationConfig {
            temperature: settings.temperature,
            ..Default::default()
        }))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Generation settings used when a call passes no config of its own
    pub fn with_defaults(mut self, defaults: GenerationConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Convert internal Content to one or more OpenAI messages.
    ///
    /// A tool message expands to one `role: tool` entry per function response.
    fn content_to_openai_messages(content: &Content) -> Vec<Value> {
        let role = match content.role.as_str() {
            ROLE_SYSTEM => "system",
            ROLE_USER => "user",
            ROLE_MODEL => "assistant",
            ROLE_TOOL => "tool",
            other => other,
        };

        let responses: Vec<Value> = content
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::FunctionResponse { id, name, response } => Some(json!({
                    "role": "tool",
                    "tool_call_id": id.as_deref().unwrap_or(name),
                    "content": response_text(response),
                })),
                _ => None,
            })
            .collect();
        if !responses.is_empty() {
            return responses;
        }

        let mut tool_calls = Vec::new();
        let mut text_content = String::new();

        for part in &content.parts {
            match part {
                Part::Text(t) => text_content.push_str(t),
                Part::Thinking(_) => {}
                Part::FunctionCall { id, name, args } => {
                    tool_calls.push(json!({
                        "id": id.as_deref().unwrap_or(name),
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": args.to_string()
                        }
                    }));
                }
                Part::FunctionResponse { .. } => {}
            }
        }

        if !tool_calls.is_empty() {
            vec![json!({
                "role": role,
                "content": if text_content.is_empty() { Value::Null } else { json!(text_content) },
                "tool_calls": tool_calls
            })]
        } else {
            vec![json!({
                "role": role,
                "content": text_content
            })]
        }
    }

    /// Convert tools to OpenAI function format
    fn tools_to_openai_format(tools: &[Arc<dyn Tool>]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.schema()
                    }
                })
            })
            .collect()
    }

    fn build_body(
        &self,
        history: &[Content],
        config: &GenerationConfig,
        tools: Option<&[Arc<dyn Tool>]>,
    ) -> Value {
        let messages: Vec<Value> = history
            .iter()
            .flat_map(Self::content_to_openai_messages)
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(temp) = config.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = config.max_output_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(top_p) = config.top_p {
            body["top_p"] = json!(top_p);
        }
        if config.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = json!(Self::tools_to_openai_format(tools));
            body["tool_choice"] = match &config.tool_choice {
                Some(name) => json!({"type": "function", "function": {"name": name}}),
                None => json!("auto"),
            };
        }

        body
    }

    /// Parse OpenAI response into Content
    fn parse_openai_response(response: &Value) -> Result<Content> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| AgentError::api(PROVIDER, "No choices in response"))?;

        let message = &choice["message"];
        let mut parts = Vec::new();

        if let Some(reasoning) = message["reasoning_content"].as_str() {
            if !reasoning.is_empty() {
                parts.push(Part::Thinking(reasoning.to_string()));
            }
        }

        if let Some(content) = message["content"].as_str() {
            if !content.is_empty() {
                parts.push(Part::Text(content.to_string()));
            }
        }

        if let Some(tool_calls) = message["tool_calls"].as_array() {
            for tc in tool_calls {
                let name = tc["function"]["name"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                // Some servers send arguments as an object instead of a string
                let args = match &tc["function"]["arguments"] {
                    Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| json!({})),
                    Value::Null => json!({}),
                    other => other.clone(),
                };

                parts.push(Part::FunctionCall {
                    id: tc["id"].as_str().map(str::to_string),
                    name,
                    args,
                });
            }
        }

        Ok(Content {
            role: ROLE_MODEL.to_string(),
            parts,
        })
    }
}

fn response_text(response: &Value) -> String {
    match response {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Model for OpenAICompatModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[Arc<dyn Tool>]>,
    ) -> Result<Content> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(history, config.unwrap_or(&self.defaults), tools);

        log::debug!(
            "Chat request to {}: {}",
            url,
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(AgentError::api(PROVIDER, format!("{}: {}", status, text)));
        }

        let resp_json: Value = resp.json().await?;
        log::debug!("Chat response: {}", resp_json);

        Self::parse_openai_response(&resp_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::tool::SchemaTool;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn model() -> OpenAICompatModel {
        OpenAICompatModel::new("http://localhost:11434/v1/", None, "llama3.2")
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(model().base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_content_to_openai_user_message() {
        let msgs = OpenAICompatModel::content_to_openai_messages(&Content::user("Hello"));
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[0]["content"], "Hello");
    }

    #[test]
    fn test_content_to_openai_assistant_message() {
        let msgs = OpenAICompatModel::content_to_openai_messages(&Content::model("I can help"));
        assert_eq!(msgs[0]["role"], "assistant");
        assert_eq!(msgs[0]["content"], "I can help");
    }

    #[test]
    fn test_function_call_keeps_id() {
        let content = Content::function_call("call_9", "search", json!({"query": "rust"}));
        let msgs = OpenAICompatModel::content_to_openai_messages(&content);
        assert_eq!(msgs[0]["role"], "assistant");
        assert!(msgs[0]["content"].is_null());
        assert_eq!(msgs[0]["tool_calls"][0]["id"], "call_9");
        assert_eq!(msgs[0]["tool_calls"][0]["function"]["name"], "search");
        assert_eq!(
            msgs[0]["tool_calls"][0]["function"]["arguments"],
            r#"{"query":"rust"}"#
        );
    }

    #[test]
    fn test_tool_response_string_is_not_quoted() {
        let content = Content::tool_response(
            Some("call_9".to_string()),
            "AnswerQuestion",
            json!("Prompt generated!"),
        );
        let msgs = OpenAICompatModel::content_to_openai_messages(&content);
        assert_eq!(msgs[0]["role"], "tool");
        assert_eq!(msgs[0]["tool_call_id"], "call_9");
        assert_eq!(msgs[0]["content"], "Prompt generated!");
    }

    #[test]
    fn test_body_json_mode_and_forced_tool() {
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(SchemaTool::new(
            "Plan",
            "Plan to follow",
            json!({"type": "object"}),
        ))];
        let cfg = GenerationConfig::deterministic()
            .with_json_mode()
            .with_tool_choice("Plan");
        let body = model().build_body(&[Content::user("hi")], &cfg, Some(&tools));

        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["tools"][0]["function"]["name"], "Plan");
        assert_eq!(body["tool_choice"]["function"]["name"], "Plan");
    }

    #[test]
    fn test_body_without_tools_has_no_tool_choice() {
        let body = model().build_body(&[Content::user("hi")], &GenerationConfig::default(), None);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_parse_text_response() {
        let response = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Hello, how can I help?"}
            }]
        });

        let content = OpenAICompatModel::parse_openai_response(&response).unwrap();
        assert_eq!(content.role, ROLE_MODEL);
        assert_eq!(content.text(), "Hello, how can I help?");
    }

    #[test]
    fn test_parse_function_call_response() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "multiply",
                            "arguments": "{\"a\": 2, \"b\": 3}"
                        }
                    }]
                }
            }]
        });

        let content = OpenAICompatModel::parse_openai_response(&response).unwrap();
        match &content.parts[0] {
            Part::FunctionCall { id, name, args } => {
                assert_eq!(id.as_deref(), Some("call_123"));
                assert_eq!(name, "multiply");
                assert_eq!(args["b"], 3);
            }
            _ => panic!("Expected FunctionCall part"),
        }
    }

    #[test]
    fn test_parse_object_arguments() {
        let response = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "function": {"name": "add", "arguments": {"a": 1, "b": 2}}
                    }]
                }
            }]
        });
        let content = OpenAICompatModel::parse_openai_response(&response).unwrap();
        assert_eq!(content.function_calls()[0].2["a"], 1);
    }

    #[test]
    fn test_parse_empty_choices_is_api_error() {
        let err = OpenAICompatModel::parse_openai_response(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, AgentError::Api { .. }));
    }

    /// Read one HTTP request, headers and body
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (key, value) = line.split_once(':')?;
                        if key.eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Base URL of a local endpoint answering one request with `status` and `body`
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/v1", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let resp = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(resp.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        base
    }

    #[tokio::test]
    async fn test_server_error_status_is_api_error() {
        let base = serve_once("500 Internal Server Error", r#"{"error": "model crashed"}"#).await;
        let model = OpenAICompatModel::new(base, None, "llama3.2");

        let err = model
            .generate_content(&[Content::user("hi")], None, None)
            .await
            .unwrap_err();
        match err {
            AgentError::Api { provider, message } => {
                assert_eq!(provider, PROVIDER);
                assert!(message.contains("500"));
                assert!(message.contains("model crashed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_from_server_is_api_error() {
        let base = serve_once("200 OK", r#"{"choices": []}"#).await;
        let model = OpenAICompatModel::new(base, Some("sk-test".to_string()), "llama3.2");

        let err = model
            .generate_content(&[Content::user("hi")], None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::Api { ref message, .. } if message == "No choices in response"
        ));
    }

    #[tokio::test]
    async fn test_text_reply_from_server() {
        let base = serve_once(
            "200 OK",
            r#"{"choices": [{"message": {"role": "assistant", "content": "pong"}}]}"#,
        )
        .await;
        let model = OpenAICompatModel::new(base, None, "llama3.2");

        let reply = model
            .generate_content(&[Content::user("ping")], None, None)
            .await
            .unwrap();
        assert_eq!(reply.text(), "pong");
    }
}
