// SPDX-License-Identifier: MIT

//! Structured model output
//!
//! A target type `T` is described to the model as a function schema derived
//! with `schemars`. The reply is accepted either as a call to that function or
//! as JSON embedded in plain text, which is what smaller local models tend to
//! produce.

use crate::adk::error::{AgentError, Result};
use crate::adk::model::{Content, GenerationConfig, Model};
use crate::adk::tool::{SchemaTool, Tool};
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("static regex")
});

/// Pull the JSON object out of a model reply.
///
/// A fenced code block wins; otherwise the span from the first `{` to the
/// last `}` is returned.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON.captures(text) {
        return caps.get(1).map(|m| m.as_str());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse `T` out of raw model text
pub fn parse_json_text<T: DeserializeOwned>(text: &str) -> Result<T> {
    let json = extract_json(text)
        .ok_or_else(|| AgentError::validation(format!("no JSON object in reply: {:?}", text)))?;
    serde_json::from_str(json).map_err(|e| AgentError::validation(e.to_string()))
}

/// Describes `T` to a model and parses replies back into it
pub struct StructuredOutput<T> {
    name: String,
    description: String,
    schema: Value,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StructuredOutput<T>
where
    T: JsonSchema + DeserializeOwned,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let mut schema = serde_json::to_value(schemars::schema_for!(T))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
        if let Some(obj) = schema.as_object_mut() {
            obj.remove("$schema");
        }
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// The schema as a bindable function
    pub fn tool(&self) -> Arc<dyn Tool> {
        Arc::new(SchemaTool::new(
            self.name.clone(),
            self.description.clone(),
            self.schema.clone(),
        ))
    }

    /// Parse a reply: arguments of a call to this function first, then JSON text.
    pub fn parse(&self, reply: &Content) -> Result<T> {
        let calls = reply.function_calls();
        if let Some((_, _, args)) = calls
            .iter()
            .find(|(_, name, _)| *name == self.name)
            .or_else(|| calls.first())
        {
            return serde_json::from_value((*args).clone())
                .map_err(|e| AgentError::validation(e.to_string()));
        }
        parse_json_text(&reply.text())
    }
}

/// Outcome of [`Responder::respond`]
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The last raw model reply
    pub reply: Content,
    /// The parsed value, `None` when every attempt failed validation
    pub value: Option<T>,
    pub attempts: u32,
}

/// Calls a model until its reply validates against `T`, up to `max_attempts`.
///
/// After a failed attempt the reply and a message carrying the validation
/// error and the schema are appended to the conversation before retrying.
/// Transport errors are returned as-is.
pub struct Responder<T> {
    model: Arc<dyn Model>,
    output: StructuredOutput<T>,
    max_attempts: u32,
    config: GenerationConfig,
}

impl<T> Responder<T>
where
    T: JsonSchema + DeserializeOwned,
{
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    pub fn new(model: Arc<dyn Model>, output: StructuredOutput<T>) -> Self {
        let config = GenerationConfig::deterministic().with_tool_choice(output.name());
        Self {
            model,
            output,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            config,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn output(&self) -> &StructuredOutput<T> {
        &self.output
    }

    pub async fn respond(&self, messages: &[Content]) -> Result<Response<T>> {
        let tools = [self.output.tool()];
        let mut history = messages.to_vec();
        let mut last_reply = None;

        for attempt in 1..=self.max_attempts {
            let start = std::time::Instant::now();
            let reply = self
                .model
                .generate_content(&history, Some(&self.config), Some(&tools[..]))
                .await?;
            log::debug!(
                "{} attempt {} answered in {} ms",
                self.output.name(),
                attempt,
                start.elapsed().as_millis()
            );

            match self.output.parse(&reply) {
                Ok(value) => {
                    log::info!("{} validated on attempt {}", self.output.name(), attempt);
                    return Ok(Response {
                        reply,
                        value: Some(value),
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    log::warn!(
                        "{} attempt {}/{} failed validation: {}",
                        self.output.name(),
                        attempt,
                        self.max_attempts,
                        e
                    );
                    let feedback = self.feedback(&e);
                    let call_id = reply
                        .function_calls()
                        .first()
                        .and_then(|(id, _, _)| id.map(str::to_string));
                    history.push(reply.clone());
                    last_reply = Some(reply);
                    history.push(match call_id {
                        Some(id) => Content::tool_response(
                            Some(id),
                            self.output.name(),
                            Value::String(feedback),
                        ),
                        None => Content::user(feedback),
                    });
                }
            }
        }

        log::warn!(
            "{} gave up after {} attempts, returning the raw reply",
            self.output.name(),
            self.max_attempts
        );
        Ok(Response {
            reply: last_reply.unwrap_or_else(|| Content::model("")),
            value: None,
            attempts: self.max_attempts,
        })
    }

    fn feedback(&self, error: &AgentError) -> String {
        format!(
            "{}\n\nPay close attention to the function schema.\n\n{} Respond by fixing all validation errors.",
            error, self.output.schema
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::{Part, ScriptedModel, ROLE_TOOL, ROLE_USER};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Grade {
        /// Relevance score 'yes' or 'no'
        score: String,
    }

    #[test]
    fn test_extract_json_from_fence() {
        let text = "Sure!\n```json\n{\"score\": \"yes\"}\n```\nDone {not json}";
        assert_eq!(extract_json(text), Some("{\"score\": \"yes\"}"));
    }

    #[test]
    fn test_extract_json_outermost_span() {
        let text = r#"The answer is {"a": {"b": 1}} as requested"#;
        assert_eq!(extract_json(text), Some(r#"{"a": {"b": 1}}"#));
        assert_eq!(extract_json("no braces here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_schema_has_properties() {
        let out = StructuredOutput::<Grade>::new("Grade", "Binary score");
        assert_eq!(out.schema()["properties"]["score"]["type"], "string");
        assert!(out.schema().get("$schema").is_none());
        assert_eq!(out.tool().name(), "Grade");
    }

    #[test]
    fn test_parse_prefers_function_call() {
        let out = StructuredOutput::<Grade>::new("Grade", "Binary score");
        let reply = Content {
            role: "model".to_string(),
            parts: vec![
                Part::Text(r#"{"score": "no"}"#.to_string()),
                Part::FunctionCall {
                    id: Some("c1".to_string()),
                    name: "Grade".to_string(),
                    args: json!({"score": "yes"}),
                },
            ],
        };
        assert_eq!(out.parse(&reply).unwrap().score, "yes");
        assert_eq!(
            out.parse(&Content::model(r#"{"score": "no"}"#)).unwrap().score,
            "no"
        );
    }

    #[tokio::test]
    async fn test_responder_retries_with_feedback() {
        let model = Arc::new(ScriptedModel::new(vec![
            Content::function_call("c1", "Grade", json!({"wrong": 1})),
            Content::function_call("c2", "Grade", json!({"score": "yes"})),
        ]));
        let responder = Responder::new(
            model.clone(),
            StructuredOutput::<Grade>::new("Grade", "Binary score"),
        );

        let response = responder.respond(&[Content::user("grade it")]).await.unwrap();
        assert_eq!(response.value, Some(Grade { score: "yes".to_string() }));
        assert_eq!(response.attempts, 2);

        let calls = model.calls();
        let second_call = &calls[1];
        assert_eq!(second_call.len(), 3);
        let feedback = second_call.last().unwrap();
        assert_eq!(feedback.role, ROLE_TOOL);
        match &feedback.parts[0] {
            Part::FunctionResponse { id, response, .. } => {
                assert_eq!(id.as_deref(), Some("c1"));
                let text = response.as_str().unwrap();
                assert!(text.contains("Pay close attention to the function schema."));
                assert!(text.ends_with("Respond by fixing all validation errors."));
            }
            other => panic!("unexpected part {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_responder_gives_up_after_max_attempts() {
        let model = Arc::new(ScriptedModel::from_texts(["nope", "still nope", "never"]));
        let responder = Responder::new(
            model.clone(),
            StructuredOutput::<Grade>::new("Grade", "Binary score"),
        );

        let response = responder.respond(&[Content::user("grade it")]).await.unwrap();
        assert!(response.value.is_none());
        assert_eq!(response.attempts, 3);
        assert_eq!(response.reply.text(), "never");
        assert_eq!(model.call_count(), 3);
        // Text replies get feedback as a user message
        assert_eq!(model.calls()[1].last().unwrap().role, ROLE_USER);
    }
}
