// SPDX-License-Identifier: MIT

//! Prompt templating
//!
//! Templates use `{name}` placeholders; `{{` and `}}` render literal braces,
//! which is how JSON examples are embedded in grader prompts. Partials fix a
//! variable up front, either to a value or to a function evaluated at render
//! time (e.g. the current time).

use crate::adk::error::{AgentError, Result};
use crate::adk::model::{Content, ROLE_MODEL, ROLE_SYSTEM, ROLE_USER};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Variable(String),
}

#[derive(Clone)]
enum Partial {
    Value(String),
    Computed(Arc<dyn Fn() -> String + Send + Sync>),
}

impl Partial {
    fn resolve(&self) -> String {
        match self {
            Partial::Value(v) => v.clone(),
            Partial::Computed(f) => f(),
        }
    }
}

/// A single string template
#[derive(Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    partials: HashMap<String, Partial>,
}

impl PromptTemplate {
    /// Parse a template. Unbalanced braces are a [`AgentError::Template`] error.
    pub fn new(template: &str) -> Result<Self> {
        Ok(Self {
            segments: parse(template)?,
            partials: HashMap::new(),
        })
    }

    /// Variable names in order of first appearance, partials included
    pub fn variables(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable(name) = segment {
                if !seen.contains(&name.as_str()) {
                    seen.push(name.as_str());
                }
            }
        }
        seen
    }

    /// Fix `name` to a constant value
    pub fn partial(mut self, name: &str, value: impl Into<String>) -> Self {
        self.partials
            .insert(name.to_string(), Partial::Value(value.into()));
        self
    }

    /// Fix `name` to a function evaluated on every render
    pub fn partial_fn<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.partials
            .insert(name.to_string(), Partial::Computed(Arc::new(f)));
        self
    }

    /// Render with the given variables. Explicit variables win over partials.
    pub fn format(&self, vars: &[(&str, &str)]) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) => {
                    if let Some((_, value)) = vars.iter().find(|(k, _)| k == name) {
                        out.push_str(value);
                    } else if let Some(partial) = self.partials.get(name) {
                        out.push_str(&partial.resolve());
                    } else {
                        return Err(AgentError::Template(format!(
                            "missing variable '{}'",
                            name
                        )));
                    }
                }
            }
        }
        Ok(out)
    }
}

fn parse(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(AgentError::Template(format!(
                                "unclosed placeholder '{{{}'",
                                name
                            )))
                        }
                    }
                }
                let name = name.trim();
                if name.is_empty() || name.contains('{') {
                    return Err(AgentError::Template(format!(
                        "invalid placeholder '{{{}}}'",
                        name
                    )));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Variable(name.to_string()));
            }
            '}' => {
                return Err(AgentError::Template(
                    "single '}' encountered in template".to_string(),
                ))
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[derive(Clone)]
enum MessageTemplate {
    Message { role: &'static str, template: PromptTemplate },
    Placeholder,
}

/// An ordered list of role-tagged templates with an optional slot for the
/// running conversation.
#[derive(Clone, Default)]
pub struct ChatPromptTemplate {
    messages: Vec<MessageTemplate>,
}

impl ChatPromptTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(self, template: &str) -> Result<Self> {
        self.push(ROLE_SYSTEM, template)
    }

    pub fn user(self, template: &str) -> Result<Self> {
        self.push(ROLE_USER, template)
    }

    pub fn model(self, template: &str) -> Result<Self> {
        self.push(ROLE_MODEL, template)
    }

    /// Where the conversation passed to [`render`](Self::render) is spliced in
    pub fn messages_placeholder(mut self) -> Self {
        self.messages.push(MessageTemplate::Placeholder);
        self
    }

    fn push(mut self, role: &'static str, template: &str) -> Result<Self> {
        self.messages.push(MessageTemplate::Message {
            role,
            template: PromptTemplate::new(template)?,
        });
        Ok(self)
    }

    /// Apply a constant partial to every message template
    pub fn partial(self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        self.map_templates(|t| t.partial(name, value.clone()))
    }

    /// Apply a computed partial to every message template
    pub fn partial_fn<F>(self, name: &str, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.map_templates(|t| {
            let f = f.clone();
            t.partial_fn(name, move || f())
        })
    }

    fn map_templates(self, mut map: impl FnMut(PromptTemplate) -> PromptTemplate) -> Self {
        let messages = self
            .messages
            .into_iter()
            .map(|m| match m {
                MessageTemplate::Message { role, template } => MessageTemplate::Message {
                    role,
                    template: map(template),
                },
                MessageTemplate::Placeholder => MessageTemplate::Placeholder,
            })
            .collect();
        Self { messages }
    }

    /// Render to a message list, splicing `history` into the placeholder
    pub fn render(&self, vars: &[(&str, &str)], history: &[Content]) -> Result<Vec<Content>> {
        let mut out = Vec::with_capacity(self.messages.len() + history.len());
        for message in &self.messages {
            match message {
                MessageTemplate::Message { role, template } => {
                    out.push(Content::new(*role, template.format(vars)?));
                }
                MessageTemplate::Placeholder => out.extend_from_slice(history),
            }
        }
        Ok(out)
    }
}
