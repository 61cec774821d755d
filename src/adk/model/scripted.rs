// SPDX-License-Identifier: MIT

//! Deterministic model that replays queued responses
//!
//! Used by the tests and by offline demos of the recipes. Each call pops the
//! next queued reply; once the queue is empty the fallback reply is returned.

use super::{Content, GenerationConfig, Model};
use crate::adk::error::Result;
use crate::adk::tool::Tool;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A model whose replies are fixed up front
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Content>>,
    fallback: Content,
    calls: Mutex<Vec<Vec<Content>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Content>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: Content::model(""),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Shorthand for a script made only of text replies
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(Content::model).collect())
    }

    /// Reply returned once the script is exhausted
    pub fn with_fallback(mut self, fallback: Content) -> Self {
        self.fallback = fallback;
        self
    }

    /// Histories passed to each call, oldest first
    pub fn calls(&self) -> Vec<Vec<Content>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Model for ScriptedModel {
    async fn generate_content(
        &self,
        history: &[Content],
        _config: Option<&GenerationConfig>,
        _tools: Option<&[Arc<dyn Tool>]>,
    ) -> Result<Content> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(history.to_vec());
        }
        let next = self
            .replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front());
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}
