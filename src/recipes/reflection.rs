// SPDX-License-Identifier: MIT

//! Reflection: a writer drafts, a reviewer critiques, and the writer revises
//! for a fixed number of rounds.
//!
//! The writer sees its own drafts as model turns and the critiques as user
//! turns; the reviewer sees the roles swapped.

use super::{preview, GraphAgent};
use crate::adk::error::Result;
use crate::adk::model::{generate_text, Content, Model};
use crate::graph::{node_fn, route_fn, CompiledGraph, GraphState, StateGraph, END};
use std::sync::Arc;

pub const EXAMPLE_TASK: &str =
    "Generate a Python implementation of the Fibonacci series for beginner students";

pub const DEFAULT_ROUNDS: u32 = 3;

const GENERATE_PROMPT: &str = "You are an experienced Python programmer who generate high quality Python code for users with there explanations. \
Here's your task: You will Generate the best content for the user's request and give explanation of code line by line. If the user provides critique, \
respond with a revised version of your previous attempt. \
also in the end always ask - Do you have any feedback or would you like me to revise anything? \
In each output you will tell me whats new you have added for the user in comparison to earlier output";

const REFLECT_PROMPT: &str = "You are an experienced Python coder. With this experience in Python generate critique and recommendations for user output on the given prompt";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReflectionState {
    pub task: String,
    pub drafts: Vec<String>,
    pub critiques: Vec<String>,
}

impl ReflectionState {
    pub fn last_draft(&self) -> String {
        self.drafts.last().cloned().unwrap_or_default()
    }
}

pub enum ReflectionUpdate {
    Draft(String),
    Critique(String),
}

impl GraphState for ReflectionState {
    type Update = ReflectionUpdate;

    fn apply(&mut self, update: ReflectionUpdate) {
        match update {
            ReflectionUpdate::Draft(draft) => self.drafts.push(draft),
            ReflectionUpdate::Critique(critique) => self.critiques.push(critique),
        }
    }
}

/// The writer's view: task, then drafts and critiques interleaved
pub fn generation_history(state: &ReflectionState) -> Vec<Content> {
    let mut history = vec![Content::system(GENERATE_PROMPT), Content::user(&state.task)];
    for (i, draft) in state.drafts.iter().enumerate() {
        history.push(Content::model(draft));
        if let Some(critique) = state.critiques.get(i) {
            history.push(Content::user(critique));
        }
    }
    history
}

/// The reviewer's view: every draft as a user turn, answered by its critique
pub fn reflection_history(state: &ReflectionState) -> Vec<Content> {
    let mut history = vec![Content::system(REFLECT_PROMPT)];
    for (i, draft) in state.drafts.iter().enumerate() {
        history.push(Content::user(draft));
        if let Some(critique) = state.critiques.get(i) {
            history.push(Content::model(critique));
        }
    }
    history
}

pub fn build_graph(model: Arc<dyn Model>, rounds: u32) -> Result<CompiledGraph<ReflectionState>> {
    let rounds = rounds.max(1) as usize;
    let mut graph = StateGraph::new();

    let m = model.clone();
    graph.add_node(
        "generate",
        node_fn(move |state: ReflectionState| {
            let m = m.clone();
            async move {
                log::info!("---GENERATE (draft {})---", state.drafts.len() + 1);
                let draft = generate_text(m.as_ref(), &generation_history(&state), None).await?;
                Ok(ReflectionUpdate::Draft(draft))
            }
        }),
    );

    let m = model;
    graph.add_node(
        "reflect",
        node_fn(move |state: ReflectionState| {
            let m = m.clone();
            async move {
                log::info!("---REFLECT---");
                let critique = generate_text(m.as_ref(), &reflection_history(&state), None).await?;
                Ok(ReflectionUpdate::Critique(critique))
            }
        }),
    );

    graph
        .set_entry_point("generate")
        .add_conditional_edges(
            "generate",
            route_fn(move |state: &ReflectionState| {
                if state.drafts.len() >= rounds {
                    END.to_string()
                } else {
                    "reflect".to_string()
                }
            }),
            [("reflect", "reflect"), (END, END)],
        )
        .add_edge("reflect", "generate");

    Ok(graph.compile()?)
}

pub fn build(model: Arc<dyn Model>, rounds: u32) -> Result<GraphAgent<ReflectionState>> {
    Ok(GraphAgent::new(
        "reflection",
        build_graph(model, rounds)?,
        |task| ReflectionState {
            task,
            ..Default::default()
        },
        ReflectionState::last_draft,
    )
    .with_describe(|node, state| {
        let latest = match node {
            "reflect" => state.critiques.last(),
            _ => state.drafts.last(),
        };
        latest.map(|t| preview(t, 80)).unwrap_or_default()
    }))
}
