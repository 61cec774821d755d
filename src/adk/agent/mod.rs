// SPDX-License-Identifier: MIT

//! Agent module - the entry point every recipe exposes
//!
//! A recipe wraps a compiled graph behind the [`Agent`] trait so the CLI can
//! dispatch through `Arc<dyn Agent>` without knowing the recipe's state type.

use crate::adk::error::Result;
use crate::graph::{CompiledGraph, GraphEvent, GraphState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentEvent {
    /// A graph node finished; `detail` is a short rendering of what it produced
    Step { node: String, detail: String },
    Answer(String),
    Error(String),
}

/// Core agent trait for all recipes
#[async_trait]
pub trait Agent: Send + Sync {
    /// Returns the agent name
    fn name(&self) -> &str;

    /// Run the agent with the given input
    async fn run(&self, input: String) -> Result<String>;

    /// Mermaid rendering of the agent's graph, if it has one
    fn mermaid(&self) -> Option<String> {
        None
    }

    /// Run the agent with streaming events
    async fn run_stream(&self, input: String, tx: mpsc::Sender<AgentEvent>) -> Result<String> {
        // Default implementation falls back to run()
        match self.run(input).await {
            Ok(res) => {
                let _ = tx.send(AgentEvent::Answer(res.clone())).await;
                Ok(res)
            }
            Err(e) => {
                let _ = tx.send(AgentEvent::Error(e.to_string())).await;
                Err(e)
            }
        }
    }
}

/// Run `graph` from `state`, forwarding every node step to `tx` as an
/// [`AgentEvent::Step`] rendered by `describe`.
pub async fn stream_steps<S, F>(
    graph: &CompiledGraph<S>,
    state: S,
    tx: &mpsc::Sender<AgentEvent>,
    describe: F,
) -> Result<S>
where
    S: GraphState,
    F: Fn(&str, &S) -> String + Send,
{
    let (graph_tx, mut graph_rx) = mpsc::channel::<GraphEvent<S>>(16);

    let forward = async {
        while let Some(event) = graph_rx.recv().await {
            let detail = describe(&event.node, &event.state);
            let _ = tx
                .send(AgentEvent::Step {
                    node: event.node,
                    detail,
                })
                .await;
        }
    };

    let (result, _) = tokio::join!(graph.run_stream(state, graph_tx), forward);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{node_fn, StateGraph, END, START};

    /// A simple mock agent that transforms input (used in tests)
    pub struct MockAgent {
        name: String,
        transform: fn(String) -> String,
    }

    impl MockAgent {
        pub fn new(name: &str, transform: fn(String) -> String) -> Self {
            Self {
                name: name.to_string(),
                transform,
            }
        }
    }

    #[async_trait]
    impl Agent for MockAgent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, input: String) -> Result<String> {
            Ok((self.transform)(input))
        }
    }

    #[tokio::test]
    async fn test_mock_agent() {
        let agent = MockAgent::new("test", |s| format!("{}-transformed", s));
        assert_eq!(agent.name(), "test");

        let result = agent.run("input".to_string()).await.unwrap();
        assert_eq!(result, "input-transformed");
    }

    #[tokio::test]
    async fn test_default_run_stream_sends_answer() {
        let agent = MockAgent::new("test", |s| s.to_uppercase());
        let (tx, mut rx) = mpsc::channel(4);

        let result = agent.run_stream("hi".to_string(), tx).await.unwrap();
        assert_eq!(result, "HI");
        assert_eq!(rx.recv().await, Some(AgentEvent::Answer("HI".to_string())));
    }

    #[derive(Clone, Default)]
    struct Counter {
        n: u32,
    }

    impl GraphState for Counter {
        type Update = u32;

        fn apply(&mut self, update: u32) {
            self.n += update;
        }
    }

    #[tokio::test]
    async fn test_stream_steps_forwards_each_node() {
        let mut graph = StateGraph::<Counter>::new();
        graph
            .add_node("one", node_fn(|_s: Counter| async { Ok(1) }))
            .add_node("two", node_fn(|_s: Counter| async { Ok(2) }))
            .add_edge(START, "one")
            .add_edge("one", "two")
            .add_edge("two", END);
        let graph = graph.compile().unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let state = stream_steps(&graph, Counter::default(), &tx, |node, s| {
            format!("{}={}", node, s.n)
        })
        .await
        .unwrap();
        drop(tx);

        assert_eq!(state.n, 3);
        let mut details = Vec::new();
        while let Some(AgentEvent::Step { detail, .. }) = rx.recv().await {
            details.push(detail);
        }
        assert_eq!(details, vec!["one=1", "two=3"]);
    }
}
