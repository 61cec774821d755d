// SPDX-License-Identifier: MIT

//! Compiled graph executor
//!
//! Runs one node at a time starting from the edge leaving `START`. After each
//! node its update is applied to the state and the outgoing edge picks the next
//! node, until `END` is reached or the recursion limit trips.

use super::checkpoint::Checkpointer;
use super::node::{GraphState, Node, Router};
use super::{END, START};
use crate::adk::error::{GraphError, Result};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const DEFAULT_RECURSION_LIMIT: u32 = 25;

pub(crate) struct Branch<S: GraphState> {
    pub(crate) router: Arc<dyn Router<S>>,
    /// Ordered route key -> target
    pub(crate) path_map: Vec<(String, String)>,
}

pub(crate) enum Transition<S: GraphState> {
    Direct(String),
    Branch(Branch<S>),
}

/// Emitted after every node of a streamed run
#[derive(Debug, Clone)]
pub struct GraphEvent<S> {
    /// 1-based step counter
    pub step: u32,
    pub node: String,
    /// State after the node's update was applied
    pub state: S,
}

pub struct CompiledGraph<S: GraphState> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    node_order: Vec<String>,
    transitions: HashMap<String, Transition<S>>,
    recursion_limit: u32,
    checkpointer: Option<Arc<dyn Checkpointer<S>>>,
}

impl<S: GraphState> CompiledGraph<S> {
    pub(crate) fn new(
        nodes: HashMap<String, Arc<dyn Node<S>>>,
        node_order: Vec<String>,
        transitions: HashMap<String, Transition<S>>,
    ) -> Self {
        Self {
            nodes,
            node_order,
            transitions,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            checkpointer: None,
        }
    }

    /// Maximum number of node executions in a single run
    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn recursion_limit(&self) -> u32 {
        self.recursion_limit
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer<S>>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Run to completion and return the final state
    pub async fn invoke(&self, state: S) -> Result<S> {
        self.execute(state, None).await
    }

    /// Run to completion, sending a [`GraphEvent`] after each node.
    ///
    /// A dropped receiver does not stop the run.
    pub async fn run_stream(&self, state: S, tx: mpsc::Sender<GraphEvent<S>>) -> Result<S> {
        self.execute(state, Some(&tx)).await
    }

    /// Resume `thread_id` from its saved state (or `S::default()` for a new
    /// thread), apply `input`, run, and save the final state.
    pub async fn invoke_thread(&self, thread_id: &str, input: S::Update) -> Result<S>
    where
        S: Default,
    {
        let checkpointer = self
            .checkpointer
            .as_ref()
            .ok_or(GraphError::NoCheckpointer)?;

        let mut state = checkpointer.get(thread_id).await?.unwrap_or_default();
        state.apply(input);

        log::info!("Running thread {}", thread_id);
        let state = self.execute(state, None).await?;
        checkpointer.put(thread_id, &state).await?;
        Ok(state)
    }

    /// Last saved state of a thread
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<S>> {
        let checkpointer = self
            .checkpointer
            .as_ref()
            .ok_or(GraphError::NoCheckpointer)?;
        checkpointer.get(thread_id).await
    }

    async fn execute(&self, mut state: S, tx: Option<&mpsc::Sender<GraphEvent<S>>>) -> Result<S> {
        let mut current = self.next_node(START, &state).await?;
        let mut step: u32 = 0;

        while current != END {
            if step >= self.recursion_limit {
                log::error!(
                    "Graph exceeded recursion limit of {} at node {}",
                    self.recursion_limit,
                    current
                );
                return Err(GraphError::RecursionLimit(self.recursion_limit).into());
            }
            step += 1;

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::NodeNotFound(current.clone()))?;

            log::info!("Step {}: executing node {}", step, current);
            let update = node.run(&state).await.map_err(|e| {
                log::error!("Node {} failed: {}", current, e);
                e
            })?;
            state.apply(update);

            if let Some(tx) = tx {
                let _ = tx
                    .send(GraphEvent {
                        step,
                        node: current.clone(),
                        state: state.clone(),
                    })
                    .await;
            }

            current = self.next_node(&current, &state).await?;
        }

        log::info!("Graph finished after {} steps", step);
        Ok(state)
    }

    async fn next_node(&self, from: &str, state: &S) -> Result<String> {
        let transition = self
            .transitions
            .get(from)
            .ok_or_else(|| GraphError::DeadEnd(from.to_string()))?;

        match transition {
            Transition::Direct(to) => Ok(to.clone()),
            Transition::Branch(branch) => {
                let key = branch.router.route(state).await?;
                let target = branch
                    .path_map
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, t)| t.clone())
                    .ok_or_else(|| GraphError::UnknownRoute {
                        node: from.to_string(),
                        route: key.clone(),
                    })?;
                log::debug!("Route from {}: {} -> {}", from, key, target);
                Ok(target)
            }
        }
    }

    /// Mermaid flowchart of the graph. Conditional edges are dotted and
    /// labelled with their route key when it differs from the target.
    pub fn draw_mermaid(&self) -> String {
        let mut out = String::from("graph TD;\n");
        let _ = writeln!(out, "\t{}([{}]):::first", START, START);
        for name in &self.node_order {
            let _ = writeln!(out, "\t{}({})", name, name);
        }
        let _ = writeln!(out, "\t{}([{}]):::last", END, END);

        let sources = std::iter::once(START).chain(self.node_order.iter().map(String::as_str));
        for from in sources {
            match self.transitions.get(from) {
                Some(Transition::Direct(to)) => {
                    let _ = writeln!(out, "\t{} --> {};", from, to);
                }
                Some(Transition::Branch(branch)) => {
                    for (key, to) in &branch.path_map {
                        if key == to {
                            let _ = writeln!(out, "\t{} -.-> {};", from, to);
                        } else {
                            let _ = writeln!(out, "\t{} -. {} .-> {};", from, key, to);
                        }
                    }
                }
                None => {}
            }
        }

        out.push_str("\tclassDef default fill:#f2f0ff,line-height:1.2\n");
        out.push_str("\tclassDef first fill-opacity:0\n");
        out.push_str("\tclassDef last fill:#bfb6fc\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::adk::error::{AgentError, GraphError};
    use crate::graph::{node_fn, route_fn, MemorySaver, StateGraph, END};
    use crate::graph::GraphState;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Trace {
        visited: Vec<String>,
        count: u32,
    }

    impl GraphState for Trace {
        type Update = String;

        fn apply(&mut self, update: String) {
            self.visited.push(update);
            self.count += 1;
        }
    }

    fn mark(name: &'static str) -> Arc<dyn crate::graph::Node<Trace>> {
        node_fn(move |_s: Trace| async move { Ok(name.to_string()) })
    }

    fn loop_graph(rounds: u32) -> StateGraph<Trace> {
        let mut g = StateGraph::new();
        g.add_node("work", mark("work"))
            .add_node("check", mark("check"))
            .set_entry_point("work")
            .add_edge("work", "check")
            .add_conditional_edges(
                "check",
                route_fn(move |s: &Trace| {
                    if s.count >= rounds * 2 {
                        "done".to_string()
                    } else {
                        "again".to_string()
                    }
                }),
                [("again", "work"), ("done", END)],
            );
        g
    }

    #[tokio::test]
    async fn test_conditional_loop_runs_until_end() {
        let graph = loop_graph(3).compile().unwrap();
        let state = graph.invoke(Trace::default()).await.unwrap();
        assert_eq!(state.count, 6);
        assert_eq!(state.visited[..2], ["work".to_string(), "check".to_string()]);
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let graph = loop_graph(100).compile().unwrap().with_recursion_limit(5);
        let err = graph.invoke(Trace::default()).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Graph(GraphError::RecursionLimit(5))
        ));
    }

    #[tokio::test]
    async fn test_recursion_limit_allows_exact_step_count() {
        let graph = loop_graph(2).compile().unwrap().with_recursion_limit(4);
        let state = graph.invoke(Trace::default()).await.unwrap();
        assert_eq!(state.count, 4);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let mut g = StateGraph::new();
        g.add_node("a", mark("a")).set_entry_point("a").add_conditional_edges(
            "a",
            route_fn(|_s: &Trace| "sideways".to_string()),
            [("done", END)],
        );
        let err = g.compile().unwrap().invoke(Trace::default()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Graph error: Router of 'a' returned unknown route 'sideways'"
        );
    }

    #[tokio::test]
    async fn test_run_stream_emits_steps() {
        let graph = loop_graph(1).compile().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let state = graph.run_stream(Trace::default(), tx).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push((event.step, event.node, event.state.count));
        }
        assert_eq!(
            events,
            vec![(1, "work".to_string(), 1), (2, "check".to_string(), 2)]
        );
        assert_eq!(state.count, 2);
    }

    #[tokio::test]
    async fn test_invoke_thread_resumes_saved_state() {
        let mut g = StateGraph::new();
        g.add_node("echo", mark("echo"))
            .set_entry_point("echo")
            .set_finish_point("echo");
        let graph = g
            .compile()
            .unwrap()
            .with_checkpointer(Arc::new(MemorySaver::<Trace>::new()));

        let first = graph.invoke_thread("t1", "hi".to_string()).await.unwrap();
        assert_eq!(first.visited, vec!["hi", "echo"]);

        let second = graph.invoke_thread("t1", "again".to_string()).await.unwrap();
        assert_eq!(second.visited, vec!["hi", "echo", "again", "echo"]);

        let other = graph.invoke_thread("t2", "x".to_string()).await.unwrap();
        assert_eq!(other.count, 2);
        assert_eq!(graph.get_state("t1").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_invoke_thread_without_checkpointer() {
        let mut g = StateGraph::new();
        g.add_node("a", mark("a")).set_entry_point("a").set_finish_point("a");
        let err = g
            .compile()
            .unwrap()
            .invoke_thread("t", "x".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Graph(GraphError::NoCheckpointer)));
    }

    #[test]
    fn test_draw_mermaid() {
        let graph = loop_graph(1).compile().unwrap();
        let mermaid = graph.draw_mermaid();
        assert!(mermaid.starts_with("graph TD;\n"));
        assert!(mermaid.contains("\t__start__ --> work;\n"));
        assert!(mermaid.contains("\twork --> check;\n"));
        assert!(mermaid.contains("\tcheck -. again .-> work;\n"));
        assert!(mermaid.contains("\tcheck -. done .-> __end__;\n"));
    }
}
