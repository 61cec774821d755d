// SPDX-License-Identifier: MIT

//! Graph builder
//!
//! Nodes are added by name, then wired with fixed edges or conditional edges.
//! Every node must have exactly one way out: either a single fixed edge or a
//! single router. `compile` checks the wiring and hands back an executable
//! [`CompiledGraph`].

use super::compiled::{Branch, CompiledGraph, Transition};
use super::node::{GraphState, Node, Router};
use super::{END, START};
use crate::adk::error::GraphError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct StateGraph<S: GraphState> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    /// Insertion order, used for rendering
    node_order: Vec<String>,
    edges: Vec<(String, String)>,
    branches: Vec<(String, Branch<S>)>,
    duplicates: Vec<String>,
}

impl<S: GraphState> Default for StateGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: GraphState> StateGraph<S> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            node_order: Vec::new(),
            edges: Vec::new(),
            branches: Vec::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn add_node(&mut self, name: impl Into<String>, node: Arc<dyn Node<S>>) -> &mut Self {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            self.duplicates.push(name);
            return self;
        }
        self.node_order.push(name.clone());
        self.nodes.insert(name, node);
        self
    }

    /// Fixed edge. `from` may be [`START`], `to` may be [`END`].
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Same as `add_edge(START, node)`
    pub fn set_entry_point(&mut self, node: impl Into<String>) -> &mut Self {
        self.add_edge(START, node)
    }

    /// Same as `add_edge(node, END)`
    pub fn set_finish_point(&mut self, node: impl Into<String>) -> &mut Self {
        self.add_edge(node, END)
    }

    /// Conditional edge: after `from` runs, `router` returns a key which
    /// `path_map` resolves to the next node (or [`END`]).
    pub fn add_conditional_edges<I, K, V>(
        &mut self,
        from: impl Into<String>,
        router: Arc<dyn Router<S>>,
        path_map: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let path_map = path_map
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.branches.push((from.into(), Branch { router, path_map }));
        self
    }

    /// Validate the wiring and produce an executable graph
    pub fn compile(self) -> Result<CompiledGraph<S>, GraphError> {
        if let Some(name) = self.duplicates.first() {
            return Err(GraphError::DuplicateNode(name.clone()));
        }
        if let Some(reserved) = self
            .node_order
            .iter()
            .find(|n| n.as_str() == START || n.as_str() == END)
        {
            return Err(GraphError::ReservedName(reserved.clone()));
        }

        let is_source = |name: &str| name == START || self.nodes.contains_key(name);
        let is_target = |name: &str| name == END || self.nodes.contains_key(name);

        for (from, to) in &self.edges {
            if !is_source(from) {
                return Err(GraphError::NodeNotFound(from.clone()));
            }
            if !is_target(to) {
                return Err(GraphError::NodeNotFound(to.clone()));
            }
        }
        for (from, branch) in &self.branches {
            if !is_source(from) {
                return Err(GraphError::NodeNotFound(from.clone()));
            }
            if let Some((_, target)) = branch.path_map.iter().find(|(_, t)| !is_target(t)) {
                return Err(GraphError::NodeNotFound(target.clone()));
            }
        }

        let mut transitions: HashMap<String, Transition<S>> = HashMap::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (from, to) in self.edges {
            if !seen.insert(from.clone()) {
                return Err(GraphError::AmbiguousEdge(from));
            }
            transitions.insert(from, Transition::Direct(to));
        }
        for (from, branch) in self.branches {
            if !seen.insert(from.clone()) {
                return Err(GraphError::AmbiguousEdge(from));
            }
            transitions.insert(from, Transition::Branch(branch));
        }

        if !transitions.contains_key(START) {
            return Err(GraphError::MissingEntryPoint);
        }
        if let Some(dead) = self
            .node_order
            .iter()
            .find(|n| !transitions.contains_key(n.as_str()))
        {
            return Err(GraphError::DeadEnd(dead.clone()));
        }

        log::debug!(
            "Compiled graph with {} nodes: {:?}",
            self.node_order.len(),
            self.node_order
        );

        Ok(CompiledGraph::new(self.nodes, self.node_order, transitions))
    }
}
