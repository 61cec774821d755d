// SPDX-License-Identifier: MIT

//! State-graph runtime
//!
//! A small finite-state machine over a typed state: nodes produce updates,
//! edges (fixed or routed by inspecting the state) pick the next node, and a
//! recursion limit bounds every run.
//!
//! ```ignore
//! let mut graph = StateGraph::new();
//! graph
//!     .add_node("agent", agent_node)
//!     .add_node("tools", Arc::new(ToolNode::new(tools)))
//!     .add_edge(START, "agent")
//!     .add_conditional_edges("agent", route_fn(tools_condition), [("tools", "tools"), (END, END)])
//!     .add_edge("tools", "agent");
//! let app = graph.compile()?;
//! let state = app.invoke(MessagesState::from_user("what is 3 * 12?")).await?;
//! ```

pub mod checkpoint;
pub mod compiled;
pub mod node;
pub mod prebuilt;
pub mod state_graph;

pub use checkpoint::{Checkpointer, MemorySaver};
pub use compiled::{CompiledGraph, GraphEvent, DEFAULT_RECURSION_LIMIT};
pub use node::{async_route_fn, node_fn, route_fn, GraphState, Node, Router};
pub use prebuilt::{create_react_agent, tools_condition, MessagesState, ToolNode};
pub use state_graph::StateGraph;

/// Virtual node every run starts from
pub const START: &str = "__start__";
/// Virtual node that terminates a run
pub const END: &str = "__end__";
