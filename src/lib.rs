// SPDX-License-Identifier: MIT

//! LangGraph-style agent recipes on a small state-graph runtime
//!
//! - [`graph`]: typed state graphs with routed edges, checkpoints and prebuilt nodes
//! - [`adk`]: models, prompts, tools, structured output and the [`adk::agent::Agent`] trait
//! - [`tools`] and [`retrieval`]: web search, calculator, loaders and a vector store
//! - [`recipes`]: the runnable agents

pub mod adk;
pub mod config;
pub mod graph;
pub mod recipes;
pub mod retrieval;
pub mod tools;
