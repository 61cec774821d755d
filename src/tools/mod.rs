// SPDX-License-Identifier: MIT

//! Tools available to recipes: web search, calculator and a shared registry

pub mod arithmetic;
pub mod registry;
pub mod search;

pub use registry::ToolRegistry;
pub use search::{
    engine_from_settings, BraveSearch, SearchResult, SerperSearch, TavilySearch, WebSearchEngine,
    WebSearchTool,
};
