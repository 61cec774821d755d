// SPDX-License-Identifier: MIT

//! Agent development kit: models, tools, prompts and structured output

pub mod agent;
pub mod error;
pub mod model;
pub mod prompt;
pub mod structured;
pub mod tool;
