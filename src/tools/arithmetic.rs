// SPDX-License-Identifier: MIT

//! Calculator tools: `add`, `multiply`, `divide`

use crate::adk::error::{AgentError, Result};
use crate::adk::tool::Tool;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

static BINARY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "a": {"type": "number", "description": "first number"},
            "b": {"type": "number", "description": "second number"}
        },
        "required": ["a", "b"]
    })
});

#[derive(Debug, Deserialize)]
struct BinaryArgs {
    a: f64,
    b: f64,
}

/// Accepts `{"a": x, "b": y}` or the positional form `[x, y]`
fn parse_args(input: Value) -> Result<BinaryArgs> {
    match input {
        Value::Array(items) if items.len() == 2 => {
            let num = |v: &Value| {
                v.as_f64()
                    .ok_or_else(|| AgentError::validation(format!("'{}' is not a number", v)))
            };
            Ok(BinaryArgs {
                a: num(&items[0])?,
                b: num(&items[1])?,
            })
        }
        other => Ok(serde_json::from_value(other)?),
    }
}

/// A tool applying a binary operation to two numbers
pub struct BinaryOpTool {
    name: &'static str,
    description: &'static str,
    op: fn(f64, f64) -> Result<f64>,
}

impl BinaryOpTool {
    pub fn apply(&self, a: f64, b: f64) -> Result<f64> {
        (self.op)(a, b)
    }
}

#[async_trait]
impl Tool for BinaryOpTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn schema(&self) -> &Value {
        &BINARY_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args = parse_args(input)?;
        let result = self.apply(args.a, args.b)?;
        log::debug!("{}({}, {}) = {}", self.name, args.a, args.b, result);
        Ok(json!(result))
    }
}

pub fn add() -> BinaryOpTool {
    BinaryOpTool {
        name: "add",
        description: "Adds a and b.",
        op: |a, b| Ok(a + b),
    }
}

pub fn multiply() -> BinaryOpTool {
    BinaryOpTool {
        name: "multiply",
        description: "Multiply a and b.",
        op: |a, b| Ok(a * b),
    }
}

pub fn divide() -> BinaryOpTool {
    BinaryOpTool {
        name: "divide",
        description: "Divide a by b.",
        op: |a, b| {
            if b == 0.0 {
                Err(AgentError::validation("division by zero"))
            } else {
                Ok(a / b)
            }
        },
    }
}

/// `add`, `multiply` and `divide`
pub fn calculator_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(add()), Arc::new(multiply()), Arc::new(divide())]
}
