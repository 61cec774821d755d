// SPDX-License-Identifier: MIT

//! Plan-and-execute
//!
//! A planner writes the whole plan up front, a search-enabled ReAct agent
//! executes its first step, and a replanner either answers or trims the plan.

use super::{preview, GraphAgent};
use crate::adk::error::Result;
use crate::adk::model::{Content, Model};
use crate::adk::prompt::{ChatPromptTemplate, PromptTemplate};
use crate::adk::structured::{Responder, StructuredOutput};
use crate::adk::tool::Tool;
use crate::graph::{
    create_react_agent, node_fn, route_fn, CompiledGraph, GraphState, MessagesState, StateGraph,
    END,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const EXAMPLE_OBJECTIVE: &str = "What is the league ranking of the club that the captain of the most recent World Cup winning team played for over the past year?";

pub const RECURSION_LIMIT: u32 = 100;

const EXECUTOR_PROMPT: &str = "You are a helpful assistant.";

const PLANNER_PROMPT: &str = "For the given objective, come up with a simple step by step plan. \
This plan should involve individual tasks, that if executed correctly will yield the correct answer. Do not add any superfluous steps. \
The result of the final step should be the final answer. Make sure that each step has all the information needed - do not skip steps.";

const REPLANNER_PROMPT: &str = "For the given objective, come up with a simple step by step plan. \
This plan should involve individual tasks, that if executed correctly will yield the correct answer. Do not add any superfluous steps. \
The result of the final step should be the final answer. Make sure that each step has all the information needed - do not skip steps.

Your objective was this:
{input}

Your original plan was this:
{plan}

You have currently done the follow steps:
{past_steps}

Update your plan accordingly. If no more steps are needed and you can return to the user, then respond with that. Otherwise, fill out the plan. Only add steps to the plan that still NEED to be done. Do not return previously done steps as part of the plan.";

/// Plan to follow in future
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// different steps to follow, should be in sorted order
    pub steps: Vec<String>,
}

/// Response to user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Response {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Action {
    Respond(Response),
    Replan(Plan),
}

/// Action to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Act {
    /// Action to perform. If you want to respond to user, use Response. If you need to further use tools to get the answer, use Plan.
    pub action: Action,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanExecute {
    pub input: String,
    pub plan: Vec<String>,
    /// `(task, result)` in execution order
    pub past_steps: Vec<(String, String)>,
    pub response: Option<String>,
}

/// `plan` and `response` overwrite, `past_steps` appends
#[derive(Debug, Default)]
pub struct PlanExecuteUpdate {
    pub plan: Option<Vec<String>>,
    pub past_steps: Vec<(String, String)>,
    pub response: Option<String>,
}

impl GraphState for PlanExecute {
    type Update = PlanExecuteUpdate;

    fn apply(&mut self, update: PlanExecuteUpdate) {
        if let Some(plan) = update.plan {
            self.plan = plan;
        }
        self.past_steps.extend(update.past_steps);
        if let Some(response) = update.response {
            self.response = Some(response);
        }
    }
}

pub fn numbered(plan: &[String]) -> String {
    plan.iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_past_steps(past_steps: &[(String, String)]) -> String {
    past_steps
        .iter()
        .map(|(task, result)| format!("Task: {}\nResult: {}", task, result))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn should_end(state: &PlanExecute) -> String {
    match state.response.as_deref() {
        Some(response) if !response.is_empty() => END.to_string(),
        _ => "execute_node".to_string(),
    }
}

pub struct PlanAndExecute {
    planner: Responder<Plan>,
    planner_prompt: ChatPromptTemplate,
    replanner: Responder<Act>,
    replanner_prompt: PromptTemplate,
    executor: CompiledGraph<MessagesState>,
}

impl PlanAndExecute {
    pub fn new(model: Arc<dyn Model>, tools: Vec<Arc<dyn Tool>>) -> Result<Self> {
        let executor = create_react_agent(model.clone(), tools, Some(EXECUTOR_PROMPT.to_string()))?;
        Ok(Self {
            planner: Responder::new(
                model.clone(),
                StructuredOutput::new("Plan", "Plan to follow in future"),
            ),
            planner_prompt: ChatPromptTemplate::new()
                .system(PLANNER_PROMPT)?
                .messages_placeholder(),
            replanner: Responder::new(model, StructuredOutput::new("Act", "Action to perform.")),
            replanner_prompt: PromptTemplate::new(REPLANNER_PROMPT)?,
            executor,
        })
    }

    pub async fn plan(&self, objective: &str) -> Result<Vec<String>> {
        let history = self
            .planner_prompt
            .render(&[], &[Content::user(objective)])?;
        let response = self.planner.respond(&history).await?;
        match response.value {
            Some(plan) => Ok(plan.steps),
            None => {
                log::warn!("Planner produced no usable plan");
                Ok(Vec::new())
            }
        }
    }

    /// Run the first step of `plan`; failures are recorded as the step result
    pub async fn execute_step(&self, plan: &[String]) -> (String, String) {
        let Some(task) = plan.first() else {
            return ("No task".to_string(), "Error: Plan is empty".to_string());
        };
        let prompt = format!(
            "For the following plan:\n{}\n\nYou are tasked with executing step 1, {}.",
            numbered(plan),
            task
        );
        match self.executor.invoke(MessagesState::from_user(prompt)).await {
            Ok(state) => (task.clone(), state.last_text()),
            Err(e) => {
                log::error!("Error executing step: {}", e);
                (task.clone(), format!("Error: {}", e))
            }
        }
    }

    pub async fn replan(&self, state: &PlanExecute) -> Result<PlanExecuteUpdate> {
        let plan = numbered(&state.plan);
        let past_steps = format_past_steps(&state.past_steps);
        let prompt = self.replanner_prompt.format(&[
            ("input", state.input.as_str()),
            ("plan", plan.as_str()),
            ("past_steps", past_steps.as_str()),
        ])?;
        let response = self.replanner.respond(&[Content::user(prompt)]).await?;

        Ok(match response.value {
            Some(Act {
                action: Action::Respond(Response { response }),
            }) => PlanExecuteUpdate {
                response: Some(response),
                ..Default::default()
            },
            Some(Act {
                action: Action::Replan(Plan { steps }),
            }) => PlanExecuteUpdate {
                plan: Some(steps),
                ..Default::default()
            },
            None => PlanExecuteUpdate {
                response: Some("Error: replanner returned None".to_string()),
                ..Default::default()
            },
        })
    }
}

pub fn build_graph(recipe: Arc<PlanAndExecute>) -> Result<CompiledGraph<PlanExecute>> {
    let mut graph = StateGraph::new();

    let r = recipe.clone();
    graph.add_node(
        "plan_node",
        node_fn(move |state: PlanExecute| {
            let r = r.clone();
            async move {
                log::info!("---PLAN---");
                Ok(PlanExecuteUpdate {
                    plan: Some(r.plan(&state.input).await?),
                    ..Default::default()
                })
            }
        }),
    );

    let r = recipe.clone();
    graph.add_node(
        "execute_node",
        node_fn(move |state: PlanExecute| {
            let r = r.clone();
            async move {
                log::info!("---EXECUTE---");
                Ok(PlanExecuteUpdate {
                    past_steps: vec![r.execute_step(&state.plan).await],
                    ..Default::default()
                })
            }
        }),
    );

    let r = recipe;
    graph.add_node(
        "replan_node",
        node_fn(move |state: PlanExecute| {
            let r = r.clone();
            async move {
                log::info!("---REPLAN---");
                r.replan(&state).await
            }
        }),
    );

    graph
        .set_entry_point("plan_node")
        .add_edge("plan_node", "execute_node")
        .add_edge("execute_node", "replan_node")
        .add_conditional_edges(
            "replan_node",
            route_fn(should_end),
            [("execute_node", "execute_node"), (END, END)],
        );

    Ok(graph.compile()?.with_recursion_limit(RECURSION_LIMIT))
}

pub fn build(model: Arc<dyn Model>, tools: Vec<Arc<dyn Tool>>) -> Result<GraphAgent<PlanExecute>> {
    let recipe = Arc::new(PlanAndExecute::new(model, tools)?);
    Ok(GraphAgent::new(
        "plan-execute",
        build_graph(recipe)?,
        |input| PlanExecute {
            input,
            ..Default::default()
        },
        |state| state.response.clone().unwrap_or_default(),
    )
    .with_describe(|node, state| match node {
        "plan_node" => format!("plan:\n{}", numbered(&state.plan)),
        "execute_node" => state
            .past_steps
            .last()
            .map(|(task, result)| format!("{} => {}", task, preview(result, 80)))
            .unwrap_or_default(),
        _ => match &state.response {
            Some(response) => format!("response: {}", preview(response, 80)),
            None => format!("{} steps left", state.plan.len()),
        },
    }))
}
