// SPDX-License-Identifier: MIT

//! ReWOO: plan every tool call up front, run the workers, then solve.
//!
//! The planner writes lines of the form `Plan: ... #E1 = Tool[input]`. Later
//! inputs may reference earlier evidence by its `#E` name.

use super::rag::search;
use super::{preview, GraphAgent};
use crate::adk::error::{AgentError, Result};
use crate::adk::model::{generate_text, Content, Model};
use crate::adk::prompt::PromptTemplate;
use crate::adk::tool::Tool;
use crate::graph::{node_fn, route_fn, CompiledGraph, GraphState, StateGraph, END};
use crate::tools::search::format_results;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const EXAMPLE_TASK: &str =
    "What was the league ranking last season of the club Lionel Messi played for over the past year?";

const PLANNER_PROMPT: &str = "For the following task, make plans that can solve the problem step by step. For each plan, indicate \
which external tool together with tool input to retrieve evidence. You can store the evidence into a \
variable #E that can be called by later tools. (Plan, #E1, Plan, #E2, Plan, ...)

Tools can be one of the following:
(1) Google[input]: Worker that searches results from Google. Useful when you need to find short
and succinct answers about a specific topic. The input should be a search query.
(2) LLM[input]: A pretrained LLM like yourself. Useful when you need to act with general
world knowledge and common sense. Prioritize it when you are confident in solving the problem
yourself. Input can be any instruction.

For example,
Task: Thomas, Toby, and Rebecca worked a total of 157 hours in one week. Thomas worked x
hours. Toby worked 10 hours less than twice what Thomas worked, and Rebecca worked 8 hours
less than Toby. How many hours did Rebecca work?
Plan: Given Thomas worked x hours, translate the problem into algebraic expressions and solve
with Wolfram Alpha. #E1 = WolframAlpha[Solve x + (2x − 10) + ((2x − 10) − 8) = 157]
Plan: Find out the number of hours Thomas worked. #E2 = LLM[What is x, given #E1]
Plan: Calculate the number of hours Rebecca worked. #E3 = Calculator[(2 ∗ #E2 − 10) − 8]

Begin!
Describe your plans with rich details. Each Plan should be followed by only one #E.

Task: {task}";

const SOLVE_PROMPT: &str = "Solve the following task or problem. To solve the problem, we have made step-by-step Plan and \
retrieved corresponding Evidence to each Plan. Use them with caution since long evidence might \
contain irrelevant information.

{plan}

Now solve the question or task according to provided Evidence above. Respond with the answer
directly with no extra words.

Task: {task}
Response:";

static PLAN_STEP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Plan:\s*(.*?)\s*(#E\d+)\s*=\s*(\w+)\[(.*?)\]").expect("static regex")
});

/// One `Plan: ... #En = Tool[input]` line
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub plan: String,
    pub name: String,
    pub tool: String,
    pub input: String,
}

pub fn parse_plan(text: &str) -> Vec<PlanStep> {
    PLAN_STEP
        .captures_iter(text)
        .map(|c| PlanStep {
            plan: c[1].to_string(),
            name: c[2].to_string(),
            tool: c[3].to_string(),
            input: c[4].to_string(),
        })
        .collect()
}

/// Replace evidence names with their values, longest name first so that
/// `#E1` never clobbers the prefix of `#E10`.
pub fn substitute(text: &str, results: &BTreeMap<String, String>) -> String {
    let mut names: Vec<&String> = results.keys().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    names.into_iter().fold(text.to_string(), |acc, name| {
        acc.replace(name.as_str(), &results[name])
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReWoo {
    pub task: String,
    pub plan_string: String,
    pub steps: Vec<PlanStep>,
    /// Evidence name to worker output
    pub results: BTreeMap<String, String>,
    pub result: String,
}

impl ReWoo {
    /// 0-based index of the next step to run, `None` once all have run
    pub fn current_step(&self) -> Option<usize> {
        (self.results.len() < self.steps.len()).then_some(self.results.len())
    }
}

#[derive(Debug, Default)]
pub struct ReWooUpdate {
    pub plan_string: Option<String>,
    pub steps: Option<Vec<PlanStep>>,
    /// Inserted into `results`
    pub evidence: Option<(String, String)>,
    pub result: Option<String>,
}

impl GraphState for ReWoo {
    type Update = ReWooUpdate;

    fn apply(&mut self, update: ReWooUpdate) {
        if let Some(plan_string) = update.plan_string {
            self.plan_string = plan_string;
        }
        if let Some(steps) = update.steps {
            self.steps = steps;
        }
        if let Some((name, value)) = update.evidence {
            self.results.insert(name, value);
        }
        if let Some(result) = update.result {
            self.result = result;
        }
    }
}

pub fn route(state: &ReWoo) -> String {
    match state.current_step() {
        Some(_) => "tool".to_string(),
        None => "solve".to_string(),
    }
}

pub struct ReWooRecipe {
    model: Arc<dyn Model>,
    search: Arc<dyn Tool>,
    planner: PromptTemplate,
    solver: PromptTemplate,
}

impl ReWooRecipe {
    pub fn new(model: Arc<dyn Model>, search: Arc<dyn Tool>) -> Result<Self> {
        Ok(Self {
            model,
            search,
            planner: PromptTemplate::new(PLANNER_PROMPT)?,
            solver: PromptTemplate::new(SOLVE_PROMPT)?,
        })
    }

    pub async fn plan(&self, task: &str) -> Result<ReWooUpdate> {
        let prompt = self.planner.format(&[("task", task)])?;
        let plan_string =
            generate_text(self.model.as_ref(), &[Content::user(prompt)], None).await?;
        let steps = parse_plan(&plan_string);
        if steps.is_empty() {
            log::warn!("No plan steps found in {:?}", plan_string);
        }
        Ok(ReWooUpdate {
            plan_string: Some(plan_string),
            steps: Some(steps),
            ..Default::default()
        })
    }

    pub async fn run_worker(&self, tool: &str, input: &str) -> Result<String> {
        match tool {
            "Google" => Ok(format_results(&search(self.search.as_ref(), input).await?)),
            "LLM" => generate_text(self.model.as_ref(), &[Content::user(input)], None).await,
            other => Err(AgentError::tool_not_found(other)),
        }
    }

    pub async fn execute_step(&self, state: &ReWoo) -> Result<ReWooUpdate> {
        let Some(index) = state.current_step() else {
            return Ok(ReWooUpdate::default());
        };
        let step = &state.steps[index];
        let input = substitute(&step.input, &state.results);
        log::info!("{} = {}[{}]", step.name, step.tool, input);
        let output = self.run_worker(&step.tool, &input).await?;
        Ok(ReWooUpdate {
            evidence: Some((step.name.clone(), output)),
            ..Default::default()
        })
    }

    pub async fn solve(&self, state: &ReWoo) -> Result<String> {
        let plan = state
            .steps
            .iter()
            .map(|step| {
                format!(
                    "Plan: {}\n{} = {}[{}]",
                    step.plan,
                    substitute(&step.name, &state.results),
                    step.tool,
                    substitute(&step.input, &state.results)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = self
            .solver
            .format(&[("plan", plan.as_str()), ("task", state.task.as_str())])?;
        generate_text(self.model.as_ref(), &[Content::user(prompt)], None).await
    }
}

pub fn build_graph(recipe: Arc<ReWooRecipe>) -> Result<CompiledGraph<ReWoo>> {
    let mut graph = StateGraph::new();

    let r = recipe.clone();
    graph.add_node(
        "plan",
        node_fn(move |state: ReWoo| {
            let r = r.clone();
            async move { r.plan(&state.task).await }
        }),
    );

    let r = recipe.clone();
    graph.add_node(
        "tool",
        node_fn(move |state: ReWoo| {
            let r = r.clone();
            async move { r.execute_step(&state).await }
        }),
    );

    let r = recipe;
    graph.add_node(
        "solve",
        node_fn(move |state: ReWoo| {
            let r = r.clone();
            async move {
                Ok(ReWooUpdate {
                    result: Some(r.solve(&state).await?),
                    ..Default::default()
                })
            }
        }),
    );

    graph
        .set_entry_point("plan")
        .add_edge("plan", "tool")
        .add_conditional_edges("tool", route_fn(route), [("tool", "tool"), ("solve", "solve")])
        .add_edge("solve", END);

    Ok(graph.compile()?)
}

pub fn build(model: Arc<dyn Model>, search: Arc<dyn Tool>) -> Result<GraphAgent<ReWoo>> {
    let recipe = Arc::new(ReWooRecipe::new(model, search)?);
    Ok(GraphAgent::new(
        "rewoo",
        build_graph(recipe)?,
        |task| ReWoo {
            task,
            ..Default::default()
        },
        |state| state.result.clone(),
    )
    .with_describe(|node, state| match node {
        "plan" => format!("{} steps", state.steps.len()),
        "tool" => state
            .steps
            .get(state.results.len().saturating_sub(1))
            .and_then(|step| state.results.get(&step.name).map(|v| (step, v)))
            .map(|(step, value)| format!("{} = {}", step.name, preview(value, 80)))
            .unwrap_or_default(),
        _ => preview(&state.result, 80),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::ScriptedModel;
    use crate::recipes::rag::tests::CannedSearch;

    const PLAN: &str = "Plan: Find Messi's club. #E1 = Google[Messi club 2024]
Plan: Find the club's ranking. #E2 = Google[#E1 league ranking]
Plan: Summarise. #E3 = LLM[What is the ranking, given #E2]";

    #[test]
    fn test_parse_plan() {
        let steps = parse_plan(PLAN);
        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps[1],
            PlanStep {
                plan: "Find the club's ranking.".into(),
                name: "#E2".into(),
                tool: "Google".into(),
                input: "#E1 league ranking".into(),
            }
        );
    }

    #[test]
    fn test_substitute_longest_first() {
        let mut results = BTreeMap::new();
        results.insert("#E1".to_string(), "one".to_string());
        results.insert("#E10".to_string(), "ten".to_string());
        assert_eq!(substitute("#E10 and #E1", &results), "ten and one");
    }

    #[tokio::test]
    async fn test_full_run() {
        let model = Arc::new(ScriptedModel::from_texts([
            PLAN,
            "Inter Miami topped the table.",
            "First.",
        ]));
        let search = Arc::new(CannedSearch::new(&["Inter Miami"]));
        let agent = build(model.clone(), search.clone()).unwrap();

        let state = agent.invoke(EXAMPLE_TASK.to_string()).await.unwrap();
        assert_eq!(state.result, "First.");
        assert_eq!(state.results.len(), 3);
        assert_eq!(search.queries().len(), 2);
        assert_eq!(search.queries()[0], "Messi club 2024");
        assert!(search.queries()[1].contains("Inter Miami"));
        assert!(search.queries()[1].ends_with("league ranking"));

        let calls = model.calls();
        assert!(calls[1][0].text().starts_with("What is the ranking, given **result 0**"));
        let solve_prompt = calls[2][0].text();
        assert!(solve_prompt.contains("Plan: Summarise."));
        assert!(solve_prompt.contains("Inter Miami topped the table. = LLM["));
    }

    #[tokio::test]
    async fn test_empty_plan_goes_straight_to_solve() {
        let model = Arc::new(ScriptedModel::from_texts(["I will just answer.", "42"]));
        let agent = build(model, Arc::new(CannedSearch::new(&[]))).unwrap();
        let state = agent.invoke("q".to_string()).await.unwrap();
        assert!(state.steps.is_empty());
        assert_eq!(state.result, "42");
    }

    #[tokio::test]
    async fn test_unknown_worker_fails() {
        let model = Arc::new(ScriptedModel::from_texts([
            "Plan: compute. #E1 = WolframAlpha[1+1]",
        ]));
        let agent = build(model, Arc::new(CannedSearch::new(&[]))).unwrap();
        let err = agent.invoke("q".to_string()).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound { .. }));
    }
}
