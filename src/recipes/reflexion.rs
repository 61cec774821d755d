// SPDX-License-Identifier: MIT

//! Reflexion: answer, critique the answer, research the critique, revise
//!
//! The drafter and the reviser reply by calling `AnswerQuestion` /
//! `ReviseAnswer`. Their `search_queries` are run by tools of the same names,
//! so the tool results land right after the call they answer.

use super::rag::search;
use super::{preview, GraphAgent};
use crate::adk::error::Result;
use crate::adk::model::{Content, Model, ROLE_MODEL, ROLE_TOOL};
use crate::adk::prompt::ChatPromptTemplate;
use crate::adk::structured::{Responder, StructuredOutput};
use crate::adk::tool::Tool;
use crate::graph::{
    node_fn, route_fn, CompiledGraph, MessagesState, StateGraph, ToolNode, END,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const EXAMPLE_QUESTION: &str = "Why is reflection useful in AI?";

/// Revisions stop once the trailing run of model/tool messages is longer than this
pub const MAX_ITERATIONS: usize = 5;

const ACTOR_SYSTEM: &str = "You are expert researcher.
Current time: {time}

1. {first_instruction}
2. Reflect and critique your answer. Be severe to maximize improvement.
3. Recommend search queries to research information and improve your answer.";

const ACTOR_REMINDER: &str = "\n\n<reminder>Reflect on the user's original question and the actions taken thus far. Respond using the {function_name} function.</reminder>";

const FIRST_INSTRUCTION: &str = "Provide a detailed ~250 word answer.";

const REVISE_INSTRUCTIONS: &str = r#"Revise your previous answer using the new information.
    - You should use the previous critique to add important information to your answer.
        - You MUST include numerical citations in your revised answer to ensure it can be verified.
        - Add a "References" section to the bottom of your answer (which does not count towards the word limit). In form of:
            - [1] https://example.com
            - [2] https://example.com
    - You should use the previous critique to remove superfluous information from your answer and make SURE it is not more than 250 words."#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Reflection {
    /// Critique of what is missing.
    pub missing: String,
    /// Critique of what is superfluous
    pub superfluous: String,
}

/// Answer the question. Provide an answer, reflection, and then follow up with search queries to improve the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnswerQuestion {
    /// ~250 word detailed answer to the question.
    pub answer: String,
    /// Your reflection on the initial answer.
    pub reflection: Reflection,
    /// 1-3 search queries for researching improvements to address the critique of your current answer.
    pub search_queries: Vec<String>,
}

/// Revise your original answer to your question. Provide an answer, reflection, cite your reflection with references, and finally add search queries to improve the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReviseAnswer {
    /// ~250 word detailed answer to the question.
    pub answer: String,
    /// Your reflection on the initial answer.
    pub reflection: Reflection,
    /// 1-3 search queries for researching improvements to address the critique of your current answer.
    pub search_queries: Vec<String>,
    /// Citations motivating your updated answer.
    pub references: Vec<String>,
}

static RUN_QUERIES_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "search_queries": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["search_queries"]
    })
});

#[derive(Deserialize)]
struct QueryArgs {
    #[serde(default)]
    search_queries: Vec<String>,
}

/// Runs the `search_queries` of an answer one after the other
pub struct RunQueries {
    name: &'static str,
    search: Arc<dyn Tool>,
}

impl RunQueries {
    pub fn new(name: &'static str, search: Arc<dyn Tool>) -> Self {
        Self { name, search }
    }
}

#[async_trait]
impl Tool for RunQueries {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Run the generated queries."
    }

    fn schema(&self) -> &Value {
        &RUN_QUERIES_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: QueryArgs = serde_json::from_value(input)?;
        let mut batches = Vec::with_capacity(args.search_queries.len());
        for query in &args.search_queries {
            let results = search(self.search.as_ref(), query).await?;
            batches.push(serde_json::to_value(results)?);
        }
        Ok(Value::Array(batches))
    }
}

/// Length of the trailing run of model and tool messages
pub fn num_iterations(messages: &[Content]) -> usize {
    messages
        .iter()
        .rev()
        .take_while(|m| m.is_role(ROLE_MODEL) || m.is_role(ROLE_TOOL))
        .count()
}

pub fn event_loop(state: &MessagesState) -> String {
    if num_iterations(&state.messages) > MAX_ITERATIONS {
        END.to_string()
    } else {
        "execute_tools".to_string()
    }
}

/// The reply as a call to the output function. Answers given as plain JSON
/// text are rewritten into a call so the tool node picks them up.
fn as_call<T: Serialize>(name: &str, reply: Content, value: Option<&T>) -> Result<Content> {
    if reply.has_function_calls() {
        return Ok(reply);
    }
    match value {
        Some(value) => Ok(Content::function_call(
            uuid::Uuid::new_v4().to_string(),
            name,
            serde_json::to_value(value)?,
        )),
        None => Ok(reply),
    }
}

/// One of the two actors: the prompt with its instruction and function baked in
pub struct Actor<T> {
    prompt: ChatPromptTemplate,
    responder: Responder<T>,
}

impl<T> Actor<T>
where
    T: JsonSchema + DeserializeOwned + Serialize + Send + Sync,
{
    pub fn new(
        model: Arc<dyn Model>,
        output: StructuredOutput<T>,
        instruction: &str,
    ) -> Result<Self> {
        let prompt = ChatPromptTemplate::new()
            .system(ACTOR_SYSTEM)?
            .messages_placeholder()
            .user(ACTOR_REMINDER)?
            .partial_fn("time", || chrono::Local::now().to_rfc3339())
            .partial("first_instruction", instruction)
            .partial("function_name", output.name());
        Ok(Self {
            prompt,
            responder: Responder::new(model, output),
        })
    }

    pub async fn respond(&self, messages: &[Content]) -> Result<Content> {
        let history = self.prompt.render(&[], messages)?;
        let response = self.responder.respond(&history).await?;
        as_call(
            self.responder.output().name(),
            response.reply,
            response.value.as_ref(),
        )
    }
}

pub fn build_graph(
    model: Arc<dyn Model>,
    search: Arc<dyn Tool>,
) -> Result<CompiledGraph<MessagesState>> {
    let drafter = Arc::new(Actor::new(
        model.clone(),
        StructuredOutput::<AnswerQuestion>::new(
            "AnswerQuestion",
            "Answer the question. Provide an answer, reflection, and then follow up with search queries to improve the answer.",
        ),
        FIRST_INSTRUCTION,
    )?);
    let reviser = Arc::new(Actor::new(
        model,
        StructuredOutput::<ReviseAnswer>::new(
            "ReviseAnswer",
            "Revise your original answer to your question. Provide an answer, reflection, cite your reflection with references, and finally add search queries to improve the answer.",
        ),
        REVISE_INSTRUCTIONS,
    )?);
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(RunQueries::new("AnswerQuestion", search.clone())),
        Arc::new(RunQueries::new("ReviseAnswer", search)),
    ];

    let mut graph = StateGraph::new();
    graph
        .add_node(
            "draft",
            node_fn(move |state: MessagesState| {
                let drafter = drafter.clone();
                async move { Ok(vec![drafter.respond(&state.messages).await?]) }
            }),
        )
        .add_node("execute_tools", Arc::new(ToolNode::new(tools)))
        .add_node(
            "revise",
            node_fn(move |state: MessagesState| {
                let reviser = reviser.clone();
                async move { Ok(vec![reviser.respond(&state.messages).await?]) }
            }),
        )
        .set_entry_point("draft")
        .add_edge("draft", "execute_tools")
        .add_edge("execute_tools", "revise")
        .add_conditional_edges(
            "revise",
            route_fn(event_loop),
            [("execute_tools", "execute_tools"), (END, END)],
        );
    Ok(graph.compile()?)
}

/// The latest answer with its references, or the last text if no answer
/// call was ever made.
pub fn final_answer(state: &MessagesState) -> String {
    let latest = state.messages.iter().rev().find_map(|m| {
        m.function_calls()
            .into_iter()
            .find(|(_, name, _)| *name == "ReviseAnswer" || *name == "AnswerQuestion")
            .map(|(_, _, args)| args.clone())
    });

    let Some(args) = latest else {
        return state.last_text();
    };
    let answer = args["answer"].as_str().unwrap_or_default().to_string();
    let references: Vec<&str> = args["references"]
        .as_array()
        .map(|refs| refs.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if references.is_empty() || answer.contains("References") {
        answer
    } else {
        let refs = references
            .iter()
            .map(|r| format!("- {}", r))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}\n\nReferences:\n{}", answer, refs)
    }
}

pub fn build(model: Arc<dyn Model>, search: Arc<dyn Tool>) -> Result<GraphAgent<MessagesState>> {
    Ok(GraphAgent::new(
        "reflexion",
        build_graph(model, search)?,
        MessagesState::from_user,
        final_answer,
    )
    .with_describe(|node, state| {
        let last = state.last_message();
        match node {
            "execute_tools" => format!(
                "{} search batches",
                state
                    .messages
                    .iter()
                    .rev()
                    .take_while(|m| m.is_role(ROLE_TOOL))
                    .count()
            ),
            _ => last
                .and_then(|m| m.function_calls().first().map(|(_, _, a)| a["answer"].clone()))
                .and_then(|a| a.as_str().map(|s| preview(s, 80)))
                .unwrap_or_else(|| preview(&state.last_text(), 80)),
        }
    }))
}
