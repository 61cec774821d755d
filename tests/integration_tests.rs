// SPDX-License-Identifier: MIT

//! Integration tests for the recipes
//!
//! Every recipe graph is driven end-to-end with a scripted model and mock
//! tools; the streamed step events show which edges were taken.

use async_trait::async_trait;
use hello_langgraph::adk::agent::{Agent, AgentEvent};
use hello_langgraph::adk::error::{AgentError, GraphError, Result};
use hello_langgraph::adk::model::{Content, GenerationConfig, Model, Part};
use hello_langgraph::adk::tool::Tool;
use hello_langgraph::config::Settings;
use hello_langgraph::recipes::{
    adaptive_rag, crag, plan_execute, reflection, reflexion, rewoo, Recipe, RecipeFactory,
};
use hello_langgraph::retrieval::{Document, Retriever};
use hello_langgraph::tools::arithmetic::calculator_tools;
use hello_langgraph::tools::{SearchResult, ToolRegistry};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// ============================================================================
// Mock Components
// ============================================================================

/// Mock model that returns predefined responses in order
struct MockModel {
    responses: Vec<Content>,
    response_index: AtomicUsize,
}

impl MockModel {
    fn new(responses: Vec<Content>) -> Self {
        Self {
            responses,
            response_index: AtomicUsize::new(0),
        }
    }

    fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Content::model(*t)).collect())
    }

    fn calls(&self) -> usize {
        self.response_index.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Model for MockModel {
    async fn generate_content(
        &self,
        _history: &[Content],
        _config: Option<&GenerationConfig>,
        _tools: Option<&[Arc<dyn Tool>]>,
    ) -> Result<Content> {
        let idx = self.response_index.fetch_add(1, Ordering::SeqCst);
        if idx < self.responses.len() {
            Ok(self.responses[idx].clone())
        } else {
            Ok(Content::model("Max responses reached"))
        }
    }
}

static QUERY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string"}
        },
        "required": ["query"]
    })
});

/// Mock web search returning one result per query
struct MockSearch {
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    fn new() -> Self {
        Self {
            queries: Mutex::new(Vec::new()),
        }
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for MockSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Mock tool: web_search"
    }

    fn schema(&self) -> &Value {
        &QUERY_SCHEMA
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let query = input["query"].as_str().unwrap_or_default().to_string();
        self.queries.lock().unwrap().push(query.clone());
        let results = vec![SearchResult {
            title: "Mock".to_string(),
            url: "https://example.com/mock".to_string(),
            content: format!("web result for {}", query),
            score: Some(0.9),
        }];
        Ok(serde_json::to_value(results)?)
    }
}

/// Retriever answering every query with the same documents
struct FixedRetriever(Vec<Document>);

#[async_trait]
impl Retriever for FixedRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<Document>> {
        Ok(self.0.clone())
    }
}

fn memory_docs() -> Arc<dyn Retriever> {
    Arc::new(FixedRetriever(vec![
        Document::new("Agent memory: short-term and long-term.").with_metadata("source", "agent.md"),
    ]))
}

/// Run `agent`, returning the visited nodes and the answer
async fn run_steps(agent: &dyn Agent, input: &str) -> (Vec<String>, Result<String>) {
    let (tx, mut rx) = mpsc::channel(64);
    let collect = async {
        let mut nodes = Vec::new();
        while let Some(event) = rx.recv().await {
            if let AgentEvent::Step { node, .. } = event {
                nodes.push(node);
            }
        }
        nodes
    };
    let (answer, nodes) = tokio::join!(agent.run_stream(input.to_string(), tx), collect);
    (nodes, answer)
}

async fn factory(model: Arc<dyn Model>) -> RecipeFactory {
    let registry = ToolRegistry::new();
    registry.register_all(calculator_tools()).await;
    registry.register(Arc::new(MockSearch::new())).await;
    RecipeFactory::new(Settings::default(), model, registry)
}

// ============================================================================
// Retrieval Recipes
// ============================================================================

#[tokio::test]
async fn test_crag_relevant_documents_skip_web_search() {
    let model = Arc::new(MockModel::texts(&[r#"{"score": "yes"}"#, "Short and long term."]));
    let search = Arc::new(MockSearch::new());
    let agent = crag::build(model, memory_docs(), search.clone()).unwrap();

    let (nodes, answer) = run_steps(&agent, crag::EXAMPLE_QUESTION).await;
    assert_eq!(nodes, vec!["retrieve", "grade_documents", "generate"]);
    assert_eq!(answer.unwrap(), "Short and long term.");
    assert!(search.queries().is_empty());
}

#[tokio::test]
async fn test_crag_irrelevant_document_goes_to_web() {
    let model = Arc::new(MockModel::texts(&[
        r#"{"score": "no"}"#,
        "types of memory in LLM agents",
        "From the web.",
    ]));
    let search = Arc::new(MockSearch::new());
    let agent = crag::build(model, memory_docs(), search.clone()).unwrap();

    let (nodes, answer) = run_steps(&agent, crag::EXAMPLE_QUESTION).await;
    assert_eq!(
        nodes,
        vec![
            "retrieve",
            "grade_documents",
            "transform_query",
            "web_search_node",
            "generate"
        ]
    );
    assert_eq!(answer.unwrap(), "From the web.");
    assert_eq!(search.queries(), vec!["types of memory in LLM agents"]);
}

#[tokio::test]
async fn test_adaptive_rag_routes_to_web() {
    let model = Arc::new(MockModel::texts(&[
        r#"{"datasource": "web_search"}"#,
        "Bears won.",
        r#"{"score": "yes"}"#,
        r#"{"score": "yes"}"#,
    ]));
    let search = Arc::new(MockSearch::new());
    let agent = adaptive_rag::build(model, memory_docs(), search.clone()).unwrap();

    let (nodes, answer) = run_steps(&agent, "Who won the game last night?").await;
    assert_eq!(nodes, vec!["web_search", "generate"]);
    assert_eq!(answer.unwrap(), "Bears won.");
    assert_eq!(search.queries().len(), 1);
}

#[tokio::test]
async fn test_adaptive_rag_regenerates_unsupported_answer() {
    let model = Arc::new(MockModel::texts(&[
        r#"{"datasource": "vectorstore"}"#,
        r#"{"score": "yes"}"#,
        "made up",
        r#"{"score": "no"}"#,
        "grounded",
        r#"{"score": "yes"}"#,
        r#"{"score": "yes"}"#,
    ]));
    let agent = adaptive_rag::build(model.clone(), memory_docs(), Arc::new(MockSearch::new()))
        .unwrap();

    let (nodes, answer) = run_steps(&agent, adaptive_rag::EXAMPLE_QUESTION).await;
    assert_eq!(nodes, vec!["retrieve", "grade_documents", "generate", "generate"]);
    assert_eq!(answer.unwrap(), "grounded");
    assert_eq!(model.calls(), 7);
}

// ============================================================================
// Planning and Reflection Recipes
// ============================================================================

#[tokio::test]
async fn test_reflexion_loop_is_bounded() {
    let answer = |id: &str, name: &str, text: &str| {
        Content::function_call(
            id,
            name,
            json!({
                "answer": text,
                "reflection": {"missing": "m", "superfluous": "s"},
                "search_queries": [format!("query {}", id)],
                "references": ["https://example.com/ref"]
            }),
        )
    };
    let model = Arc::new(MockModel::new(vec![
        answer("1", "AnswerQuestion", "draft"),
        answer("2", "ReviseAnswer", "revision 1"),
        answer("3", "ReviseAnswer", "revision 2"),
        answer("4", "ReviseAnswer", "revision 3"),
    ]));
    let search = Arc::new(MockSearch::new());
    let agent = reflexion::build(model.clone(), search.clone()).unwrap();

    let (nodes, answer) = run_steps(&agent, reflexion::EXAMPLE_QUESTION).await;
    assert_eq!(
        nodes,
        vec![
            "draft",
            "execute_tools",
            "revise",
            "execute_tools",
            "revise",
            "execute_tools",
            "revise"
        ]
    );
    let answer = answer.unwrap();
    assert!(answer.starts_with("revision 3"));
    assert!(answer.contains("https://example.com/ref"));
    assert_eq!(search.queries(), vec!["query 1", "query 2", "query 3"]);
    assert_eq!(model.calls(), 4);
}

#[tokio::test]
async fn test_plan_execute_replans_then_responds() {
    let model = Arc::new(MockModel::new(vec![
        Content::function_call("p", "Plan", json!({"steps": ["find the captain", "find the club"]})),
        Content::model("Messi"),
        Content::function_call("a1", "Act", json!({"action": {"steps": ["find the club"]}})),
        Content::function_call("s1", "web_search", json!({"query": "Messi club"})),
        Content::model("Inter Miami"),
        Content::function_call("a2", "Act", json!({"action": {"response": "Inter Miami"}})),
    ]));
    let search = Arc::new(MockSearch::new());
    let agent = plan_execute::build(model, vec![search.clone() as Arc<dyn Tool>]).unwrap();

    let (nodes, answer) = run_steps(&agent, plan_execute::EXAMPLE_OBJECTIVE).await;
    assert_eq!(
        nodes,
        vec![
            "plan_node",
            "execute_node",
            "replan_node",
            "execute_node",
            "replan_node"
        ]
    );
    assert_eq!(answer.unwrap(), "Inter Miami");
    assert_eq!(search.queries(), vec!["Messi club"]);
}

#[tokio::test]
async fn test_rewoo_runs_every_planned_worker() {
    let model = Arc::new(MockModel::texts(&[
        "Plan: Search for the club. #E1 = Google[Messi club]\nPlan: Extract the name. #E2 = LLM[Name the club in #E1]",
        "Inter Miami",
        "Inter Miami",
    ]));
    let search = Arc::new(MockSearch::new());
    let agent = rewoo::build(model, search.clone()).unwrap();

    let (nodes, answer) = run_steps(&agent, rewoo::EXAMPLE_TASK).await;
    assert_eq!(nodes, vec!["plan", "tool", "tool", "solve"]);
    assert_eq!(answer.unwrap(), "Inter Miami");
    assert_eq!(search.queries(), vec!["Messi club"]);
}

#[tokio::test]
async fn test_reflection_rounds() {
    let model = Arc::new(MockModel::texts(&["v1", "too short", "v2"]));
    let agent = reflection::build(model, 2).unwrap();

    let (nodes, answer) = run_steps(&agent, reflection::EXAMPLE_TASK).await;
    assert_eq!(nodes, vec!["generate", "reflect", "generate"]);
    assert_eq!(answer.unwrap(), "v2");
}

// ============================================================================
// Factory-built Recipes
// ============================================================================

#[tokio::test]
async fn test_factory_builds_every_recipe() {
    let factory = factory(Arc::new(MockModel::new(Vec::new()))).await;
    for recipe in Recipe::ALL {
        let agent = factory.build(recipe).await.unwrap();
        assert_eq!(agent.name(), recipe.name());
        let has_graph = agent.mermaid().is_some();
        assert_eq!(
            has_graph,
            !matches!(recipe, Recipe::StructuredOutput | Recipe::LocalRetriever),
            "{}",
            recipe
        );
    }
}

#[tokio::test]
async fn test_react_calculator_through_factory() {
    let model = Arc::new(MockModel::new(vec![
        Content::function_call("c1", "add", json!({"a": 2, "b": 3})),
        Content::function_call("c2", "multiply", json!({"a": 5, "b": 5})),
        Content::function_call("c3", "divide", json!({"a": 25, "b": 2})),
        Content::model("12.5"),
    ]));
    let agent = factory(model).await.build(Recipe::React).await.unwrap();

    let (nodes, answer) = run_steps(agent.as_ref(), Recipe::React.example_input()).await;
    assert_eq!(
        nodes,
        vec!["reasoner", "tools", "reasoner", "tools", "reasoner", "tools", "reasoner"]
    );
    assert_eq!(answer.unwrap(), "12.5");
}

#[tokio::test]
async fn test_search_agent_through_factory() {
    let model = Arc::new(MockModel::new(vec![
        Content::function_call("s1", "web_search", json!({"query": "Messi club"})),
        Content::model("Inter Miami"),
    ]));
    let agent = factory(model).await.build(Recipe::SearchAgent).await.unwrap();

    let (nodes, answer) = run_steps(agent.as_ref(), Recipe::SearchAgent.example_input()).await;
    assert_eq!(nodes, vec!["agent", "tools", "agent"]);
    assert_eq!(answer.unwrap(), "Inter Miami");
}

#[tokio::test]
async fn test_structured_output_through_factory() {
    let model = Arc::new(MockModel::new(vec![Content::function_call(
        "b1",
        "BizAction",
        json!({"scenario": "vehicle_control", "action": "open"}),
    )]));
    let agent = factory(model).await.build(Recipe::StructuredOutput).await.unwrap();

    let out = agent.run("Open the windows".to_string()).await.unwrap();
    assert_eq!(
        out,
        "1. Question:Open the windows, Action: scenario=vehicle_control action=open"
    );
}

#[tokio::test]
async fn test_chatbot_keeps_thread_between_runs() {
    let model = Arc::new(MockModel::new(vec![
        Content::model("What is the objective?"),
        Content::function_call(
            "c1",
            "PromptInstructions",
            json!({
                "objective": "answer questions",
                "variables": ["question"],
                "constraints": [],
                "requirements": ["be brief"]
            }),
        ),
        Content::model("Answer {question} briefly."),
    ]));
    let agent = factory(model).await.build(Recipe::Chatbot).await.unwrap();

    assert_eq!(agent.run("hi!".to_string()).await.unwrap(), "What is the objective?");
    assert_eq!(
        agent.run("answer questions briefly".to_string()).await.unwrap(),
        "Answer {question} briefly."
    );
}

// ============================================================================
// Limits
// ============================================================================

#[tokio::test]
async fn test_endless_tool_calls_hit_recursion_limit() {
    let call = Content {
        role: "model".to_string(),
        parts: vec![Part::FunctionCall {
            id: Some("loop".to_string()),
            name: "add".to_string(),
            args: json!({"a": 1, "b": 1}),
        }],
    };
    let model = Arc::new(MockModel::new(vec![call; 100]));
    let agent = factory(model).await.build(Recipe::React).await.unwrap();

    let err = agent.run("1 + 1 forever".to_string()).await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::Graph(GraphError::RecursionLimit(25))
    ));
}
