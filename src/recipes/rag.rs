// SPDX-License-Identifier: MIT

//! Model calls shared by the retrieval-augmented recipes: document grading,
//! question rewriting, answer generation and the web search fallback.

use crate::adk::error::Result;
use crate::adk::model::{generate_text, Content, GenerationConfig, Model};
use crate::adk::prompt::PromptTemplate;
use crate::adk::structured::parse_json_text;
use crate::adk::tool::Tool;
use crate::retrieval::{format_docs, Document};
use crate::tools::SearchResult;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const RETRIEVAL_GRADER_PROMPT: &str = "You are a grader assessing relevance of a retrieved document to a user question. \n
Here is the retrieved document: \n\n {document} \n\n
Here is the user question: {question} \n
If the document contains keywords related to the user question, grade it as relevant. \n
It does not need to be a stringent test. The goal is to filter out erroneous retrievals. \n
Give a binary score 'yes' or 'no' score to indicate whether the document is relevant to the question. \n
Provide the binary score as a JSON with a single key 'score' and no premable or explanation.";

const REWRITE_PROMPT: &str = "You a question re-writer that converts an input question to a better version that is optimized \n
for vectorstore retrieval. Look at the initial and formulate an improved question. \n
Here is the initial question: \n\n {question}. Improved question with no preamble: \n ";

const RAG_PROMPT: &str = "You are an assistant for question-answering tasks. Use the following pieces of retrieved context to answer the question. If you don't know the answer, just say that you don't know. Use three sentences maximum and keep the answer concise.
Question: {question}
Context: {context}
Answer:";

/// Source tag of documents built from web search results
pub const WEB_SOURCE: &str = "web_search";

const NO_RESULTS: &str = "No valid results found.";

/// `{"score": "yes" | "no"}`, also accepted under the `binary_score` key
#[derive(Debug, Deserialize)]
struct BinaryScore {
    #[serde(alias = "binary_score", alias = "binaryScore")]
    score: String,
}

/// Read a yes/no grade out of model text; anything unparsable is a "no"
pub fn parse_grade(text: &str) -> bool {
    match parse_json_text::<BinaryScore>(text) {
        Ok(grade) => grade.score.trim().eq_ignore_ascii_case("yes"),
        Err(e) => {
            log::warn!("Unparsable grade {:?}: {}", text, e);
            false
        }
    }
}

/// Run a search tool and decode its JSON results
pub async fn search(tool: &dyn Tool, query: &str) -> Result<Vec<SearchResult>> {
    let value = tool.execute(json!({ "query": query })).await?;
    Ok(serde_json::from_value(value)?)
}

pub struct RagToolkit {
    model: Arc<dyn Model>,
    search: Arc<dyn Tool>,
    grader: PromptTemplate,
    rewriter: PromptTemplate,
    generator: PromptTemplate,
}

impl RagToolkit {
    pub fn new(model: Arc<dyn Model>, search: Arc<dyn Tool>) -> Result<Self> {
        Ok(Self {
            model,
            search,
            grader: PromptTemplate::new(RETRIEVAL_GRADER_PROMPT)?,
            rewriter: PromptTemplate::new(REWRITE_PROMPT)?,
            generator: PromptTemplate::new(RAG_PROMPT)?,
        })
    }

    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    /// Ask the model for a JSON yes/no verdict on `prompt`
    pub async fn yes_no(&self, system: Option<&str>, prompt: &str) -> Result<bool> {
        let mut history = Vec::with_capacity(2);
        if let Some(system) = system {
            history.push(Content::system(system));
        }
        history.push(Content::user(prompt));

        let config = GenerationConfig::deterministic().with_json_mode();
        let text = generate_text(self.model.as_ref(), &history, Some(&config)).await?;
        Ok(parse_grade(&text))
    }

    pub async fn is_relevant(&self, question: &str, document: &Document) -> Result<bool> {
        let prompt = self.grader.format(&[
            ("document", document.page_content.as_str()),
            ("question", question),
        ])?;
        self.yes_no(None, &prompt).await
    }

    /// Keep the relevant documents; the flag is set when any was dropped
    pub async fn grade_documents(
        &self,
        question: &str,
        documents: &[Document],
    ) -> Result<(Vec<Document>, bool)> {
        let mut relevant = Vec::with_capacity(documents.len());
        let mut dropped = false;
        for doc in documents {
            if self.is_relevant(question, doc).await? {
                log::info!("Grade: document relevant");
                relevant.push(doc.clone());
            } else {
                log::info!("Grade: document not relevant");
                dropped = true;
            }
        }
        Ok((relevant, dropped))
    }

    pub async fn rewrite_question(&self, question: &str) -> Result<String> {
        let prompt = self.rewriter.format(&[("question", question)])?;
        let better =
            generate_text(self.model.as_ref(), &[Content::user(prompt)], None).await?;
        let better = better.trim();
        if better.is_empty() {
            log::warn!("Rewriter returned nothing, keeping the question");
            return Ok(question.to_string());
        }
        log::info!("Rewrote question: {}", better);
        Ok(better.to_string())
    }

    pub async fn generate(&self, question: &str, documents: &[Document]) -> Result<String> {
        let context = format_docs(documents);
        let prompt = self
            .generator
            .format(&[("question", question), ("context", context.as_str())])?;
        generate_text(self.model.as_ref(), &[Content::user(prompt)], None).await
    }

    /// All result contents joined into one document. A failed search yields
    /// a placeholder document instead of an error.
    pub async fn web_search(&self, question: &str) -> Document {
        let content = match search(self.search.as_ref(), question).await {
            Ok(results) if !results.is_empty() => results
                .iter()
                .map(|r| r.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            Ok(_) => NO_RESULTS.to_string(),
            Err(e) => {
                log::warn!("Web search failed: {}", e);
                NO_RESULTS.to_string()
            }
        };
        Document::new(content).with_metadata("source", WEB_SOURCE)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adk::error::AgentError;
    use crate::adk::model::ScriptedModel;
    use async_trait::async_trait;
    use once_cell::sync::Lazy;
    use serde_json::Value;
    use std::sync::Mutex;

    static QUERY_SCHEMA: Lazy<Value> = Lazy::new(|| {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        })
    });

    /// Search tool returning canned contents and recording queries
    pub struct CannedSearch {
        contents: Vec<String>,
        pub queries: Mutex<Vec<String>>,
    }

    impl CannedSearch {
        pub fn new(contents: &[&str]) -> Self {
            Self {
                contents: contents.iter().map(|c| c.to_string()).collect(),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn queries(&self) -> Vec<String> {
            self.queries.lock().map(|q| q.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl Tool for CannedSearch {
        fn name(&self) -> &str {
            "web_search"
        }

        fn description(&self) -> &str {
            "canned search"
        }

        fn schema(&self) -> &Value {
            &QUERY_SCHEMA
        }

        async fn execute(&self, input: Value) -> Result<Value> {
            let query = input["query"]
                .as_str()
                .ok_or_else(|| AgentError::validation("query is required"))?;
            if let Ok(mut q) = self.queries.lock() {
                q.push(query.to_string());
            }
            let results: Vec<SearchResult> = self
                .contents
                .iter()
                .enumerate()
                .map(|(i, c)| SearchResult {
                    title: format!("result {}", i),
                    url: format!("https://example.com/{}", i),
                    content: c.clone(),
                    score: None,
                })
                .collect();
            Ok(serde_json::to_value(results)?)
        }
    }

    #[test]
    fn test_parse_grade() {
        assert!(parse_grade(r#"{"score": "yes"}"#));
        assert!(parse_grade(r#"{"binary_score": "Yes"}"#));
        assert!(!parse_grade(r#"{"score": "no"}"#));
        assert!(!parse_grade("I think it is relevant"));
    }

    #[tokio::test]
    async fn test_grade_documents_flags_dropped() {
        let model = Arc::new(ScriptedModel::from_texts([
            r#"{"score": "yes"}"#,
            r#"{"score": "no"}"#,
        ]));
        let kit = RagToolkit::new(model.clone(), Arc::new(CannedSearch::new(&[]))).unwrap();
        let docs = vec![Document::new("agent memory"), Document::new("pasta recipes")];

        let (relevant, dropped) = kit.grade_documents("agent memory?", &docs).await.unwrap();
        assert_eq!(relevant, vec![Document::new("agent memory")]);
        assert!(dropped);
        assert!(model.calls()[0][0].text().contains("agent memory?"));
    }

    #[tokio::test]
    async fn test_web_search_joins_contents() {
        let search = Arc::new(CannedSearch::new(&["first", "second"]));
        let kit = RagToolkit::new(Arc::new(ScriptedModel::new(Vec::new())), search.clone())
            .unwrap();

        let doc = kit.web_search("q").await;
        assert_eq!(doc.page_content, "first\nsecond");
        assert_eq!(doc.source(), Some(WEB_SOURCE));
        assert_eq!(search.queries(), vec!["q"]);
    }

    #[tokio::test]
    async fn test_empty_rewrite_keeps_question() {
        let kit = RagToolkit::new(
            Arc::new(ScriptedModel::from_texts(["  "])),
            Arc::new(CannedSearch::new(&[])),
        )
        .unwrap();
        assert_eq!(kit.rewrite_question("orig").await.unwrap(), "orig");
    }
}
