// SPDX-License-Identifier: MIT

//! Map cabin-assistant requests onto a closed set of scenarios and actions

use crate::adk::agent::Agent;
use crate::adk::error::{AgentError, Result};
use crate::adk::model::Model;
use crate::adk::prompt::ChatPromptTemplate;
use crate::adk::structured::{Responder, StructuredOutput};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const EXAMPLE_REQUESTS: &str = "Give me a relax song
It's too hot in here
I want to go to the nearest gas station
I can't hear the music
Open the windows";

const SYSTEM_PROMPT: &str = r#"You are a smart cabin assistant that maps user's {question} to specific scenarios and actions.
Your task is to analyze the question and return a JSON object with the following structure:
{{
  "scenario": "media|navigation|air_conditioning_control|volume_control|vehicle_control",
  "action": "turn_on|turn_off|increase|decrease|play|stop|pause|next|open|close|navigate"
}}

For questions about:
- Music or song to play -> map to "media" scenario
- Navigation or direction -> map to "navigation" scenario
- Temperature or AC -> map to "air_conditioning_control" scenario
- Sound or volume -> map to "volume_control" scenario
- Windows, doors, or other car controls -> map to "vehicle_control" scenario

Choose the most appropriate action from the listed options.
IMPORTANT: Return ONLY a valid JSON object, without any additional text or explanations."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Media,
    Navigation,
    #[serde(alias = "air conditioning control")]
    AirConditioningControl,
    #[serde(alias = "volume control")]
    VolumeControl,
    #[serde(alias = "vehicle control")]
    VehicleControl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[serde(alias = "turn on")]
    TurnOn,
    #[serde(alias = "turn off")]
    TurnOff,
    Increase,
    Decrease,
    Play,
    Stop,
    Pause,
    Next,
    Open,
    Close,
    Navigate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BizAction {
    /// Given a user question choose to a special scenario.
    pub scenario: Scenario,
    /// The action to be taken.
    pub action: Action,
}

impl fmt::Display for BizAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // serialized names are the wire names
        let scenario = serde_json::to_value(self.scenario).map_err(|_| fmt::Error)?;
        let action = serde_json::to_value(self.action).map_err(|_| fmt::Error)?;
        write!(
            f,
            "scenario={} action={}",
            scenario.as_str().unwrap_or_default(),
            action.as_str().unwrap_or_default()
        )
    }
}

pub struct CabinClassifier {
    prompt: ChatPromptTemplate,
    responder: Responder<BizAction>,
}

impl CabinClassifier {
    pub fn new(model: Arc<dyn Model>) -> Result<Self> {
        Ok(Self {
            prompt: ChatPromptTemplate::new()
                .system(SYSTEM_PROMPT)?
                .user("{question}")?,
            responder: Responder::new(
                model,
                StructuredOutput::new("BizAction", "Scenario and action for a cabin request"),
            ),
        })
    }

    pub async fn classify(&self, question: &str) -> Result<BizAction> {
        let messages = self.prompt.render(&[("question", question)], &[])?;
        let response = self.responder.respond(&messages).await?;
        let action = response.value.ok_or_else(|| {
            AgentError::validation(format!(
                "no valid action after {} attempts",
                response.attempts
            ))
        })?;
        log::info!("question: {}, action: {}", question, action);
        Ok(action)
    }
}

#[async_trait]
impl Agent for CabinClassifier {
    fn name(&self) -> &str {
        "structured-output"
    }

    /// One request per line
    async fn run(&self, input: String) -> Result<String> {
        let mut out = Vec::new();
        let questions = input.lines().map(str::trim).filter(|l| !l.is_empty());
        for (i, question) in questions.enumerate() {
            match self.classify(question).await {
                Ok(action) => out.push(format!("{}. Question:{}, Action: {}", i + 1, question, action)),
                Err(e) => out.push(format!("Error processing request: {}", e)),
            }
        }
        Ok(out.join("\n"))
    }
}
