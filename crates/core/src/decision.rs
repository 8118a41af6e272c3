//! DecisionMaker trait — the abstraction over the model that drives a session.
//!
//! Given the full transcript and the available tool schemas, a decision
//! maker returns zero or more tool invocations plus optional free text.
//! The shape is deterministic even though the content is not.
//!
//! Implementations: OpenAI-compatible chat completions, scripted doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DecisionError;
use crate::transcript::Transcript;

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// One requested tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Call ID assigned by the model (echoed back with the result)
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON value
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The model's reply for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<ToolInvocation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Decision {
    pub fn act(invocations: Vec<ToolInvocation>) -> Self {
        Self {
            invocations,
            text: None,
        }
    }

    pub fn say(text: impl Into<String>) -> Self {
        Self {
            invocations: Vec::new(),
            text: Some(text.into()),
        }
    }

    pub fn has_actions(&self) -> bool {
        !self.invocations.is_empty()
    }
}

/// Everything the model gets on a turn.
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub system_prompt: &'a str,
    pub transcript: &'a Transcript,
    pub tools: &'a [ToolDefinition],
}

#[async_trait]
pub trait DecisionMaker: Send + Sync {
    /// A human-readable name (e.g., "openai", "openrouter").
    fn name(&self) -> &str;

    /// Choose what to do next.
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, DecisionError>;
}
