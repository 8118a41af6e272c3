//! OpenAI-compatible decision-maker.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/v1/chat/completions` with tool calling and image inputs.
//!
//! The transcript maps onto chat messages one record at a time:
//! - observation → `user` message with task, location, screenshot and manifest
//! - decision → `assistant` message carrying the tool calls
//! - tool results → one `tool` message per result
//!
//! Only the newest observation carries its screenshot; older ones are
//! replaced by a short note to keep requests bounded.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uipilot_config::DecisionConfig;
use uipilot_core::decision::*;
use uipilot_core::{DecisionError, Manifest, Observation, Transcript, TurnRecord};

/// Retry hint used when a 429 carries no `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub struct OpenAiCompatDecisionMaker {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatDecisionMaker {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DecisionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DecisionError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.0,
            client,
        })
    }

    pub fn from_config(config: &DecisionConfig) -> Result<Self, DecisionError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            DecisionError::Authentication("no API key configured (set UIPILOT_API_KEY)".into())
        })?;
        Ok(Self::new(
            "openai-compatible",
            &config.api_url,
            api_key,
            &config.model,
            Duration::from_secs(config.request_timeout_secs),
        )?
        .with_temperature(config.temperature))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert the system prompt and transcript to OpenAI messages.
    fn to_api_messages(system_prompt: &str, transcript: &Transcript) -> Vec<ApiMessage> {
        let newest_observation = transcript
            .iter()
            .rposition(|r| matches!(r, TurnRecord::Observation(_)));

        let mut messages = vec![ApiMessage::text("system", system_prompt)];
        for (i, record) in transcript.iter().enumerate() {
            match record {
                TurnRecord::Observation(obs) => {
                    messages.push(observation_message(obs, Some(i) == newest_observation));
                }
                TurnRecord::Decision { decision, .. } => {
                    let tool_calls: Vec<ApiToolCall> = decision
                        .invocations
                        .iter()
                        .map(|call| ApiToolCall {
                            id: call.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect();
                    messages.push(ApiMessage {
                        role: "assistant".into(),
                        content: Some(ApiContent::Text(decision.text.clone().unwrap_or_default())),
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        tool_call_id: None,
                    });
                }
                TurnRecord::ToolResults { results, .. } => {
                    messages.extend(results.iter().map(|r| ApiMessage {
                        role: "tool".into(),
                        content: Some(ApiContent::Text(r.output.clone())),
                        tool_calls: None,
                        tool_call_id: Some(r.call_id.clone()),
                    }));
                }
            }
        }
        messages
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

fn observation_message(obs: &Observation, with_image: bool) -> ApiMessage {
    let snapshot = &obs.snapshot;
    let mut parts = Vec::new();
    let task = obs.task.trim();
    if !task.is_empty() {
        parts.push(ContentPart::text(format!("<task>\n{task}\n</task>")));
    }
    parts.push(ContentPart::text(format!(
        "<context>\n<url>\n{}\n</url>",
        snapshot.location
    )));
    match (&snapshot.image, with_image) {
        (Some(png), true) => parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/png;base64,{}", STANDARD.encode(png)),
            },
        }),
        (Some(_), false) => parts.push(ContentPart::text("(earlier screenshot omitted)")),
        (None, _) => parts.push(ContentPart::text("(screenshot unavailable)")),
    }
    match &snapshot.manifest {
        Manifest::Omitted => parts.push(ContentPart::text("</context>")),
        manifest => parts.push(ContentPart::text(format!(
            "<ui_manifest>\n{}\n</ui_manifest>\n</context>",
            manifest.render()
        ))),
    }
    ApiMessage {
        role: "user".into(),
        content: Some(ApiContent::Parts(parts)),
        tool_calls: None,
        tool_call_id: None,
    }
}

/// Map a non-success status to a decision error.
fn status_error(status: u16, retry_after: Option<u64>, body: String) -> DecisionError {
    match status {
        429 => DecisionError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        401 | 403 => {
            DecisionError::Authentication("Invalid API key or insufficient permissions".into())
        }
        _ => DecisionError::Api {
            status_code: status,
            message: body,
        },
    }
}

fn transport_error(e: reqwest::Error) -> DecisionError {
    if e.is_timeout() {
        DecisionError::Timeout(e.to_string())
    } else {
        DecisionError::Network(e.to_string())
    }
}

/// Turn the first choice into a [`Decision`]. Arguments arrive as a JSON
/// string; text that does not parse is passed through as a string so the
/// tool reports a structural error instead of failing the session.
fn parse_response(response: ApiResponse) -> Result<Decision, DecisionError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| DecisionError::MalformedResponse("No choices in response".into()))?;

    let invocations = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let raw = tc.function.arguments;
            let arguments = if raw.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
            };
            let id = if tc.id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4().simple())
            } else {
                tc.id
            };
            ToolInvocation::new(id, tc.function.name, arguments)
        })
        .collect();

    let text = match choice.message.content {
        Some(ApiContent::Text(text)) if !text.trim().is_empty() => Some(text),
        Some(ApiContent::Parts(parts)) => {
            let text: String = parts
                .into_iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            (!text.trim().is_empty()).then_some(text)
        }
        _ => None,
    };

    Ok(Decision { invocations, text })
}

#[async_trait]
impl DecisionMaker for OpenAiCompatDecisionMaker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, DecisionError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(request.system_prompt, request.transcript),
            "temperature": self.temperature,
            "stream": false,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(request.tools));
        }

        debug!(
            decision_maker = %self.name,
            model = %self.model,
            records = request.transcript.len(),
            "Sending decision request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Decision endpoint returned error");
            return Err(status_error(status, retry_after, error_body));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            DecisionError::MalformedResponse(format!("Failed to parse response: {e}"))
        })?;
        parse_response(api_response)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<ApiContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(ApiContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uipilot_core::{PerceptionSnapshot, ToolResultRecord};

    fn observation(turn: u32, image: Option<Vec<u8>>, manifest: Manifest) -> TurnRecord {
        TurnRecord::Observation(Observation {
            turn,
            task: "Reach the success page.".into(),
            snapshot: PerceptionSnapshot {
                image,
                manifest,
                location: "https://app.test/".into(),
            },
            timestamp: Utc::now(),
        })
    }

    fn transcript() -> Transcript {
        let mut t = Transcript::new();
        t.push(observation(1, Some(b"png-1".to_vec()), Manifest::Empty));
        t.push(TurnRecord::Decision {
            turn: 1,
            decision: Decision::act(vec![ToolInvocation::new(
                "call_1",
                "click",
                serde_json::json!({ "role": "button", "name": "Continue" }),
            )]),
        });
        t.push(TurnRecord::ToolResults {
            turn: 1,
            results: vec![ToolResultRecord {
                call_id: "call_1".into(),
                tool: "click".into(),
                output: "OK: clicked role='button' name='Continue'".into(),
            }],
        });
        t.push(observation(2, Some(b"png-2".to_vec()), Manifest::Omitted));
        t
    }

    #[test]
    fn constructor_trims_base_url() {
        let dm = OpenAiCompatDecisionMaker::new(
            "test",
            "https://api.example.com/v1/",
            "sk-test",
            "gpt-4o",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(dm.base_url, "https://api.example.com/v1");
        assert_eq!(dm.name(), "test");
    }

    #[test]
    fn from_config_requires_key() {
        let err = OpenAiCompatDecisionMaker::from_config(&DecisionConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, DecisionError::Authentication(_)));
    }

    #[test]
    fn transcript_maps_to_messages_in_order() {
        let messages = OpenAiCompatDecisionMaker::to_api_messages("be careful", &transcript());
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "user"]);

        let assistant = serde_json::to_value(&messages[2]).unwrap();
        assert_eq!(assistant["tool_calls"][0]["function"]["name"], "click");
        let args: serde_json::Value = serde_json::from_str(
            assistant["tool_calls"][0]["function"]["arguments"].as_str().unwrap(),
        )
        .unwrap();
        assert_eq!(args["name"], "Continue");

        let tool = serde_json::to_value(&messages[3]).unwrap();
        assert_eq!(tool["tool_call_id"], "call_1");
        assert_eq!(tool["content"], "OK: clicked role='button' name='Continue'");
    }

    #[test]
    fn only_newest_observation_carries_image() {
        let messages = OpenAiCompatDecisionMaker::to_api_messages("", &transcript());
        let first = serde_json::to_string(&messages[1]).unwrap();
        let last = serde_json::to_string(&messages[4]).unwrap();
        assert!(first.contains("(earlier screenshot omitted)"));
        assert!(!first.contains("data:image/png"));
        assert!(last.contains(&format!("data:image/png;base64,{}", STANDARD.encode(b"png-2"))));
    }

    #[test]
    fn observation_carries_task_url_and_manifest() {
        let messages = OpenAiCompatDecisionMaker::to_api_messages("", &transcript());
        let first = serde_json::to_value(&messages[1]).unwrap();
        let parts = first["content"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "<task>\nReach the success page.\n</task>");
        assert_eq!(parts[1]["text"], "<context>\n<url>\nhttps://app.test/\n</url>");
        assert_eq!(
            parts[3]["text"],
            "<ui_manifest>\nUI_MANIFEST_EMPTY\n</ui_manifest>\n</context>"
        );

        let last = serde_json::to_value(&messages[4]).unwrap();
        let parts = last["content"].as_array().unwrap();
        assert_eq!(parts[2]["type"], "image_url");
        assert_eq!(parts[3]["text"], "</context>");
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "click".into(),
            description: "Click by role and name".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatDecisionMaker::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "click");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn parses_tool_calls_with_string_arguments() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        { "id": "call_a", "type": "function",
                          "function": { "name": "goto", "arguments": "{\"url\":\"https://app.test/x\"}" } },
                        { "id": "", "type": "function",
                          "function": { "name": "back", "arguments": "" } },
                        { "id": "call_c", "type": "function",
                          "function": { "name": "type", "arguments": "not json" } }
                    ]
                }
            }]
        }))
        .unwrap();
        let decision = parse_response(response).unwrap();
        assert_eq!(decision.invocations.len(), 3);
        assert_eq!(decision.invocations[0].arguments["url"], "https://app.test/x");
        assert!(decision.invocations[1].id.starts_with("call_"));
        assert_eq!(decision.invocations[1].arguments, serde_json::json!({}));
        assert_eq!(decision.invocations[2].arguments, serde_json::json!("not json"));
        assert_eq!(decision.text, None);
    }

    #[test]
    fn parses_text_only_reply() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Looking around." } }]
        }))
        .unwrap();
        let decision = parse_response(response).unwrap();
        assert!(!decision.has_actions());
        assert_eq!(decision.text.as_deref(), Some("Looking around."));
    }

    #[test]
    fn empty_choices_are_malformed() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({ "choices": [] })).unwrap();
        assert!(matches!(
            parse_response(response),
            Err(DecisionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn status_codes_map_to_errors() {
        assert!(matches!(
            status_error(429, Some(12), String::new()),
            DecisionError::RateLimited { retry_after_secs: 12 }
        ));
        assert!(matches!(
            status_error(429, None, String::new()),
            DecisionError::RateLimited { retry_after_secs: 5 }
        ));
        assert!(matches!(
            status_error(401, None, String::new()),
            DecisionError::Authentication(_)
        ));
        assert!(matches!(
            status_error(500, None, "boom".into()),
            DecisionError::Api { status_code: 500, .. }
        ));
    }
}
