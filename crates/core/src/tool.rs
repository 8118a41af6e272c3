//! Tool trait — the abstraction over the agent's actuators.
//!
//! Tools are the only way the control loop affects the environment. Every
//! tool shares one result contract: a single string shaped either
//! `"OK: <description>"` or `"ERROR: <kind>: <message>"`. The registry
//! enforces that contract uniformly: timeouts, errors and panics raised by
//! a tool are all rendered into a string at this boundary.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::decision::{ToolDefinition, ToolInvocation};
use crate::environment::Environment;
use crate::error::ToolError;
use crate::transcript::ToolResultRecord;

/// What a tool produced when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Rendered as `"OK: <description>"`.
    Done(String),
    /// Rendered verbatim (e.g. a normalized point, a script result).
    Payload(String),
    /// Rendered as `"TASK_COMPLETE: <reason>"`; asks the loop to stop.
    Finish(String),
}

impl ToolOutcome {
    pub fn render(&self) -> String {
        match self {
            ToolOutcome::Done(description) => format!("OK: {description}"),
            ToolOutcome::Payload(payload) => payload.clone(),
            ToolOutcome::Finish(reason) => format!("TASK_COMPLETE: {reason}"),
        }
    }
}

/// The core Tool trait.
///
/// Each tool (click, scroll, coord_click, run_script, finish, ...)
/// implements this trait. Tools are registered in the [`ToolRegistry`]
/// once per session and are immutable afterwards.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "click", "goto").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Hard wall-clock budget for one invocation.
    fn timeout(&self) -> Duration;

    /// Perform the operation against `env`.
    async fn run(
        &self,
        env: &dyn Environment,
        arguments: &serde_json::Value,
    ) -> Result<ToolOutcome, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The outcome of one invocation as seen by the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReport {
    pub call_id: String,
    pub tool: String,
    /// The result string, already rendered.
    pub output: String,
    pub ok: bool,
    /// Set when the tool asked the loop to finish.
    pub finish: Option<String>,
    pub duration_ms: u64,
}

impl ToolReport {
    pub fn to_record(&self) -> ToolResultRecord {
        ToolResultRecord {
            call_id: self.call_id.clone(),
            tool: self.tool.clone(),
            output: self.output.clone(),
        }
    }
}

/// A registry of available tools, keyed by name.
///
/// The control loop uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Look up and run tools when the model requests them
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the model), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// `'a', 'b', 'c'`, used in the unknown-tool error.
    pub fn supported_names(&self) -> String {
        self.tools
            .keys()
            .map(|n| format!("'{n}'"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run one invocation. Never fails: every problem becomes an
    /// `"ERROR: ..."` string in the returned report.
    pub async fn invoke(&self, env: &dyn Environment, call: &ToolInvocation) -> ToolReport {
        let start = Instant::now();
        let result = match self.tools.get(&call.name) {
            None => Err(ToolError::UnknownTool {
                name: call.name.clone(),
                supported: self.supported_names(),
            }),
            Some(tool) => Self::guarded(tool.as_ref(), env, &call.arguments).await,
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                debug!(tool = %call.name, duration_ms, "Tool succeeded");
                let finish = match &outcome {
                    ToolOutcome::Finish(reason) => Some(reason.clone()),
                    _ => None,
                };
                ToolReport {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    output: outcome.render(),
                    ok: true,
                    finish,
                    duration_ms,
                }
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, duration_ms, "Tool failed");
                ToolReport {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    output: e.render(),
                    ok: false,
                    finish: None,
                    duration_ms,
                }
            }
        }
    }

    async fn guarded(
        tool: &dyn Tool,
        env: &dyn Environment,
        arguments: &serde_json::Value,
    ) -> Result<ToolOutcome, ToolError> {
        let budget = tool.timeout();
        let run = AssertUnwindSafe(tool.run(env, arguments)).catch_unwind();
        match tokio::time::timeout(budget, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ToolError::Crashed(panic_message(panic.as_ref()))),
            Err(_) => Err(ToolError::Timeout {
                operation: format!("tool '{}'", tool.name()),
                timeout_ms: budget.as_millis() as u64,
            }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Text of a caught panic payload.
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEnvironment;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        fn timeout(&self) -> Duration {
            Duration::from_millis(100)
        }
        async fn run(
            &self,
            _env: &dyn Environment,
            arguments: &serde_json::Value,
        ) -> Result<ToolOutcome, ToolError> {
            let text = arguments["text"].as_str().ok_or_else(|| ToolError::missing("text"))?;
            Ok(ToolOutcome::Done(format!("echoed {text}")))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Never finishes in time"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }
        async fn run(&self, _env: &dyn Environment, _: &serde_json::Value) -> Result<ToolOutcome, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolOutcome::Done("woke up".into()))
        }
    }

    struct PanickyTool;

    #[async_trait]
    impl Tool for PanickyTool {
        fn name(&self) -> &str {
            "panicky"
        }
        fn description(&self) -> &str {
            "Panics"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn run(&self, _env: &dyn Environment, _: &serde_json::Value) -> Result<ToolOutcome, ToolError> {
            panic!("driver exploded");
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(SlowTool));
        registry.register(Box::new(PanickyTool));
        registry
    }

    fn call(name: &str, args: serde_json::Value) -> ToolInvocation {
        ToolInvocation::new("call_1", name, args)
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = registry();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo", "panicky", "slow"]);
    }

    #[test]
    fn registry_definitions_are_sorted() {
        let defs = registry().definitions();
        assert_eq!(defs.len(), 3);
        assert_eq!(defs[0].name, "echo");
    }

    #[tokio::test]
    async fn invoke_renders_ok_contract() {
        let env = MockEnvironment::browser("https://app.test/");
        let report = registry()
            .invoke(&env, &call("echo", serde_json::json!({"text": "hi"})))
            .await;
        assert!(report.ok);
        assert_eq!(report.output, "OK: echoed hi");
        assert_eq!(report.call_id, "call_1");
    }

    #[tokio::test]
    async fn invoke_renders_structural_errors() {
        let env = MockEnvironment::browser("https://app.test/");
        let report = registry().invoke(&env, &call("echo", serde_json::json!({}))).await;
        assert!(!report.ok);
        assert!(report.output.starts_with("ERROR: StructuralError:"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_not_raised() {
        let env = MockEnvironment::browser("https://app.test/");
        let report = registry().invoke(&env, &call("teleport", serde_json::json!({}))).await;
        assert!(!report.ok);
        assert!(report.output.contains("Unknown tool 'teleport'"));
        assert!(report.output.contains("'echo', 'panicky', 'slow'"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_error_result() {
        let env = MockEnvironment::browser("https://app.test/");
        let report = registry().invoke(&env, &call("slow", serde_json::json!({}))).await;
        assert!(!report.ok);
        assert_eq!(
            report.output,
            "ERROR: TimeoutError: tool 'slow' did not finish within 50ms"
        );
    }

    #[tokio::test]
    async fn panic_becomes_error_result() {
        let env = MockEnvironment::browser("https://app.test/");
        let report = registry().invoke(&env, &call("panicky", serde_json::json!({}))).await;
        assert!(!report.ok);
        assert!(report.output.contains("driver exploded"));
    }

    #[test]
    fn finish_outcome_renders_task_complete() {
        assert_eq!(
            ToolOutcome::Finish("Task Success".into()).render(),
            "TASK_COMPLETE: Task Success"
        );
    }
}
