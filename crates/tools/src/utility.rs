//! Cross-cutting tools: a bounded sleep and the finish signal.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uipilot_core::{Environment, Tool, ToolError, ToolOutcome};

use crate::support::{REGISTRY_GRACE, float, number, optional_str};

/// Sleep for a while, clamped to `[0, max_wait]`.
pub struct WaitTool {
    max_wait: Duration,
}

impl WaitTool {
    pub fn new(max_wait: Duration) -> Self {
        Self { max_wait }
    }
}

#[async_trait]
impl Tool for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Pause briefly (1-3 seconds is typical) to let asynchronous content settle. \
         Longer requests are clamped."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "seconds": { "type": "number", "default": 1.0 }
            }
        })
    }

    fn timeout(&self) -> Duration {
        self.max_wait + REGISTRY_GRACE
    }

    async fn run(&self, _env: &dyn Environment, args: &Value) -> Result<ToolOutcome, ToolError> {
        let requested = number(args, "seconds", 1.0)?;
        let seconds = if requested.is_finite() {
            requested.clamp(0.0, self.max_wait.as_secs_f64())
        } else {
            0.0
        };
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(ToolOutcome::Done(format!("waited {} seconds", float(seconds))))
    }
}

/// Ends the session. Performs no environment action.
pub struct FinishTool;

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        "finish"
    }

    fn description(&self) -> &str {
        "Signal that the task is over. Call only when the current page, manifest and tool \
         results show the task is satisfied (reason=\"Task Success\") or when every \
         reasonable strategy has failed (reason=\"Failure\")."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reason": { "type": "string", "description": "Task Success or Failure, plus a short explanation" }
            }
        })
    }

    fn timeout(&self) -> Duration {
        REGISTRY_GRACE
    }

    async fn run(&self, _env: &dyn Environment, args: &Value) -> Result<ToolOutcome, ToolError> {
        let reason = optional_str(args, "reason")?.unwrap_or_default();
        Ok(ToolOutcome::Finish(reason.to_string()))
    }
}
