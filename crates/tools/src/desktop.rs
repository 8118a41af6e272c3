//! Desktop sandbox tools: shortcuts, shell commands, launching, opening,
//! and on-demand accessibility tree dumps.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uipilot_core::{CommandOutput, Environment, Tool, ToolError, ToolOutcome};

use crate::support::{REGISTRY_GRACE, guard, perform, quoted, required_str};

/// Longest stdout/stderr kept in a `run_command` result.
pub const MAX_COMMAND_OUTPUT: usize = 4000;

pub struct HotkeyTool {
    timeout: Duration,
}

impl HotkeyTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Tool for HotkeyTool {
    fn name(&self) -> &str {
        "hotkey"
    }

    fn description(&self) -> &str {
        "Press a key combination such as command+c or control+v. 'modifier' is one of \
         command, control, shift or alt."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "modifier": { "type": "string" },
                "key": { "type": "string" }
            },
            "required": ["modifier", "key"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout + REGISTRY_GRACE
    }

    async fn run(&self, env: &dyn Environment, args: &Value) -> Result<ToolOutcome, ToolError> {
        let modifier = required_str(args, "modifier")?;
        let key = required_str(args, "key")?;
        perform(
            format!(
                "pressed hotkey combination ({}, {})",
                quoted(Some(modifier)),
                quoted(Some(key))
            ),
            self.timeout,
            env.hotkey(modifier, key),
        )
        .await
    }
}

pub struct RunCommandTool {
    timeout: Duration,
}

impl RunCommandTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_COMMAND_OUTPUT) {
        Some((cut, _)) => format!("{}...[truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

fn render_command(command: &str, output: &CommandOutput) -> String {
    let code = output
        .return_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "None".into());
    format!(
        "command={} returncode={code}\nSTDOUT:\n{}\nSTDERR:\n{}",
        quoted(Some(command)),
        truncate(&output.stdout),
        truncate(&output.stderr)
    )
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a shell command inside the sandbox (pwd, ls -la, cat file.txt, grep -R ...). \
         Returns the return code, stdout and stderr, truncated when very long."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "command": { "type": "string" } },
            "required": ["command"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout + REGISTRY_GRACE
    }

    async fn run(&self, env: &dyn Environment, args: &Value) -> Result<ToolOutcome, ToolError> {
        let command = required_str(args, "command")?;
        let description = format!("ran command={}", quoted(Some(command)));
        let output = guard(&description, self.timeout, env.run_command(command)).await?;
        Ok(ToolOutcome::Done(render_command(command, &output)))
    }
}

/// `launch` and `open` share a shape: one string, one primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartKind {
    Launch,
    Open,
}

pub struct StartTool {
    kind: StartKind,
    timeout: Duration,
}

impl StartTool {
    pub fn new(kind: StartKind, timeout: Duration) -> Self {
        Self { kind, timeout }
    }
}

#[async_trait]
impl Tool for StartTool {
    fn name(&self) -> &str {
        match self.kind {
            StartKind::Launch => "launch",
            StartKind::Open => "open",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            StartKind::Launch => {
                "Launch an application inside the sandbox, e.g. xfce4-terminal or \
                 libreoffice --writer."
            }
            StartKind::Open => {
                "Open a URL or file with the sandbox's default handler."
            }
        }
    }

    fn parameters_schema(&self) -> Value {
        let arg = self.arg();
        let mut properties = serde_json::Map::new();
        properties.insert(arg.to_string(), json!({ "type": "string" }));
        json!({
            "type": "object",
            "properties": properties,
            "required": [arg]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout + REGISTRY_GRACE
    }

    async fn run(&self, env: &dyn Environment, args: &Value) -> Result<ToolOutcome, ToolError> {
        let value = required_str(args, self.arg())?;
        match self.kind {
            StartKind::Launch => {
                perform(
                    format!("launched application={}", quoted(Some(value))),
                    self.timeout,
                    env.launch(value),
                )
                .await
            }
            StartKind::Open => {
                perform(
                    format!("opened target={}", quoted(Some(value))),
                    self.timeout,
                    env.open(value),
                )
                .await
            }
        }
    }
}

impl StartTool {
    fn arg(&self) -> &'static str {
        match self.kind {
            StartKind::Launch => "command",
            StartKind::Open => "target",
        }
    }
}

/// Dump the raw accessibility tree as JSON.
pub struct AccessibilityTreeTool {
    timeout: Duration,
}

impl AccessibilityTreeTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Tool for AccessibilityTreeTool {
    fn name(&self) -> &str {
        "get_accessibility_tree"
    }

    fn description(&self) -> &str {
        "Retrieve the full accessibility tree of the sandbox to understand the UI \
         structure and available controls."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn timeout(&self) -> Duration {
        self.timeout + REGISTRY_GRACE
    }

    async fn run(&self, env: &dyn Environment, _args: &Value) -> Result<ToolOutcome, ToolError> {
        let tree = guard("accessibility tree", self.timeout, env.accessibility_tree()).await?;
        let rendered = match tree {
            Some(tree) => serde_json::to_string(&tree)
                .map_err(|e| ToolError::Crashed(format!("tree serialization failed: {e}")))?,
            None => "None".into(),
        };
        Ok(ToolOutcome::Done(format!("accessibility_tree={rendered}")))
    }
}
