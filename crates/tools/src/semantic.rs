//! Semantic tools — act on an element located by ARIA role and accessible
//! name. The preferred tier: deterministic, and the names come straight
//! from the manifest the agent is shown.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uipilot_core::{Environment, Tool, ToolError, ToolOutcome};

use crate::support::{REGISTRY_GRACE, optional_str, perform, quoted, required_str};

/// Which locator action a [`SemanticTool`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticAction {
    Click,
    Check,
    Input,
    Dropdown,
}

impl SemanticAction {
    fn name(self) -> &'static str {
        match self {
            SemanticAction::Click => "click",
            SemanticAction::Check => "check",
            SemanticAction::Input => "input",
            SemanticAction::Dropdown => "dropdown",
        }
    }

    fn description(self) -> &'static str {
        match self {
            SemanticAction::Click => {
                "Click an element using its ARIA role and accessible name, exactly as listed \
                 in the UI manifest (for '- button: Continue' use role='button', name='Continue'). \
                 Try this before any coordinate-based tool."
            }
            SemanticAction::Check => {
                "Ensure a checkbox, radio or switch is checked, located by ARIA role and \
                 accessible name from the UI manifest. Never unchecks."
            }
            SemanticAction::Input => {
                "Replace the contents of a textbox or combobox, located by ARIA role and \
                 accessible name from the UI manifest, with 'value'."
            }
            SemanticAction::Dropdown => {
                "Select the option labelled 'option' in a dropdown located by ARIA role and \
                 accessible name from the UI manifest."
            }
        }
    }

    /// The extra string argument this action needs besides role/name.
    fn extra_arg(self) -> Option<&'static str> {
        match self {
            SemanticAction::Click | SemanticAction::Check => None,
            SemanticAction::Input => Some("value"),
            SemanticAction::Dropdown => Some("option"),
        }
    }
}

pub struct SemanticTool {
    action: SemanticAction,
    timeout: Duration,
}

impl SemanticTool {
    pub fn new(action: SemanticAction, timeout: Duration) -> Self {
        Self { action, timeout }
    }
}

#[async_trait]
impl Tool for SemanticTool {
    fn name(&self) -> &str {
        self.action.name()
    }

    fn description(&self) -> &str {
        self.action.description()
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::json!({
            "role": { "type": "string", "description": "ARIA role from the UI manifest" },
            "name": { "type": "string", "description": "Accessible name from the UI manifest" }
        });
        let mut required = vec!["role"];
        if let Some(extra) = self.action.extra_arg() {
            properties[extra] = serde_json::json!({ "type": "string" });
            required.push(extra);
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout + REGISTRY_GRACE
    }

    async fn run(&self, env: &dyn Environment, args: &Value) -> Result<ToolOutcome, ToolError> {
        let role = required_str(args, "role")?;
        let name = optional_str(args, "name")?;
        let target = format!("role={} name={}", quoted(Some(role)), quoted(name));

        match self.action {
            SemanticAction::Click => {
                perform(format!("clicked {target}"), self.timeout, env.click_role(role, name)).await
            }
            SemanticAction::Check => {
                perform(format!("checked {target}"), self.timeout, env.check_role(role, name)).await
            }
            SemanticAction::Input => {
                let value = required_str(args, "value")?;
                perform(
                    format!("filled {target} with value={}", quoted(Some(value))),
                    self.timeout,
                    env.fill_role(role, name, value),
                )
                .await
            }
            SemanticAction::Dropdown => {
                let option = required_str(args, "option")?;
                perform(
                    format!("selected option={} for {target}", quoted(Some(option))),
                    self.timeout,
                    env.select_option(role, name, option),
                )
                .await
            }
        }
    }
}
