//! Raw tools — pixel clicks, wheel scrolling, keyboard and navigation.
//!
//! The last-resort tier. These assume focus and context were already set
//! up by a semantic or vision-grounded action.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uipilot_core::{Environment, MouseButton, Tool, ToolError, ToolOutcome};

use crate::support::{REGISTRY_GRACE, number, optional_str, perform, quoted, required_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawAction {
    MouseClick,
    Scroll,
    Type,
    Keypress,
    Goto,
    Back,
}

pub struct RawTool {
    action: RawAction,
    name: &'static str,
    timeout: Duration,
}

impl RawTool {
    /// A raw tool under its browser name (`mouse_click`, `scroll`, `type`,
    /// `keypress`, `goto`, `back`).
    pub fn new(action: RawAction, timeout: Duration) -> Self {
        let name = match action {
            RawAction::MouseClick => "mouse_click",
            RawAction::Scroll => "scroll",
            RawAction::Type => "type",
            RawAction::Keypress => "keypress",
            RawAction::Goto => "goto",
            RawAction::Back => "back",
        };
        Self {
            action,
            name,
            timeout,
        }
    }

    /// Register under a different name, e.g. `type_text` on desktops.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

#[async_trait]
impl Tool for RawTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        match self.action {
            RawAction::MouseClick => {
                "Click at absolute pixel coordinates (x, y). Only when role-based and \
                 vision-based clicking are not applicable."
            }
            RawAction::Scroll => {
                "Scroll with mouse wheel deltas. Positive delta_y scrolls down, positive \
                 delta_x scrolls right. Prefer moderate steps (200-800)."
            }
            RawAction::Type => {
                "Type raw text into the currently focused element. Prefer the role-based \
                 input tool; focus the field first."
            }
            RawAction::Keypress => {
                "Press a single key or combination on the focused element, e.g. Enter, \
                 Escape, Tab, ArrowDown or Control+Enter."
            }
            RawAction::Goto => {
                "Navigate to an absolute URL. Prefer clicking links for in-page navigation."
            }
            RawAction::Back => "Go one step back in history.",
        }
    }

    fn parameters_schema(&self) -> Value {
        match self.action {
            RawAction::MouseClick => json!({
                "type": "object",
                "properties": {
                    "x": { "type": "number" },
                    "y": { "type": "number" },
                    "button": { "type": "string", "enum": ["left", "right", "middle"], "default": "left" }
                },
                "required": ["x", "y"]
            }),
            RawAction::Scroll => json!({
                "type": "object",
                "properties": {
                    "delta_x": { "type": "number", "default": 0 },
                    "delta_y": { "type": "number", "default": 0 }
                }
            }),
            RawAction::Type => json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
            RawAction::Keypress => json!({
                "type": "object",
                "properties": { "key": { "type": "string" } },
                "required": ["key"]
            }),
            RawAction::Goto => json!({
                "type": "object",
                "properties": { "url": { "type": "string" } },
                "required": ["url"]
            }),
            RawAction::Back => json!({ "type": "object", "properties": {} }),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout + REGISTRY_GRACE
    }

    async fn run(&self, env: &dyn Environment, args: &Value) -> Result<ToolOutcome, ToolError> {
        match self.action {
            RawAction::MouseClick => {
                if args.get("x").is_none() || args.get("y").is_none() {
                    return Err(ToolError::InvalidArguments(
                        "both 'x' and 'y' are required".into(),
                    ));
                }
                let x = number(args, "x", 0.0)?;
                let y = number(args, "y", 0.0)?;
                let button = MouseButton::parse(optional_str(args, "button")?.unwrap_or("left"));
                perform(
                    format!("{button} clicked at (x={x}, y={y})"),
                    self.timeout,
                    env.mouse_click(x, y, button),
                )
                .await
            }
            RawAction::Scroll => {
                let dx = number(args, "delta_x", 0.0)?;
                let dy = number(args, "delta_y", 0.0)?;
                perform(
                    format!("scrolled by (delta_x={dx}, delta_y={dy})"),
                    self.timeout,
                    env.wheel(dx, dy),
                )
                .await
            }
            RawAction::Type => {
                let text = required_str(args, "text")?;
                perform(
                    format!("typed text={}", quoted(Some(text))),
                    self.timeout,
                    env.type_text(text),
                )
                .await
            }
            RawAction::Keypress => {
                let key = required_str(args, "key")?;
                perform(
                    format!("pressed key={}", quoted(Some(key))),
                    self.timeout,
                    env.press_key(key),
                )
                .await
            }
            RawAction::Goto => {
                let url = required_str(args, "url")?;
                perform(
                    format!("navigated to url={}", quoted(Some(url))),
                    self.timeout,
                    env.navigate(url),
                )
                .await
            }
            RawAction::Back => {
                perform("navigated back in history".into(), self.timeout, env.go_back()).await
            }
        }
    }
}
