//! Vision-grounded clicking.
//!
//! The screenshot is sent to a pointing service with a natural-language
//! description of one target. The first returned point is denormalized
//! against the environment's viewport and clicked. The pointing round-trip
//! and the click each run under their own timeout. The success payload is
//! the normalized point itself, for auditing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uipilot_core::{
    Environment, MouseButton, PointingService, Tool, ToolError, ToolOutcome, VisionError,
};

use crate::support::{REGISTRY_GRACE, float, guard, optional_str, required_str};

/// Browser and desktop flavours differ in name and in whether a double
/// click can be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionClickStyle {
    /// `coord_click(prompt, button)`
    Browser,
    /// `click(prompt, button, num)`
    Desktop,
}

pub struct VisionClickTool {
    style: VisionClickStyle,
    pointer: Option<Arc<dyn PointingService>>,
    point_timeout: Duration,
    click_timeout: Duration,
}

impl VisionClickTool {
    pub fn new(
        style: VisionClickStyle,
        pointer: Option<Arc<dyn PointingService>>,
        point_timeout: Duration,
        click_timeout: Duration,
    ) -> Self {
        Self {
            style,
            pointer,
            point_timeout,
            click_timeout,
        }
    }
}

#[async_trait]
impl Tool for VisionClickTool {
    fn name(&self) -> &str {
        match self.style {
            VisionClickStyle::Browser => "coord_click",
            VisionClickStyle::Desktop => "click",
        }
    }

    fn description(&self) -> &str {
        match self.style {
            VisionClickStyle::Browser => {
                "Ask a vision model where a visual target is on the current screenshot, then \
                 click there. A fallback for controls missing from the UI manifest. 'prompt' \
                 must describe exactly one visible target with distinguishing details \
                 (text, colour, position). Returns the normalized point clicked."
            }
            VisionClickStyle::Desktop => {
                "Locate one visual target described by 'prompt' on the current screenshot \
                 with a vision model and click it. 'button' is left or right, 'num' is \
                 single or double. Returns the normalized point clicked."
            }
        }
    }

    fn parameters_schema(&self) -> Value {
        let mut schema = serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Description of exactly one clickable target on the screenshot"
                },
                "button": { "type": "string", "enum": ["left", "right"], "default": "left" }
            },
            "required": ["prompt"]
        });
        if self.style == VisionClickStyle::Desktop {
            schema["properties"]["num"] =
                serde_json::json!({ "type": "string", "enum": ["single", "double"], "default": "single" });
        }
        schema
    }

    fn timeout(&self) -> Duration {
        // screenshot + pointing + click
        self.click_timeout * 2 + self.point_timeout + REGISTRY_GRACE
    }

    async fn run(&self, env: &dyn Environment, args: &Value) -> Result<ToolOutcome, ToolError> {
        let prompt = required_str(args, "prompt")?;
        let button = MouseButton::parse(optional_str(args, "button")?.unwrap_or("left"));
        let double = self.style == VisionClickStyle::Desktop
            && optional_str(args, "num")?.is_some_and(|n| n.trim().to_ascii_lowercase().starts_with("double"));

        let pointer = self.pointer.as_ref().ok_or_else(|| {
            VisionError::NotConfigured("no pointing service (is MOONDREAM_API_KEY set?)".into())
        })?;

        let image = guard("screenshot", self.click_timeout, env.screenshot()).await?;

        let points = match tokio::time::timeout(self.point_timeout, pointer.point(&image, prompt)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    operation: format!("{} point call", pointer.name()),
                    timeout_ms: self.point_timeout.as_millis() as u64,
                });
            }
        };
        let point = points
            .first()
            .copied()
            .ok_or_else(|| VisionError::NoPoints(pointer.name().to_string()))?;

        let (x, y) = env.viewport().denormalize(point.x, point.y);
        debug!(prompt, x_norm = point.x, y_norm = point.y, x, y, "Vision click");

        if double {
            guard("double click", self.click_timeout, env.double_click(x, y)).await?;
        } else {
            guard(
                &format!("{button} click"),
                self.click_timeout,
                env.mouse_click(x, y, button),
            )
            .await?;
        }

        Ok(ToolOutcome::Payload(format!(
            "({}, {})",
            float(point.x),
            float(point.y)
        )))
    }
}
