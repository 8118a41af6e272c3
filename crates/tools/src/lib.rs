//! Action tools for uipilot.
//!
//! Tools are tiered by how much they assume about the page:
//! - **semantic**: locate by ARIA role + accessible name (`click`, `input`, ...)
//! - **vision**: ask a pointing model where a described target is (`coord_click`)
//! - **raw**: pixel coordinates, wheel, keyboard and navigation
//!
//! plus the cross-cutting `wait` and `finish`, the desktop-only shell and
//! launcher tools, and the sandboxed `run_script` executor.
//!
//! [`ToolCatalog`] assembles the right set for an environment kind.

pub mod desktop;
pub mod raw;
pub mod script;
pub mod semantic;
mod support;
pub mod utility;
pub mod vision;

use std::sync::Arc;
use std::time::Duration;

use uipilot_config::AppConfig;
use uipilot_core::{EnvironmentKind, PointingService, ToolRegistry};

pub use script::{RunScriptTool, ScriptExecutor, ScriptOutcome, ScriptSettings};

use desktop::{AccessibilityTreeTool, HotkeyTool, RunCommandTool, StartKind, StartTool};
use raw::{RawAction, RawTool};
use semantic::{SemanticAction, SemanticTool};
use utility::{FinishTool, WaitTool};
use vision::{VisionClickStyle, VisionClickTool};

/// Budgets shared by the catalogue's tools.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Per-operation budget for environment actions.
    pub timeout: Duration,
    pub max_wait: Duration,
    /// Budget for one pointing-service round-trip.
    pub vision_timeout: Duration,
    pub script: ScriptSettings,
}

impl ToolSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.tools.timeout_ms),
            max_wait: config.tools.max_wait(),
            vision_timeout: Duration::from_millis(config.vision.timeout_ms),
            script: ScriptSettings::from_config(config),
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Builds the tool registry for one session.
pub struct ToolCatalog {
    kind: EnvironmentKind,
    settings: ToolSettings,
    pointer: Option<Arc<dyn PointingService>>,
    script: bool,
}

impl ToolCatalog {
    pub fn new(kind: EnvironmentKind, settings: ToolSettings) -> Self {
        Self {
            kind,
            settings,
            pointer: None,
            script: false,
        }
    }

    /// Pointing service backing the vision click. Without one, the tool is
    /// still offered and reports a `VisionError` when used.
    pub fn with_pointer(mut self, pointer: Arc<dyn PointingService>) -> Self {
        self.pointer = Some(pointer);
        self
    }

    /// Also offer `run_script`.
    pub fn with_script(mut self) -> Self {
        self.script = true;
        self
    }

    pub fn build(self) -> ToolRegistry {
        let ToolSettings {
            timeout,
            max_wait,
            vision_timeout,
            script,
        } = self.settings;

        let mut registry = ToolRegistry::new();
        match self.kind {
            EnvironmentKind::Browser => {
                for action in [
                    SemanticAction::Click,
                    SemanticAction::Check,
                    SemanticAction::Input,
                    SemanticAction::Dropdown,
                ] {
                    registry.register(Box::new(SemanticTool::new(action, timeout)));
                }
                registry.register(Box::new(VisionClickTool::new(
                    VisionClickStyle::Browser,
                    self.pointer,
                    vision_timeout,
                    timeout,
                )));
                for action in [
                    RawAction::MouseClick,
                    RawAction::Scroll,
                    RawAction::Type,
                    RawAction::Keypress,
                    RawAction::Goto,
                    RawAction::Back,
                ] {
                    registry.register(Box::new(RawTool::new(action, timeout)));
                }
            }
            EnvironmentKind::Desktop => {
                registry.register(Box::new(RawTool::new(RawAction::Type, timeout).named("type_text")));
                registry.register(Box::new(
                    RawTool::new(RawAction::Keypress, timeout).named("press_key"),
                ));
                registry.register(Box::new(RawTool::new(RawAction::Scroll, timeout)));
                registry.register(Box::new(HotkeyTool::new(timeout)));
                registry.register(Box::new(RunCommandTool::new(timeout)));
                registry.register(Box::new(StartTool::new(StartKind::Launch, timeout)));
                registry.register(Box::new(StartTool::new(StartKind::Open, timeout)));
                registry.register(Box::new(AccessibilityTreeTool::new(timeout)));
                registry.register(Box::new(VisionClickTool::new(
                    VisionClickStyle::Desktop,
                    self.pointer,
                    vision_timeout,
                    timeout,
                )));
            }
        }
        registry.register(Box::new(WaitTool::new(max_wait)));
        registry.register(Box::new(FinishTool));
        if self.script {
            registry.register(Box::new(RunScriptTool::new(script)));
        }
        registry
    }
}

/// The standard catalogue for `kind`, without `run_script`.
pub fn default_registry(
    kind: EnvironmentKind,
    settings: ToolSettings,
    pointer: Option<Arc<dyn PointingService>>,
) -> ToolRegistry {
    let mut catalog = ToolCatalog::new(kind, settings);
    if let Some(pointer) = pointer {
        catalog = catalog.with_pointer(pointer);
    }
    catalog.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uipilot_core::testing::{FixedPointer, MockEnvironment};
    use uipilot_core::{AccessibilityTree, DomNode, NormalizedPoint, ToolInvocation};

    #[test]
    fn settings_survive_unvalidated_wait_ceiling() {
        let mut config = AppConfig::default();
        config.tools.max_wait_secs = f64::INFINITY;
        let settings = ToolSettings::from_config(&config);
        assert_eq!(settings.max_wait, Duration::from_secs(60));
        assert_eq!(settings.script.max_wait, Duration::from_secs(60));
    }

    #[test]
    fn browser_catalogue() {
        let registry = default_registry(EnvironmentKind::Browser, ToolSettings::default(), None);
        assert_eq!(
            registry.names(),
            vec![
                "back",
                "check",
                "click",
                "coord_click",
                "dropdown",
                "finish",
                "goto",
                "input",
                "keypress",
                "mouse_click",
                "scroll",
                "type",
                "wait",
            ]
        );
    }

    #[test]
    fn desktop_catalogue_with_script() {
        let registry = ToolCatalog::new(EnvironmentKind::Desktop, ToolSettings::default())
            .with_script()
            .build();
        assert_eq!(
            registry.names(),
            vec![
                "click",
                "finish",
                "get_accessibility_tree",
                "hotkey",
                "launch",
                "open",
                "press_key",
                "run_command",
                "run_script",
                "scroll",
                "type_text",
                "wait",
            ]
        );
    }

    #[test]
    fn supported_names_are_quoted_and_sorted() {
        let registry = default_registry(EnvironmentKind::Desktop, ToolSettings::default(), None);
        assert!(registry.supported_names().starts_with("'click', 'finish', 'get_accessibility_tree'"));
    }

    #[test]
    fn every_tool_has_an_object_schema() {
        let registry = ToolCatalog::new(EnvironmentKind::Browser, ToolSettings::default())
            .with_script()
            .build();
        for def in registry.definitions() {
            assert_eq!(def.parameters["type"], "object", "{}", def.name);
            assert!(!def.description.is_empty(), "{}", def.name);
        }
    }

    #[tokio::test]
    async fn tiers_share_one_result_contract() {
        let pointer: Arc<dyn PointingService> =
            Arc::new(FixedPointer::points(vec![NormalizedPoint::new(0.5, 0.5)]));
        let registry = default_registry(
            EnvironmentKind::Browser,
            ToolSettings::default(),
            Some(pointer),
        );
        let env = MockEnvironment::browser("https://app.test/").with_tree(AccessibilityTree::Dom(
            vec![DomNode::new("button", "Continue")],
        ));

        let semantic = registry
            .invoke(
                &env,
                &ToolInvocation::new("1", "click", json!({ "role": "button", "name": "Continue" })),
            )
            .await;
        assert_eq!(semantic.output, "OK: clicked role='button' name='Continue'");

        let vision = registry
            .invoke(&env, &ToolInvocation::new("2", "coord_click", json!({ "prompt": "logo" })))
            .await;
        assert_eq!(vision.output, "(0.5, 0.5)");

        let missing = registry
            .invoke(
                &env,
                &ToolInvocation::new("3", "click", json!({ "role": "link", "name": "Nowhere" })),
            )
            .await;
        assert!(!missing.ok);
        assert!(missing.output.starts_with("ERROR: ActuationError: "));

        let finish = registry
            .invoke(&env, &ToolInvocation::new("4", "finish", json!({ "reason": "Task Success" })))
            .await;
        assert_eq!(finish.output, "TASK_COMPLETE: Task Success");
        assert_eq!(finish.finish.as_deref(), Some("Task Success"));
    }
}
