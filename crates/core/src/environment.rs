//! Environment trait — the abstraction over the thing being driven.
//!
//! An environment is a single mutable, observable target: a browser page
//! or a desktop sandbox. The perception builder reads from it, the tool
//! registry and script executor write to it. One session owns exactly one
//! environment and never touches it concurrently.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::accessibility::AccessibilityTree;
use crate::error::EnvironmentError;

type EnvResult<T> = std::result::Result<T, EnvironmentError>;

/// Which family of driver backs an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    /// A web page (DOM accessibility tree, URL locations).
    Browser,
    /// A desktop sandbox (platform accessibility tree, sandbox-id locations).
    Desktop,
}

impl std::fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentKind::Browser => write!(f, "browser"),
            EnvironmentKind::Desktop => write!(f, "desktop"),
        }
    }
}

/// Mouse button for coordinate clicks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Parse a loosely-typed button name; unknown names fall back to left.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "right" => MouseButton::Right,
            "middle" => MouseButton::Middle,
            _ => MouseButton::Left,
        }
    }
}

impl std::fmt::Display for MouseButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MouseButton::Left => write!(f, "left"),
            MouseButton::Right => write!(f, "right"),
            MouseButton::Middle => write!(f, "middle"),
        }
    }
}

/// Pixel dimensions of the visible area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Map a normalized `[0, 1]²` point onto pixel coordinates.
    ///
    /// Out-of-range inputs are clamped so a sloppy pointer never clicks
    /// outside the visible area.
    pub fn denormalize(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x.clamp(0.0, 1.0) * f64::from(self.width),
            y.clamp(0.0, 1.0) * f64::from(self.height),
        )
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// Output of a command run inside a desktop sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub return_code: Option<i32>,
}

/// The environment driver contract.
///
/// Primitives are grouped the way tools use them: observation, semantic
/// (role + accessible name), raw pointer/keyboard/navigation, and a desktop
/// extension whose default implementations report `Unsupported`.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Which backend family this is.
    fn kind(&self) -> EnvironmentKind;

    /// Current location: a URL for browsers, a sandbox id for desktops.
    fn location(&self) -> String;

    /// Dimensions used to denormalize vision points.
    fn viewport(&self) -> Viewport;

    // ── Observation ──

    /// PNG bytes of the visible area.
    async fn screenshot(&self) -> Result<Vec<u8>, EnvironmentError>;

    /// PNG bytes of the whole page or display. Defaults to the viewport shot.
    async fn full_screenshot(&self) -> Result<Vec<u8>, EnvironmentError> {
        self.screenshot().await
    }

    /// The structural tree, or `None` when the backend exposes nothing.
    async fn accessibility_tree(&self) -> EnvResult<Option<AccessibilityTree>>;

    // ── Semantic primitives ──

    async fn click_role(&self, role: &str, name: Option<&str>) -> EnvResult<()>;

    async fn check_role(&self, role: &str, name: Option<&str>) -> EnvResult<()>;

    async fn fill_role(&self, role: &str, name: Option<&str>, value: &str) -> EnvResult<()>;

    async fn select_option(&self, role: &str, name: Option<&str>, option: &str) -> EnvResult<()>;

    // ── Raw primitives ──

    async fn mouse_click(&self, x: f64, y: f64, button: MouseButton) -> EnvResult<()>;

    async fn double_click(&self, x: f64, y: f64) -> EnvResult<()> {
        self.mouse_click(x, y, MouseButton::Left).await?;
        self.mouse_click(x, y, MouseButton::Left).await
    }

    async fn wheel(&self, delta_x: f64, delta_y: f64) -> EnvResult<()>;

    async fn type_text(&self, text: &str) -> EnvResult<()>;

    async fn press_key(&self, key: &str) -> EnvResult<()>;

    async fn navigate(&self, url: &str) -> EnvResult<()>;

    async fn go_back(&self) -> EnvResult<()>;

    // ── Desktop extension ──

    async fn hotkey(&self, modifier: &str, key: &str) -> EnvResult<()> {
        let _ = (modifier, key);
        Err(EnvironmentError::Unsupported("hotkey".into()))
    }

    async fn launch(&self, command: &str) -> EnvResult<()> {
        let _ = command;
        Err(EnvironmentError::Unsupported("launch".into()))
    }

    async fn open(&self, target: &str) -> EnvResult<()> {
        let _ = target;
        Err(EnvironmentError::Unsupported("open".into()))
    }

    async fn run_command(&self, command: &str) -> EnvResult<CommandOutput> {
        let _ = command;
        Err(EnvironmentError::Unsupported("run_command".into()))
    }
}
