//! Sandboxed script executor.
//!
//! A free-form alternative to the discrete tools. A script is exactly one
//! `async fn main(env) { ... }` written in a small embedded language; it is
//! validated in full before anything runs, then interpreted under a hard
//! deadline with access only to an allow-list of builtins and the methods
//! of the environment handle.
//!
//! ```text
//! async fn main(env) {
//!     env.click("button", "Continue");
//!     let url = env.location();
//!     expect(matches(url, "success"), "did not reach success page");
//!     return url;
//! }
//! ```
//!
//! Failures carry a truncated base64 screenshot of the whole environment so
//! the state at failure time can be inspected later.

mod ast;
mod interp;
mod lexer;
mod parser;
mod value;

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value as Json, json};
use thiserror::Error;
use tracing::{debug, warn};
use uipilot_config::AppConfig;
use uipilot_core::{Environment, EnvironmentError, Tool, ToolError, ToolOutcome};

use crate::support::{REGISTRY_GRACE, number, required_str};

pub use parser::validate;

/// Budget for the diagnostic screenshot taken after a failure.
const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// A failure raised while a validated script runs.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("{0}")]
    Name(String),

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Value(String),

    #[error("{0}")]
    Index(String),

    #[error("{0}")]
    Key(String),

    #[error("division by zero")]
    ZeroDivision,

    #[error("{0}")]
    Assertion(String),

    #[error(transparent)]
    Actuation(#[from] EnvironmentError),

    #[error("script did not finish within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl ScriptError {
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptError::Name(_) => "NameError",
            ScriptError::Type(_) => "TypeError",
            ScriptError::Value(_) => "ValueError",
            ScriptError::Index(_) => "IndexError",
            ScriptError::Key(_) => "KeyError",
            ScriptError::ZeroDivision => "ZeroDivisionError",
            ScriptError::Assertion(_) => "AssertionError",
            ScriptError::Actuation(_) => "ActuationError",
            ScriptError::Timeout { .. } => "TimeoutError",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptSettings {
    pub default_timeout: Duration,
    pub max_timeout: Duration,
    /// Characters of base64 screenshot kept in a failure result.
    pub screenshot_chars: usize,
    /// Upper bound for `env.wait(seconds)`.
    pub max_wait: Duration,
    pub manifest_limit: usize,
}

impl ScriptSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_timeout: Duration::from_millis(config.script.timeout_ms),
            max_timeout: Duration::from_millis(config.script.max_timeout_ms),
            screenshot_chars: config.script.screenshot_chars,
            max_wait: config.tools.max_wait(),
            manifest_limit: config.agent.manifest_limit,
        }
    }
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// How the diagnostic screenshot went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Truncated base64 PNG.
    Screenshot(String),
    /// Why no screenshot could be taken.
    ScreenshotFailed(String),
}

#[derive(Debug, Clone)]
pub enum ScriptOutcome {
    /// `main` returned; holds the repr of its value.
    Completed(String),
    /// Validation failed; nothing ran.
    Rejected(String),
    Failed {
        error: ScriptError,
        diagnostic: Diagnostic,
    },
}

impl ScriptOutcome {
    /// The result string without its `OK: `/`ERROR: ` prefix.
    pub fn body(&self) -> String {
        match self {
            ScriptOutcome::Completed(repr) => repr.clone(),
            ScriptOutcome::Rejected(message) => format!("format: {message}"),
            ScriptOutcome::Failed { error, diagnostic } => {
                let suffix = match diagnostic {
                    Diagnostic::Screenshot(b64) => format!("SCREENSHOT_PNG_BASE64={b64}"),
                    Diagnostic::ScreenshotFailed(why) => format!("(screenshot failed: {why})"),
                };
                format!("{}: {error} {suffix}", error.kind())
            }
        }
    }

    pub fn render(&self) -> String {
        match self {
            ScriptOutcome::Completed(_) => format!("OK: {}", self.body()),
            _ => format!("ERROR: {}", self.body()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ScriptOutcome::Completed(_))
    }
}

pub struct ScriptExecutor {
    settings: ScriptSettings,
}

impl ScriptExecutor {
    pub fn new(settings: ScriptSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ScriptSettings {
        &self.settings
    }

    /// Validate and run `source`; `timeout` is clamped to the configured
    /// maximum and defaults to the configured default.
    pub async fn execute(
        &self,
        env: &dyn Environment,
        source: &str,
        timeout: Option<Duration>,
    ) -> ScriptOutcome {
        let main = match validate(source) {
            Ok(main) => main,
            Err(message) => {
                debug!(%message, "Script rejected");
                return ScriptOutcome::Rejected(message);
            }
        };

        let timeout = timeout
            .unwrap_or(self.settings.default_timeout)
            .min(self.settings.max_timeout);
        let interpreter =
            interp::Interpreter::new(env, self.settings.max_wait, self.settings.manifest_limit);

        let result = match tokio::time::timeout(timeout, interpreter.call_main(&main)).await {
            Ok(result) => result,
            Err(_) => Err(ScriptError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(value) => ScriptOutcome::Completed(value.repr()),
            Err(error) => {
                warn!(kind = error.kind(), %error, "Script failed");
                let diagnostic = self.diagnostic(env).await;
                ScriptOutcome::Failed { error, diagnostic }
            }
        }
    }

    /// `run(script_text, timeout) -> result string`.
    pub async fn run(&self, env: &dyn Environment, source: &str, timeout: Option<Duration>) -> String {
        self.execute(env, source, timeout).await.render()
    }

    async fn diagnostic(&self, env: &dyn Environment) -> Diagnostic {
        match tokio::time::timeout(SCREENSHOT_TIMEOUT, env.full_screenshot()).await {
            Ok(Ok(png)) => {
                let mut encoded = STANDARD.encode(png);
                encoded.truncate(self.settings.screenshot_chars);
                Diagnostic::Screenshot(encoded)
            }
            Ok(Err(e)) => Diagnostic::ScreenshotFailed(e.to_string()),
            Err(_) => Diagnostic::ScreenshotFailed(format!(
                "timed out after {}ms",
                SCREENSHOT_TIMEOUT.as_millis()
            )),
        }
    }
}

/// Exposes the executor to the decision-maker as `run_script`.
pub struct RunScriptTool {
    executor: ScriptExecutor,
}

impl RunScriptTool {
    pub fn new(settings: ScriptSettings) -> Self {
        Self {
            executor: ScriptExecutor::new(settings),
        }
    }
}

#[async_trait]
impl Tool for RunScriptTool {
    fn name(&self) -> &str {
        "run_script"
    }

    fn description(&self) -> &str {
        "Run a short script when the discrete tools are too restrictive. Provide exactly one \
         function `async fn main(env) { ... }` and nothing else. `env` offers click(role, name), \
         check(role, name), fill(role, name, value), select(role, name, option), click_at(x, y), \
         double_click(x, y), scroll(dx, dy), type(text), press(key), goto(url), back(), \
         location(), manifest(), wait(seconds) and screenshot_size(). Builtins: str int float \
         bool list dict len min max sum range enumerate print matches(text, pattern) \
         expect(condition, message). Returns the repr of main's return value."
    }

    fn parameters_schema(&self) -> Json {
        let default_ms = self.executor.settings.default_timeout.as_millis() as u64;
        json!({
            "type": "object",
            "properties": {
                "script": { "type": "string", "description": "async fn main(env) { ... }" },
                "timeout_ms": {
                    "type": "integer",
                    "description": "Deadline for the whole script",
                    "default": default_ms
                }
            },
            "required": ["script"]
        })
    }

    fn timeout(&self) -> Duration {
        self.executor.settings.max_timeout + SCREENSHOT_TIMEOUT + REGISTRY_GRACE
    }

    async fn run(&self, env: &dyn Environment, args: &Json) -> Result<ToolOutcome, ToolError> {
        let script = required_str(args, "script")?;
        let default_ms = self.executor.settings.default_timeout.as_millis() as f64;
        let timeout_ms = number(args, "timeout_ms", default_ms)?;
        let timeout = if timeout_ms.is_finite() && timeout_ms >= 1.0 {
            Duration::from_millis(timeout_ms as u64)
        } else {
            Duration::from_millis(1)
        };

        let outcome = self.executor.execute(env, script, Some(timeout)).await;
        if outcome.is_ok() {
            Ok(ToolOutcome::Done(outcome.body()))
        } else {
            Err(ToolError::Script(outcome.body()))
        }
    }
}
