//! Configuration loading, validation, and logging setup for uipilot.
//!
//! Loads configuration from `~/.uipilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

pub mod logging;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on manifest lines handed to the decision-maker.
pub const MANIFEST_LINE_CAP: usize = 300;

/// Largest `tools.max_wait_secs` accepted.
pub const MAX_WAIT_CAP_SECS: f64 = 60.0;

/// The root configuration structure.
///
/// Maps directly to `~/.uipilot/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Decision-making model endpoint
    #[serde(default)]
    pub decision: DecisionConfig,

    /// Vision-pointing endpoint
    #[serde(default)]
    pub vision: VisionConfig,

    /// Per-tool timeouts and limits
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Sandboxed script executor limits
    #[serde(default)]
    pub script: ScriptConfig,

    /// Control loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Batch runner settings
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    #[serde(default = "default_decision_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_decision_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            api_url: default_decision_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for DecisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Budget for the pointing round-trip alone
    #[serde(default = "default_vision_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_vision_url() -> String {
    "https://api.moondream.ai/v1".into()
}
fn default_vision_timeout_ms() -> u64 {
    10_000
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_url: default_vision_url(),
            api_key: None,
            timeout_ms: default_vision_timeout_ms(),
        }
    }
}

impl std::fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Wall-clock budget for one environment operation
    #[serde(default = "default_tool_timeout_ms")]
    pub timeout_ms: u64,

    /// Ceiling for the `wait` tool
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: f64,

    /// Used when the driver cannot report its own dimensions
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
}

fn default_tool_timeout_ms() -> u64 {
    2_000
}
fn default_max_wait_secs() -> f64 {
    10.0
}
fn default_viewport_width() -> u32 {
    1280
}
fn default_viewport_height() -> u32 {
    720
}

impl ToolsConfig {
    /// `max_wait_secs` as a duration, clamped into `[0, MAX_WAIT_CAP_SECS]`
    /// so an unvalidated config still yields a usable ceiling.
    pub fn max_wait(&self) -> Duration {
        let secs = if self.max_wait_secs.is_nan() {
            0.0
        } else {
            self.max_wait_secs.clamp(0.0, MAX_WAIT_CAP_SECS)
        };
        Duration::from_secs_f64(secs)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_tool_timeout_ms(),
            max_wait_secs: default_max_wait_secs(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "default_script_timeout_ms")]
    pub timeout_ms: u64,

    /// Largest timeout a caller may request per script
    #[serde(default = "default_script_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Base64 characters of the failure screenshot kept in the error string
    #[serde(default = "default_screenshot_chars")]
    pub screenshot_chars: usize,
}

fn default_script_timeout_ms() -> u64 {
    30_000
}
fn default_script_max_timeout_ms() -> u64 {
    120_000
}
fn default_screenshot_chars() -> usize {
    4_096
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_script_timeout_ms(),
            max_timeout_ms: default_script_max_timeout_ms(),
            screenshot_chars: default_screenshot_chars(),
        }
    }
}

/// What the control loop does with a decision that carries no tool calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnNoToolCalls {
    /// Observe again and ask for another decision.
    #[default]
    Reobserve,
    /// End the session; "no action" counts as completion.
    Finish,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Call budget: maximum observe cycles per session
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    #[serde(default)]
    pub on_no_tool_calls: OnNoToolCalls,

    /// Include the accessibility manifest in each observation
    #[serde(default = "default_true")]
    pub include_manifest: bool,

    #[serde(default = "default_manifest_limit")]
    pub manifest_limit: usize,

    /// Also consult the success check right after each batch of actions
    #[serde(default = "default_true")]
    pub check_after_actions: bool,

    /// Replace the built-in system prompt with the contents of this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_path: Option<PathBuf>,
}

fn default_max_turns() -> u32 {
    50
}
fn default_manifest_limit() -> usize {
    MANIFEST_LINE_CAP
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            on_no_tool_calls: OnNoToolCalls::default(),
            include_manifest: true,
            manifest_limit: default_manifest_limit(),
            check_after_actions: true,
            system_prompt_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum sessions alive at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Joined with relative `starting_url`s from the test case file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cases_path: Option<PathBuf>,
}

fn default_concurrency() -> usize {
    3
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            base_url: None,
            cases_path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, then apply
    /// environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in
    /// production). Overrides win over file values.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = lookup("UIPILOT_API_KEY") {
            self.decision.api_key = Some(key);
        }
        if let Some(model) = lookup("UIPILOT_MODEL") {
            self.decision.model = model;
        }
        if let Some(url) = lookup("UIPILOT_API_URL") {
            self.decision.api_url = url;
        }
        if let Some(key) = lookup("MOONDREAM_API_KEY") {
            self.vision.api_key = Some(key);
        }
        if let Some(base) = lookup("TEST_BASE_URL") {
            self.runner.base_url = Some(base);
        }
        if let Some(raw) = lookup("UIPILOT_CONCURRENCY") {
            self.runner.concurrency = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "UIPILOT_CONCURRENCY must be a positive integer, got '{raw}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".uipilot")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::ValidationError(msg.into()));

        if !(0.0..=2.0).contains(&self.decision.temperature) {
            return fail("decision.temperature must be between 0.0 and 2.0");
        }
        if self.decision.request_timeout_secs == 0 {
            return fail("decision.request_timeout_secs must be > 0");
        }
        if self.vision.timeout_ms == 0 {
            return fail("vision.timeout_ms must be > 0");
        }
        if self.tools.timeout_ms == 0 {
            return fail("tools.timeout_ms must be > 0");
        }
        let max_wait = self.tools.max_wait_secs;
        if !(max_wait > 0.0 && max_wait <= MAX_WAIT_CAP_SECS) {
            return fail("tools.max_wait_secs must be > 0 and at most 60");
        }
        if self.tools.viewport_width == 0 || self.tools.viewport_height == 0 {
            return fail("tools.viewport dimensions must be > 0");
        }
        if self.script.timeout_ms == 0 {
            return fail("script.timeout_ms must be > 0");
        }
        if self.script.timeout_ms > self.script.max_timeout_ms {
            return fail("script.timeout_ms must not exceed script.max_timeout_ms");
        }
        if self.agent.max_turns == 0 {
            return fail("agent.max_turns must be > 0");
        }
        if self.agent.manifest_limit == 0 || self.agent.manifest_limit > MANIFEST_LINE_CAP {
            return fail("agent.manifest_limit must be between 1 and 300");
        }
        if self.runner.concurrency == 0 {
            return fail("runner.concurrency must be >= 1");
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.decision.api_key.is_some()
    }

    /// Read the system prompt override, if one is configured.
    pub fn system_prompt_override(&self) -> Result<Option<String>, ConfigError> {
        let Some(path) = &self.agent.system_prompt_path else {
            return Ok(None);
        };
        std::fs::read_to_string(path)
            .map(Some)
            .map_err(|e| ConfigError::ReadError {
                path: path.clone(),
                reason: e.to_string(),
            })
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tools.timeout_ms, 2000);
        assert_eq!(config.agent.manifest_limit, 300);
        assert_eq!(config.agent.on_no_tool_calls, OnNoToolCalls::Reobserve);
        assert_eq!(config.runner.concurrency, 3);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.decision.model, config.decision.model);
        assert_eq!(parsed.script.max_timeout_ms, config.script.max_timeout_ms);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.decision.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn manifest_limit_above_cap_rejected() {
        let mut config = AppConfig::default();
        config.agent.manifest_limit = 301;
        assert!(config.validate().is_err());
    }

    #[test]
    fn script_timeout_above_max_rejected() {
        let mut config = AppConfig::default();
        config.script.timeout_ms = config.script.max_timeout_ms + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_budget_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_turns = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn max_wait_must_be_finite_and_small() {
        for raw in ["inf", "nan", "1e30", "60.5", "0.0"] {
            let config: AppConfig =
                toml::from_str(&format!("[tools]\nmax_wait_secs = {raw}")).unwrap();
            assert!(config.validate().is_err(), "max_wait_secs = {raw}");
        }
        let config: AppConfig = toml::from_str("[tools]\nmax_wait_secs = 60.0").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn max_wait_duration_is_clamped() {
        let mut tools = ToolsConfig::default();
        assert_eq!(tools.max_wait(), Duration::from_secs(10));
        tools.max_wait_secs = f64::INFINITY;
        assert_eq!(tools.max_wait(), Duration::from_secs(60));
        tools.max_wait_secs = f64::NAN;
        assert_eq!(tools.max_wait(), Duration::ZERO);
        tools.max_wait_secs = -3.0;
        assert_eq!(tools.max_wait(), Duration::ZERO);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.decision.model, "gpt-4o");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[agent]
max_turns = 12
on_no_tool_calls = "finish"

[runner]
concurrency = 5
base_url = "http://localhost:3000"
"#
        )
        .unwrap();
        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.agent.max_turns, 12);
        assert_eq!(config.agent.on_no_tool_calls, OnNoToolCalls::Finish);
        assert!(config.agent.include_manifest);
        assert_eq!(config.runner.concurrency, 5);
        assert_eq!(config.tools.max_wait_secs, 10.0);
    }

    #[test]
    fn unparseable_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent\nmax_turns = ").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("UIPILOT_API_KEY", "sk-test"),
            ("UIPILOT_MODEL", "gpt-4.1"),
            ("MOONDREAM_API_KEY", "md-test"),
            ("TEST_BASE_URL", "http://localhost:8080"),
            ("UIPILOT_CONCURRENCY", "7"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(config.has_api_key());
        assert_eq!(config.decision.model, "gpt-4.1");
        assert_eq!(config.vision.api_key.as_deref(), Some("md-test"));
        assert_eq!(config.runner.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.runner.concurrency, 7);
    }

    #[test]
    fn bad_concurrency_override_is_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env_overrides(|k| {
            (k == "UIPILOT_CONCURRENCY").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn debug_output_redacts_keys() {
        let mut config = AppConfig::default();
        config.decision.api_key = Some("sk-secret".into());
        config.vision.api_key = Some("md-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("md-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn system_prompt_override_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "You are a tester.").unwrap();
        let mut config = AppConfig::default();
        assert!(config.system_prompt_override().unwrap().is_none());
        config.agent.system_prompt_path = Some(file.path().to_path_buf());
        assert_eq!(
            config.system_prompt_override().unwrap().as_deref(),
            Some("You are a tester.")
        );
    }
}
