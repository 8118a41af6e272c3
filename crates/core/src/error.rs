//! Error types for the uipilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; only [`DecisionError`]
//! is allowed to abort a session; every other kind is rendered into a
//! tool result string before it reaches the control loop.

use thiserror::Error;

use crate::session::SessionResult;

/// The top-level error type for all uipilot operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Decision error: {0}")]
    Decision(#[from] DecisionError),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Raised by an environment driver when it cannot perform an operation.
#[derive(Debug, Clone, Error)]
pub enum EnvironmentError {
    #[error("no element matches {0}")]
    TargetNotFound(String),

    #[error("operation not supported by this environment: {0}")]
    Unsupported(String),

    #[error("driver failure: {0}")]
    Driver(String),

    #[error("environment is closed")]
    Closed,
}

impl EnvironmentError {
    pub fn kind(&self) -> &'static str {
        match self {
            EnvironmentError::TargetNotFound(_) => "TargetNotFound",
            EnvironmentError::Unsupported(_) => "Unsupported",
            EnvironmentError::Driver(_) => "DriverError",
            EnvironmentError::Closed => "Closed",
        }
    }
}

/// Failure of the decision-making collaborator. Fatal for a session.
#[derive(Debug, Clone, Error)]
pub enum DecisionError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// A session cut short by its decision-maker. `partial` holds everything
/// recorded before the failure, with [`Termination::Aborted`].
///
/// [`Termination::Aborted`]: crate::session::Termination::Aborted
#[derive(Debug, Error)]
#[error("session aborted: {error}")]
pub struct SessionAborted {
    #[source]
    pub error: DecisionError,
    pub partial: Box<SessionResult>,
}

/// Failure of the vision-pointing collaborator.
#[derive(Debug, Clone, Error)]
pub enum VisionError {
    #[error("pointing service not configured: {0}")]
    NotConfigured(String),

    #[error("pointing request failed: {0}")]
    Request(String),

    #[error("invalid pointing response: {0}")]
    InvalidResponse(String),

    #[error("{0} returned no points")]
    NoPoints(String),
}

/// Raised by a success check. Always swallowed by the control loop.
#[derive(Debug, Clone, Error)]
#[error("success check failed: {0}")]
pub struct CheckError(pub String);

/// Everything that can go wrong inside a tool invocation.
///
/// Never crosses the registry boundary as a value: the registry renders it
/// with [`ToolError::render`].
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArguments(String),

    #[error("{operation} did not finish within {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error(transparent)]
    Actuation(#[from] EnvironmentError),

    #[error("Unknown tool '{name}'. Use only the supported tools: {supported}.")]
    UnknownTool { name: String, supported: String },

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error("tool crashed: {0}")]
    Crashed(String),

    /// A script failure, already rendered as `<kind>: <message>[ diagnostics]`.
    #[error("{0}")]
    Script(String),
}

impl ToolError {
    /// Stable token naming the error kind in `"ERROR: <kind>: <message>"`.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidArguments(_) => "StructuralError",
            ToolError::Timeout { .. } => "TimeoutError",
            ToolError::Actuation(_) => "ActuationError",
            ToolError::UnknownTool { .. } => "UnknownToolError",
            ToolError::Vision(_) => "VisionError",
            ToolError::Crashed(_) => "InternalError",
            ToolError::Script(_) => "ScriptError",
        }
    }

    /// Render into the tool-result string contract.
    pub fn render(&self) -> String {
        match self {
            ToolError::Script(rendered) => format!("ERROR: {rendered}"),
            _ => format!("ERROR: {}: {}", self.kind(), self),
        }
    }

    /// Shorthand for a missing or mistyped argument.
    pub fn missing(arg: &str) -> Self {
        ToolError::InvalidArguments(format!("missing or invalid '{arg}' argument"))
    }
}
