//! # uipilot core
//!
//! Domain types, traits, and error definitions for the uipilot UI-testing
//! agent. This crate has **no driver or network dependencies**: it defines
//! the model that every other crate implements against.
//!
//! ## Seams
//!
//! Every external collaborator is a trait here:
//! - [`Environment`] — the browser page or desktop sandbox being driven
//! - [`DecisionMaker`] — the model that picks the next tool invocations
//! - [`PointingService`] — the vision model that locates targets on a screenshot
//! - [`SuccessCheck`] — the optional caller-injected success predicate
//!
//! Implementations live in their respective crates, and the `test-support`
//! feature ships in-memory doubles for all of them.

pub mod accessibility;
pub mod check;
pub mod decision;
pub mod environment;
pub mod error;
pub mod event;
pub mod session;
pub mod snapshot;
pub mod tool;
pub mod transcript;
pub mod vision;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export key types at crate root for ergonomics
pub use accessibility::{AccessibilityNode, AccessibilityTree, DesktopNode, DomNode};
pub use check::SuccessCheck;
pub use decision::{Decision, DecisionMaker, DecisionRequest, ToolDefinition, ToolInvocation};
pub use environment::{CommandOutput, Environment, EnvironmentKind, MouseButton, Viewport};
pub use error::{
    CheckError, DecisionError, EnvironmentError, Error, Result, SessionAborted, ToolError,
    VisionError,
};
pub use event::{DomainEvent, EventBus};
pub use session::{Session, SessionId, SessionResult, SessionStatus, Termination, Verdict};
pub use snapshot::{Manifest, ManifestEntry, PerceptionSnapshot};
pub use tool::{Tool, ToolOutcome, ToolRegistry};
pub use transcript::{Observation, ToolResultRecord, Transcript, TurnRecord};
pub use vision::{NormalizedPoint, PointingService};
