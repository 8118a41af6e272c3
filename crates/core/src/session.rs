//! Session state and result types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transcript::Transcript;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task outcome as tracked during a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    InProgress,
    Success,
    Failure,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }
}

/// Why the control loop stopped scheduling turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The finish tool was invoked.
    Finished,
    /// The success check reported true.
    CheckPassed,
    /// A decision carried no tool invocations and the loop is configured
    /// to treat that as completion.
    NoAction,
    /// The call budget ran out.
    BudgetExhausted,
    /// The decision-maker failed.
    Aborted,
}

/// Final classification of a session for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Success,
    Failure,
    Unresolved,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Success => write!(f, "success"),
            Verdict::Failure => write!(f, "failure"),
            Verdict::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// Mutable state of one running session. Owned by the control loop.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    task: String,
    status: SessionStatus,
    turns: u32,
    pub transcript: Transcript,
}

impl Session {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            task: task.into(),
            status: SessionStatus::InProgress,
            turns: 0,
            transcript: Transcript::new(),
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    /// Count one more observe cycle; returns the new turn number.
    pub fn begin_turn(&mut self) -> u32 {
        self.turns += 1;
        self.turns
    }

    /// Move to a terminal status. Transitions are monotonic: once success
    /// or failure is set, later calls are ignored. Returns whether the
    /// status changed.
    pub fn resolve(&mut self, status: SessionStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }

    pub fn into_result(self, termination: Termination) -> SessionResult {
        SessionResult {
            id: self.id,
            task: self.task,
            status: self.status,
            termination,
            turns: self.turns,
            transcript: self.transcript,
        }
    }
}

/// What a finished session hands back to reporting collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub id: SessionId,
    pub task: String,
    pub status: SessionStatus,
    pub termination: Termination,
    pub turns: u32,
    pub transcript: Transcript,
}

impl SessionResult {
    pub fn verdict(&self) -> Verdict {
        match self.status {
            SessionStatus::Success => Verdict::Success,
            SessionStatus::Failure => Verdict::Failure,
            SessionStatus::InProgress => Verdict::Unresolved,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SessionStatus::Success
    }
}
