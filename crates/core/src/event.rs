//! Domain event system — decoupled observation of running sessions.
//!
//! The control loop publishes events as a session progresses. Reporting,
//! progress display or tests subscribe without being wired into the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::session::{SessionId, SessionStatus, Termination};

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A session started against a fresh environment
    SessionStarted {
        session_id: SessionId,
        task: String,
        location: String,
        timestamp: DateTime<Utc>,
    },

    /// An observe phase completed
    TurnObserved {
        session_id: SessionId,
        turn: u32,
        location: String,
        manifest_lines: usize,
        timestamp: DateTime<Utc>,
    },

    /// The decision-maker replied
    DecisionReceived {
        session_id: SessionId,
        turn: u32,
        invocations: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        session_id: SessionId,
        tool: String,
        ok: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The loop stopped scheduling turns
    SessionFinished {
        session_id: SessionId,
        status: SessionStatus,
        turns: u32,
        termination: Termination,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
