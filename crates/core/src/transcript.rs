//! Transcript — the append-only record of a session.
//!
//! The transcript is the only context handed to the decision-maker on every
//! turn; there is no separate memory store. Records are pushed, never
//! edited or reordered, and the type offers no mutable access to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::snapshot::PerceptionSnapshot;

/// The result string of one executed tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    /// The call ID this result answers
    pub call_id: String,
    pub tool: String,
    pub output: String,
}

/// What the agent saw at the start of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub turn: u32,
    pub task: String,
    pub snapshot: PerceptionSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// One transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnRecord {
    /// Perception snapshot plus the task, appended in the observe phase.
    Observation(Observation),
    /// The decision-maker's reply for a turn.
    Decision { turn: u32, decision: Decision },
    /// Results of executing the preceding decision, in issue order.
    ToolResults { turn: u32, results: Vec<ToolResultRecord> },
}

impl TurnRecord {
    pub fn turn(&self) -> u32 {
        match self {
            TurnRecord::Observation(o) => o.turn,
            TurnRecord::Decision { turn, .. } | TurnRecord::ToolResults { turn, .. } => *turn,
        }
    }
}

/// An ordered, append-only sequence of [`TurnRecord`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    records: Vec<TurnRecord>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record at the end.
    pub fn push(&mut self, record: TurnRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TurnRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TurnRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&TurnRecord> {
        self.records.last()
    }

    /// Every tool result recorded so far, oldest first.
    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResultRecord> {
        self.records
            .iter()
            .filter_map(|r| match r {
                TurnRecord::ToolResults { results, .. } => Some(results.iter()),
                _ => None,
            })
            .flatten()
    }

    /// Number of observation records, i.e. completed observe phases.
    pub fn observations(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, TurnRecord::Observation(_)))
            .count()
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a TurnRecord;
    type IntoIter = std::slice::Iter<'a, TurnRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
