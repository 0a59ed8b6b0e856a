//! Resource lifecycle states and the ordered event journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single resource during a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Waiting for inbound edges to resolve
    PendingDependencies,
    /// Create call in flight
    Creating,
    /// Created and reporting outputs
    Active,
    /// Create call failed
    Failed,
    /// Never attempted because a dependency failed
    Skipped,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Active | NodeState::Failed | NodeState::Skipped)
    }
}

/// Kind of recorded event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Created,
    Failed,
    Skipped,
    Deleted,
    DeleteFailed,
}

/// One entry in the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyEvent {
    pub sequence: u64,
    pub resource: String,
    pub kind: EventKind,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

/// Totally ordered record of lifecycle events.
#[derive(Debug, Clone, Default)]
pub struct EventJournal {
    events: Vec<ApplyEvent>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after previously recorded events.
    pub fn resume(events: Vec<ApplyEvent>) -> Self {
        Self { events }
    }

    pub fn record(&mut self, resource: &str, kind: EventKind, message: Option<String>) {
        let sequence = self.events.last().map_or(0, |e| e.sequence + 1);
        self.events.push(ApplyEvent {
            sequence,
            resource: resource.to_string(),
            kind,
            message,
            at: Utc::now(),
        });
    }

    pub fn events(&self) -> &[ApplyEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ApplyEvent> {
        self.events
    }

    /// Sequence number of the first matching event.
    pub fn sequence_of(&self, resource: &str, kind: EventKind) -> Option<u64> {
        sequence_of(&self.events, resource, kind)
    }
}

/// Sequence number of the first event for `resource` with `kind`.
pub fn sequence_of(events: &[ApplyEvent], resource: &str, kind: EventKind) -> Option<u64> {
    events
        .iter()
        .find(|e| e.resource == resource && e.kind == kind)
        .map(|e| e.sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_sequences_are_monotonic() {
        let mut journal = EventJournal::new();
        journal.record("alb", EventKind::Started, None);
        journal.record("alb", EventKind::Created, None);
        journal.record("tg", EventKind::Started, None);

        assert_eq!(journal.sequence_of("alb", EventKind::Created), Some(1));
        assert_eq!(journal.sequence_of("tg", EventKind::Started), Some(2));
        assert_eq!(journal.sequence_of("tg", EventKind::Created), None);

        let mut resumed = EventJournal::resume(journal.into_events());
        resumed.record("alb", EventKind::Deleted, None);
        assert_eq!(resumed.sequence_of("alb", EventKind::Deleted), Some(3));
    }

    #[test]
    fn test_terminal_states() {
        assert!(NodeState::Active.is_terminal());
        assert!(NodeState::Skipped.is_terminal());
        assert!(!NodeState::Creating.is_terminal());
        assert!(!NodeState::PendingDependencies.is_terminal());
    }
}
