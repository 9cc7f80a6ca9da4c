// Copyright 2025 Cowboy AI, LLC.

//! Persisted state of one workflow instance

use crate::errors::Violation;
use crate::events::{ServiceError, WorkflowEvent, WorkflowOutput};
use crate::identifiers::Subject;
use crate::state_machine::{State, StateTransitions};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Waiting for responses
    Pending,
    /// Produced a successful output
    Complete,
    /// Produced a failed output
    Errored,
}

impl State for WorkflowStatus {
    fn name(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "Pending",
            WorkflowStatus::Complete => "Complete",
            WorkflowStatus::Errored => "Errored",
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStatus::Pending)
    }
}

impl StateTransitions for WorkflowStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            WorkflowStatus::Pending => vec![WorkflowStatus::Complete, WorkflowStatus::Errored],
            WorkflowStatus::Complete | WorkflowStatus::Errored => vec![],
        }
    }
}

/// Responses received so far, grouped by kind in arrival order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectedEvents(IndexMap<String, Vec<WorkflowEvent>>);

impl CollectedEvents {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event under its kind
    pub fn record(&mut self, event: WorkflowEvent) {
        self.0.entry(event.kind.clone()).or_default().push(event);
    }

    /// All events of a kind
    pub fn get(&self, kind: &str) -> &[WorkflowEvent] {
        self.0.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first event of a kind
    pub fn first(&self, kind: &str) -> Option<&WorkflowEvent> {
        self.get(kind).first()
    }

    /// Number of events of a kind
    pub fn count(&self, kind: &str) -> usize {
        self.get(kind).len()
    }

    /// Whether at least one event of `kind` arrived
    pub fn has(&self, kind: &str) -> bool {
        self.count(kind) > 0
    }

    /// Whether at least one event of every kind arrived
    pub fn has_all<S: AsRef<str>>(&self, kinds: &[S]) -> bool {
        kinds.iter().all(|k| self.has(k.as_ref()))
    }

    /// Kinds in first-arrival order
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Total number of events across all kinds
    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Whether nothing has been collected
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A dispatched call that has not been answered yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutstandingCall {
    /// Kind of the emitted call
    pub call_kind: String,
    /// Subject the call was emitted with (a child subject for nested workflows)
    pub subject: Subject,
    /// Kinds that answer this call
    pub resolved_by: Vec<String>,
    /// When the call was emitted
    pub dispatched_at: DateTime<Utc>,
    /// When the call is considered lost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl OutstandingCall {
    /// Whether the deadline has passed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| d <= now)
    }
}

/// One workflow instance as persisted between events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique identifier of the instance
    pub subject: Subject,
    /// Subject of the spawning workflow, if nested
    pub parent_subject: Option<Subject>,
    /// Workflow name
    pub workflow: String,
    /// Contract version this instance runs
    pub version: String,
    /// Source of the initiating event; the terminal event is addressed here
    pub initiator: String,
    /// Execution-model context
    pub context: Value,
    /// Responses received so far
    pub collected_events: CollectedEvents,
    /// Calls still waiting for a response
    pub outstanding: Vec<OutstandingCall>,
    /// Recoverable errors reported by called services
    pub errors: Vec<ServiceError>,
    /// Lifecycle status
    pub status: WorkflowStatus,
    /// Terminal output once retired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<WorkflowOutput>,
    /// When the instance was created
    pub created_at: DateTime<Utc>,
    /// When the instance last processed an event
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// Create a pending instance from its initiating event
    pub fn start(event: &WorkflowEvent, workflow: &str, version: &str) -> Self {
        Self {
            subject: event.subject.clone(),
            parent_subject: event.parent_subject.clone(),
            workflow: workflow.to_string(),
            version: version.to_string(),
            initiator: event.source.clone(),
            context: Value::Null,
            collected_events: CollectedEvents::new(),
            outstanding: Vec::new(),
            errors: Vec::new(),
            status: WorkflowStatus::Pending,
            output: None,
            created_at: event.time,
            updated_at: event.time,
        }
    }

    /// Whether the instance has produced its output
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether every dispatched call has been answered
    pub fn all_calls_resolved(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Record a response, releasing the first outstanding call it answers
    pub fn record(&mut self, event: WorkflowEvent) -> Option<OutstandingCall> {
        let released = self
            .outstanding
            .iter()
            .position(|call| call.resolved_by.iter().any(|k| *k == event.kind))
            .map(|idx| self.outstanding.remove(idx));
        self.collected_events.record(event);
        released
    }

    /// The first outstanding call whose deadline passed at `now`
    pub fn first_expired(&self, now: DateTime<Utc>) -> Option<&OutstandingCall> {
        self.outstanding.iter().find(|c| c.is_expired(now))
    }

    /// Move to a terminal status with its output
    pub fn retire(&mut self, output: WorkflowOutput) -> Result<(), Violation> {
        let target = if output.is_success() {
            WorkflowStatus::Complete
        } else {
            WorkflowStatus::Errored
        };
        self.status = self
            .status
            .transition_to(target)
            .map_err(|t| Violation::InvalidTransition {
                subject: self.subject.clone(),
                from: t.from.to_string(),
                to: t.to.to_string(),
            })?;
        self.output = Some(output);
        Ok(())
    }
}
