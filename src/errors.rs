// Copyright 2025 Cowboy AI, LLC.

//! Error types for orchestration
//!
//! Two disjoint classes live here. Recoverable failures reported by called
//! services travel as data ([`crate::ServiceError`]) and never appear in this
//! module. Everything below signals that the orchestration itself could not
//! proceed: [`Violation`] is the fatal class (never retried, never emitted as
//! an event), the rest are infrastructure failures of the collaborators.

use crate::identifiers::Subject;
use thiserror::Error;

/// A broken orchestration invariant.
///
/// Violations are thrown out of `process` synchronously. The caller must halt
/// the instance and must not reprocess the same event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    /// A response arrived for a subject that has no persisted state
    #[error("Orphan response: event {kind} for subject {subject} has no workflow state")]
    OrphanResponse {
        /// Subject the event was addressed to
        subject: Subject,
        /// Kind of the offending event
        kind: String,
    },

    /// An initiating event arrived for a subject whose state already exists
    #[error("Duplicate init: subject {subject} already has workflow state")]
    DuplicateInit {
        /// Subject that was initialised twice
        subject: Subject,
    },

    /// A status change the instance lifecycle does not allow
    #[error("Invalid state transition from {from} to {to} for subject {subject}")]
    InvalidTransition {
        /// Subject of the instance
        subject: Subject,
        /// Current status
        from: String,
        /// Attempted status
        to: String,
    },

    /// An event payload does not satisfy the contract for its kind
    #[error("Contract violation on {kind}: {reason}")]
    ContractViolation {
        /// Event kind whose payload was rejected
        kind: String,
        /// Why the payload was rejected
        reason: String,
    },

    /// The initiating event names a version no model is registered for
    #[error("Unsupported version {version} for workflow {workflow}")]
    UnsupportedVersion {
        /// Workflow name
        workflow: String,
        /// Requested version
        version: String,
    },

    /// Persisted state could not be interpreted by the execution model
    #[error("Corrupt workflow state for subject {subject}: {reason}")]
    CorruptState {
        /// Subject of the instance
        subject: Subject,
        /// Decoding failure
        reason: String,
    },
}

impl Violation {
    /// Short machine-readable name of the violation
    pub fn code(&self) -> &'static str {
        match self {
            Violation::OrphanResponse { .. } => "orphan-response",
            Violation::DuplicateInit { .. } => "duplicate-init",
            Violation::InvalidTransition { .. } => "invalid-transition",
            Violation::ContractViolation { .. } => "contract-violation",
            Violation::UnsupportedVersion { .. } => "unsupported-version",
            Violation::CorruptState { .. } => "corrupt-state",
        }
    }

    /// Build a contract violation from a payload decoding failure
    pub fn contract(kind: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Violation::ContractViolation {
            kind: kind.into(),
            reason: err.to_string(),
        }
    }
}

/// Errors raised by an execution model while reducing an event
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The model detected a broken invariant
    #[error(transparent)]
    Violation(#[from] Violation),

    /// The model's handler failed; the workflow is retired as errored
    #[error("Workflow handler failed: {0}")]
    Handler(String),
}

impl ModelError {
    /// Create a handler failure
    pub fn handler(msg: impl Into<String>) -> Self {
        ModelError::Handler(msg.into())
    }
}

/// Errors from a [`crate::persistence::StateStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error from the underlying storage system
    #[error("Storage error: {0}")]
    Storage(String),

    /// Error serializing or deserializing workflow state
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors raised while assembling orchestrators and machines
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A declared contract version has no execution model
    #[error("Missing model for {workflow} version {version}")]
    MissingVersion {
        /// Workflow name
        workflow: String,
        /// Version without a model
        version: String,
    },

    /// A model was registered for a version the contract does not declare
    #[error("Version {version} is not declared by contract {workflow}")]
    UndeclaredVersion {
        /// Workflow name
        workflow: String,
        /// Registered version
        version: String,
    },

    /// A machine or orchestrator definition is incomplete or inconsistent
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Load(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

/// Top-level error returned by `Orchestrator::process`
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Fatal invariant violation
    #[error("Violation: {0}")]
    Violation(#[from] Violation),

    /// State store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl OrchestrationError {
    /// Check if this is a fatal violation
    pub fn is_violation(&self) -> bool {
        matches!(self, OrchestrationError::Violation(_))
    }

    /// The violation, if this is one
    pub fn as_violation(&self) -> Option<&Violation> {
        match self {
            OrchestrationError::Violation(v) => Some(v),
            OrchestrationError::Store(_) => None,
        }
    }
}

/// Errors raised by the in-memory event broker
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A handler reported an orchestration failure
    #[error("Handler {handler} failed: {source}")]
    Handler {
        /// Source name of the failing handler
        handler: String,
        /// The underlying failure
        #[source]
        source: OrchestrationError,
    },

    /// Two handlers were registered under the same source
    #[error("Duplicate handler source: {0}")]
    DuplicateHandler(String),

    /// The broker processed more events than allowed
    #[error("Event budget exhausted after {0} events")]
    Exhausted(usize),
}

impl BrokerError {
    /// The violation behind this error, if any
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            BrokerError::Handler { source, .. } => source.as_violation(),
            _ => None,
        }
    }
}

/// Result type for orchestration operations
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_display_messages() {
        let subject = Subject::from("s-1");

        let err = Violation::OrphanResponse {
            subject: subject.clone(),
            kind: "evt.greeting.create.success".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Orphan response: event evt.greeting.create.success for subject s-1 has no workflow state"
        );

        let err = Violation::DuplicateInit { subject };
        assert_eq!(
            err.to_string(),
            "Duplicate init: subject s-1 already has workflow state"
        );
    }

    #[test]
    fn test_violation_codes() {
        let subject = Subject::from("s");
        assert_eq!(
            Violation::OrphanResponse {
                subject: subject.clone(),
                kind: "k".into()
            }
            .code(),
            "orphan-response"
        );
        assert_eq!(
            Violation::DuplicateInit { subject }.code(),
            "duplicate-init"
        );
        assert_eq!(
            Violation::contract("orc.greeting", "missing field `name`").code(),
            "contract-violation"
        );
    }

    #[test]
    fn test_orchestration_error_classification() {
        let err: OrchestrationError = Violation::DuplicateInit {
            subject: Subject::from("s"),
        }
        .into();
        assert!(err.is_violation());
        assert!(err.as_violation().is_some());

        let err: OrchestrationError = StoreError::Storage("down".into()).into();
        assert!(!err.is_violation());
        assert_eq!(err.to_string(), "Store error: Storage error: down");
    }

    #[test]
    fn test_model_error_from_violation_is_transparent() {
        let v = Violation::contract("orc.greeting", "bad");
        let err: ModelError = v.clone().into();
        assert_eq!(err.to_string(), v.to_string());
    }

    #[test]
    fn test_serde_json_conversion() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{ invalid json }").unwrap_err();
        let err: StoreError = serde_err.into();
        assert!(matches!(err, StoreError::Serialization(msg) if !msg.is_empty()));
    }

    #[test]
    fn test_broker_error_exposes_violation() {
        let err = BrokerError::Handler {
            handler: "orc.greeting".into(),
            source: Violation::DuplicateInit {
                subject: Subject::from("s"),
            }
            .into(),
        };
        assert_eq!(err.violation().map(Violation::code), Some("duplicate-init"));
        assert!(BrokerError::Exhausted(3).violation().is_none());
    }
}
