// Copyright 2025 Cowboy AI, LLC.

//! Orchestration engine
//!
//! Both execution models, the parallel machine and the resumable step
//! function, are reducers of the same shape: given the prior context and the
//! event that just arrived, produce the next context plus either more calls
//! or a terminal output. [`ExecutionModel`] is that shape.
//!
//! - [`CorrelationEngine`]: pure decision logic (orphan/duplicate detection,
//!   response bookkeeping, output synthesis)
//! - [`SubjectLocks`]: per-subject critical sections
//! - [`Orchestrator`]: load → decide → save around the engine; the `process`
//!   entry point the router calls

mod correlation;
mod locks;
mod orchestrator;

pub use correlation::{CorrelationEngine, EngineSettings, EngineStep, IgnoreReason};
pub use locks::{SubjectGuard, SubjectLocks};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};

use crate::contracts::ServiceContract;
use crate::errors::ModelError;
use crate::events::{ServiceCall, ServiceError, WorkflowEvent, WorkflowOutput};
use crate::identifiers::Subject;
use crate::instance::CollectedEvents;
use serde_json::Value;

/// Everything a model sees when reducing one event
#[derive(Debug, Clone, Copy)]
pub struct Reduction<'a> {
    /// Subject of the instance
    pub subject: &'a Subject,
    /// The initiating event (first invocation only)
    pub init: Option<&'a WorkflowEvent>,
    /// The persisted context (absent only on the first invocation)
    pub context: Option<&'a Value>,
    /// The response that triggered this invocation
    pub service: Option<&'a WorkflowEvent>,
    /// All responses collected so far, including `service`
    pub collected: &'a CollectedEvents,
    /// Service errors recorded so far
    pub errors: &'a [ServiceError],
}

/// Result of reducing one event
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Stay pending with a new context, emitting zero or more calls
    Continue {
        /// Context to persist
        context: Value,
        /// Calls to dispatch
        calls: Vec<ServiceCall>,
    },
    /// Retire the instance with an output
    Finish {
        /// Final context
        context: Value,
        /// Success or failure payload
        output: WorkflowOutput,
    },
}

/// A versioned reducer driving one workflow kind
pub trait ExecutionModel: Send + Sync {
    /// Contract version implemented by this model
    fn version(&self) -> &str;

    /// Contracts of every service this model may call
    fn services(&self) -> &[ServiceContract];

    /// Reduce one event into the next transition
    fn reduce(&self, reduction: Reduction<'_>) -> Result<Transition, ModelError>;

    /// The contract accepting `kind`, if declared
    fn service_for_call(&self, kind: &str) -> Option<&ServiceContract> {
        self.services().iter().find(|c| c.accepts() == kind)
    }

    /// The contract answered by `kind`, if declared
    fn service_for_response(&self, kind: &str) -> Option<&ServiceContract> {
        self.services().iter().find(|c| c.resolves(kind))
    }
}

/// Compare dotted version strings numerically, falling back to text order
pub(crate) fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |v: &str| {
        v.split('.')
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .ok()
    };
    match (parse(a), parse(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_compare_versions_is_numeric() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("beta", "alpha"), Ordering::Greater);
    }
}
