// Copyright 2025 Cowboy AI, LLC.

//! # CIM Saga
//!
//! Event-driven saga orchestration for the Composable Information Machine.
//!
//! A workflow instance fans out calls to independent services, correlates
//! their asynchronous responses by subject and produces exactly one terminal
//! output once its completion predicate holds. Two execution models share
//! the same correlation core:
//!
//! - **Parallel machine**: a fixed set of regions, each owning one call,
//!   joined when every region is done ([`machine::ParallelMachine`])
//! - **Resumable**: a step function re-invoked with its context and every
//!   collected response ([`resumable::Resumable`])
//!
//! ## Error Classes
//!
//! 1. **Service errors** are data. They arrive as `sys.*.error` events, are
//!    accumulated per instance and end up in the output's `errors` list.
//! 2. **Violations** mean the orchestration itself is broken (duplicate init,
//!    orphan response, illegal transition). They are returned from
//!    [`Orchestrator::process`] and never emitted as events.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cim_saga::demo::demo_system;
//! use cim_saga::{SagaConfig, Subject, WorkflowEvent};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let demo = demo_system(&SagaConfig::default())?;
//! let init = WorkflowEvent::new("orc.greeting", Subject::new(), json!({"name": "John", "age": 45}))
//!     .with_source("client");
//! if let Some(done) = demo.broker.resolve(init).await? {
//!     println!("{}", done.data["result"]);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod contracts;
mod errors;
mod events;
mod identifiers;
mod instance;
mod services;
pub mod broker;
pub mod config;
pub mod demo;
pub mod engine;
pub mod machine;
pub mod persistence;
pub mod resumable;
pub mod state_machine;

pub use broker::{EventHandler, SimpleEventBroker};
pub use config::{BrokerConfig, FailurePolicy, OrchestratorConfig, RetentionPolicy, SagaConfig};
pub use contracts::{
    system_error_kind, ContractKind, OrchestratorContract, ServiceContract, ORCHESTRATOR_PREFIX,
};
pub use engine::{
    CorrelationEngine, EngineSettings, EngineStep, ExecutionModel, IgnoreReason, Orchestrator,
    OrchestratorBuilder, Reduction, SubjectGuard, SubjectLocks, Transition,
};
pub use errors::{
    BrokerError, ConfigError, ModelError, OrchestrationError, OrchestrationResult, StoreError,
    Violation,
};
pub use events::{ServiceCall, ServiceError, WorkflowEvent, WorkflowOutput};
pub use identifiers::Subject;
pub use instance::{CollectedEvents, OutstandingCall, WorkflowInstance, WorkflowStatus};
pub use machine::{MachineSnapshot, MachineValue, ParallelMachine, Region, RegionState};
pub use persistence::{InMemoryStateStore, StateStore};
pub use resumable::{Resumable, ResumableInput, Resume};
pub use services::SimpleService;
pub use state_machine::{InvalidTransition, State, StateTransitions};
