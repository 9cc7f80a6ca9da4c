// Copyright 2025 Cowboy AI, LLC.

//! Imperative execution model: a resumable step function
//!
//! The handler is re-invoked for every relevant event with the typed context
//! it returned last time and every response collected so far. It decides on
//! its own when it has enough to finish.

use crate::contracts::{OrchestratorContract, ServiceContract};
use crate::engine::{ExecutionModel, Reduction, Transition};
use crate::errors::{ConfigError, ModelError, Violation};
use crate::events::{ServiceCall, ServiceError, WorkflowEvent, WorkflowOutput};
use crate::identifiers::Subject;
use crate::instance::CollectedEvents;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

/// What the handler sees on one invocation
#[derive(Debug)]
pub struct ResumableInput<'a, I, C> {
    /// Subject of this instance
    pub subject: &'a Subject,
    /// The typed init payload (first invocation only)
    pub input: Option<I>,
    /// The context returned by the previous invocation
    pub context: Option<C>,
    /// The response that triggered this invocation
    pub service: Option<&'a WorkflowEvent>,
    /// Every response collected so far
    pub collected: &'a CollectedEvents,
}

/// The handler's decision
#[derive(Debug, Clone, PartialEq)]
pub enum Resume<C> {
    /// Keep waiting with the current context
    Wait,
    /// Replace the context and emit calls
    Continue {
        /// New context
        context: C,
        /// Calls to dispatch
        calls: Vec<ServiceCall>,
    },
    /// Finish with an output
    Complete(WorkflowOutput),
    /// Finish with errors
    Fail(Vec<ServiceError>),
}

type Handler<I, C> =
    Box<dyn for<'a> Fn(ResumableInput<'a, I, C>) -> Result<Resume<C>, ModelError> + Send + Sync>;

/// Step-function model over typed init payload `I` and context `C`
pub struct Resumable<I, C> {
    version: String,
    services: Vec<ServiceContract>,
    handler: Handler<I, C>,
    _types: PhantomData<fn(I) -> C>,
}

impl<I, C> Resumable<I, C>
where
    I: DeserializeOwned,
    C: Serialize + DeserializeOwned,
{
    /// Create version `version` of `contract`
    pub fn new<F>(
        contract: &OrchestratorContract,
        version: &str,
        services: Vec<ServiceContract>,
        handler: F,
    ) -> Result<Self, ConfigError>
    where
        F: for<'a> Fn(ResumableInput<'a, I, C>) -> Result<Resume<C>, ModelError> + Send + Sync + 'static,
    {
        if !contract.versions().iter().any(|v| v == version) {
            return Err(ConfigError::UndeclaredVersion {
                workflow: contract.name().to_string(),
                version: version.to_string(),
            });
        }
        Ok(Self {
            version: version.to_string(),
            services,
            handler: Box::new(handler),
            _types: PhantomData,
        })
    }

    fn decode(&self, subject: &Subject, raw: Option<&Value>) -> Result<Option<C>, Violation> {
        raw.map(|value| {
            serde_json::from_value(value.clone()).map_err(|e| Violation::CorruptState {
                subject: subject.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    fn encode(&self, subject: &Subject, context: &C) -> Result<Value, Violation> {
        serde_json::to_value(context).map_err(|e| Violation::CorruptState {
            subject: subject.clone(),
            reason: e.to_string(),
        })
    }
}

impl<I, C> ExecutionModel for Resumable<I, C>
where
    I: DeserializeOwned,
    C: Serialize + DeserializeOwned,
{
    fn version(&self) -> &str {
        &self.version
    }

    fn services(&self) -> &[ServiceContract] {
        &self.services
    }

    fn reduce(&self, r: Reduction<'_>) -> Result<Transition, ModelError> {
        let input = r.init.map(WorkflowEvent::data_as::<I>).transpose()?;
        let prior = r.context.cloned().unwrap_or(Value::Null);
        let context = match r.init {
            Some(_) => None,
            None => self.decode(r.subject, r.context)?,
        };

        let decision = (self.handler)(ResumableInput {
            subject: r.subject,
            input,
            context,
            service: r.service,
            collected: r.collected,
        })?;

        match decision {
            Resume::Wait if r.init.is_some() => Err(ModelError::handler(
                "the first invocation must build a context",
            )),
            Resume::Wait => Ok(Transition::Continue {
                context: prior,
                calls: Vec::new(),
            }),
            Resume::Continue { context, calls } => Ok(Transition::Continue {
                context: self.encode(r.subject, &context)?,
                calls,
            }),
            Resume::Complete(output) => Ok(Transition::Finish {
                context: prior,
                output,
            }),
            Resume::Fail(errors) => Ok(Transition::Finish {
                context: prior,
                output: WorkflowOutput::failure(errors),
            }),
        }
    }
}
