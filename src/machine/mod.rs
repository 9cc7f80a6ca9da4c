// Copyright 2025 Cowboy AI, LLC.

//! Declarative execution model: parallel state regions
//!
//! The machine is `process (parallel) → done | error`. Entering `process`
//! puts every region in `init`, which emits that region's single call. The
//! machine is `done` once every region is `done`; the first region to reach
//! `error` sends the whole machine to `error` and later responses are
//! dropped by the correlation engine.

mod region;

pub use region::{Region, RegionState};

use crate::contracts::{OrchestratorContract, ServiceContract};
use crate::engine::{ExecutionModel, Reduction, Transition};
use crate::errors::{ConfigError, ModelError, Violation};
use crate::events::{ServiceError, WorkflowOutput};
use crate::identifiers::Subject;
use crate::state_machine::StateTransitions;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::marker::PhantomData;
use tracing::debug;

/// Top-level state of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineValue {
    /// Regions are running
    Process,
    /// Every region finished
    Done,
    /// A region failed
    Error,
}

/// Persisted machine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot<C> {
    /// Typed context
    pub context: C,
    /// Local state of every region, in declaration order
    pub regions: IndexMap<String, RegionState>,
    /// Errors that sent a region to `error`
    pub errors: Vec<ServiceError>,
    /// Top-level state
    pub value: MachineValue,
}

impl<C> MachineSnapshot<C> {
    /// Whether every region is done
    pub fn all_done(&self) -> bool {
        self.regions.values().all(|s| *s == RegionState::Done)
    }
}

type InitFn<I, C> = Box<dyn Fn(I) -> Result<C, ModelError> + Send + Sync>;
type OutputFn<C> = Box<dyn Fn(&C) -> Result<Value, ModelError> + Send + Sync>;

/// A parallel machine over typed init payload `I` and context `C`
pub struct ParallelMachine<I, C> {
    workflow: String,
    version: String,
    services: Vec<ServiceContract>,
    init: InitFn<I, C>,
    regions: Vec<Region<C>>,
    output: OutputFn<C>,
    _input: PhantomData<fn(I)>,
}

impl<I, C> ParallelMachine<I, C>
where
    I: DeserializeOwned,
    C: Serialize + DeserializeOwned,
{
    /// Start building version `version` of `contract`
    pub fn builder(contract: &OrchestratorContract, version: &str) -> ParallelMachineBuilder<I, C> {
        ParallelMachineBuilder {
            workflow: contract.name().to_string(),
            declared: contract.versions().to_vec(),
            version: version.to_string(),
            services: Vec::new(),
            init: None,
            regions: Vec::new(),
            output: None,
        }
    }

    /// Regions in declaration order
    pub fn regions(&self) -> &[Region<C>] {
        &self.regions
    }

    fn start(&self, input: I) -> Result<Transition, ModelError> {
        let context = (self.init)(input)?;
        let calls = self.regions.iter().map(|r| r.entry_call(&context)).collect();
        let snapshot = MachineSnapshot {
            context,
            regions: self
                .regions
                .iter()
                .map(|r| (r.name().to_string(), RegionState::Init))
                .collect(),
            errors: Vec::new(),
            value: MachineValue::Process,
        };
        Ok(Transition::Continue {
            context: self.encode(&snapshot)?,
            calls,
        })
    }

    fn step(&self, subject: &Subject, raw: &Value, r: &Reduction<'_>) -> Result<Transition, ModelError> {
        let mut snapshot: MachineSnapshot<C> =
            serde_json::from_value(raw.clone()).map_err(|e| Violation::CorruptState {
                subject: subject.clone(),
                reason: e.to_string(),
            })?;

        let Some(event) = r.service else {
            return Ok(unchanged(raw));
        };
        if snapshot.value != MachineValue::Process {
            return Ok(unchanged(raw));
        }

        let matched = self.regions.iter().find_map(|region| {
            let state = snapshot.regions.get(region.name()).copied()?;
            if state != RegionState::Init {
                return None;
            }
            region.transition_for(&event.kind).map(|t| (region, state, t))
        });
        let Some((region, state, transition)) = matched else {
            debug!(subject = %subject, kind = %event.kind, "No region listens for event");
            return Ok(unchanged(raw));
        };

        let next = state
            .transition_to(transition.target)
            .map_err(|t| Violation::InvalidTransition {
                subject: subject.clone(),
                from: t.from.to_string(),
                to: t.to.to_string(),
            })?;
        snapshot.regions.insert(region.name().to_string(), next);
        debug!(subject = %subject, region = region.name(), state = ?next, "Region transitioned");

        match next {
            RegionState::Error => {
                let error = event.service_error().unwrap_or_else(|| {
                    ServiceError::from_message(format!("region {} failed on {}", region.name(), event.kind))
                });
                snapshot.errors.push(error);
                snapshot.value = MachineValue::Error;
                let output = WorkflowOutput::failure(snapshot.errors.clone());
                Ok(Transition::Finish {
                    context: self.encode(&snapshot)?,
                    output,
                })
            }
            _ => {
                if let Some(assign) = &transition.assign {
                    assign(&mut snapshot.context, event)?;
                }
                if snapshot.all_done() {
                    snapshot.value = MachineValue::Done;
                    let result = (self.output)(&snapshot.context)?;
                    return Ok(Transition::Finish {
                        context: self.encode(&snapshot)?,
                        output: WorkflowOutput::success(result),
                    });
                }
                Ok(Transition::Continue {
                    context: self.encode(&snapshot)?,
                    calls: Vec::new(),
                })
            }
        }
    }

    fn encode(&self, snapshot: &MachineSnapshot<C>) -> Result<Value, ModelError> {
        serde_json::to_value(snapshot)
            .map_err(|e| ModelError::handler(format!("{} context is not serializable: {e}", self.workflow)))
    }
}

fn unchanged(context: &Value) -> Transition {
    Transition::Continue {
        context: context.clone(),
        calls: Vec::new(),
    }
}

impl<I, C> ExecutionModel for ParallelMachine<I, C>
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
        if let Some(init) = r.init {
            return self.start(init.data_as()?);
        }
        match r.context {
            Some(raw) => self.step(r.subject, raw, &r),
            None => Err(Violation::CorruptState {
                subject: r.subject.clone(),
                reason: "response reached a machine without context".to_string(),
            }
            .into()),
        }
    }
}

/// Builder for [`ParallelMachine`]
pub struct ParallelMachineBuilder<I, C> {
    workflow: String,
    declared: Vec<String>,
    version: String,
    services: Vec<ServiceContract>,
    init: Option<InitFn<I, C>>,
    regions: Vec<Region<C>>,
    output: Option<OutputFn<C>>,
}

impl<I, C> ParallelMachineBuilder<I, C>
where
    I: DeserializeOwned,
    C: Serialize + DeserializeOwned,
{
    /// Declare a service the regions may call
    pub fn service(mut self, contract: ServiceContract) -> Self {
        self.services.push(contract);
        self
    }

    /// Build the initial context from the init payload
    pub fn context<F>(mut self, init: F) -> Self
    where
        F: Fn(I) -> Result<C, ModelError> + Send + Sync + 'static,
    {
        self.init = Some(Box::new(init));
        self
    }

    /// Add a region
    pub fn region(mut self, region: Region<C>) -> Self {
        self.regions.push(region);
        self
    }

    /// Build the success payload from the final context
    pub fn output<F>(mut self, output: F) -> Self
    where
        F: Fn(&C) -> Result<Value, ModelError> + Send + Sync + 'static,
    {
        self.output = Some(Box::new(output));
        self
    }

    /// Validate and build the machine
    pub fn build(self) -> Result<ParallelMachine<I, C>, ConfigError> {
        let invalid = |msg: String| ConfigError::InvalidDefinition(format!("{}: {msg}", self.workflow));

        if !self.declared.contains(&self.version) {
            return Err(ConfigError::UndeclaredVersion {
                workflow: self.workflow.clone(),
                version: self.version.clone(),
            });
        }
        if self.regions.is_empty() {
            return Err(invalid("a parallel machine needs at least one region".into()));
        }

        let mut names = HashSet::new();
        for region in &self.regions {
            if !names.insert(region.name()) {
                return Err(invalid(format!("duplicate region {}", region.name())));
            }
            if !self.services.iter().any(|s| s.accepts() == region.call_kind()) {
                return Err(invalid(format!(
                    "region {} calls undeclared service {}",
                    region.name(),
                    region.call_kind()
                )));
            }
            if !region.has_target(RegionState::Done) || !region.has_target(RegionState::Error) {
                return Err(invalid(format!(
                    "region {} needs both a success and an error transition",
                    region.name()
                )));
            }
            if let Some(t) = region
                .transitions()
                .iter()
                .find(|t| !self.services.iter().any(|s| s.resolves(&t.kind)))
            {
                return Err(invalid(format!(
                    "region {} listens for {} which no declared service emits",
                    region.name(),
                    t.kind
                )));
            }
        }

        let Some(init) = self.init else {
            return Err(invalid("missing context factory".into()));
        };
        let Some(output) = self.output else {
            return Err(invalid("missing output function".into()));
        };

        Ok(ParallelMachine {
            workflow: self.workflow,
            version: self.version,
            services: self.services,
            init,
            regions: self.regions,
            output,
            _input: PhantomData,
        })
    }
}
