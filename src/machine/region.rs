// Copyright 2025 Cowboy AI, LLC.

//! One region of a parallel machine

use crate::errors::ModelError;
use crate::events::{ServiceCall, WorkflowEvent};
use crate::state_machine::{State, StateTransitions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Local state of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionState {
    /// Call emitted, waiting for its response
    Init,
    /// Response received
    Done,
    /// The called service failed
    Error,
}

impl State for RegionState {
    fn name(&self) -> &'static str {
        match self {
            RegionState::Init => "init",
            RegionState::Done => "done",
            RegionState::Error => "error",
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, RegionState::Init)
    }
}

impl StateTransitions for RegionState {
    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            RegionState::Init => vec![RegionState::Done, RegionState::Error],
            RegionState::Done | RegionState::Error => vec![],
        }
    }
}

type Entry<C> = Box<dyn Fn(&C) -> Value + Send + Sync>;
type Assign<C> = Box<dyn Fn(&mut C, &WorkflowEvent) -> Result<(), ModelError> + Send + Sync>;

/// A transition out of a region's `init` state
pub(crate) struct RegionTransition<C> {
    pub(crate) kind: String,
    pub(crate) target: RegionState,
    pub(crate) assign: Option<Assign<C>>,
}

/// A region: one call on entry, then a success or error transition
///
/// ```rust
/// use cim_saga::machine::Region;
/// use serde_json::json;
///
/// struct Ctx {
///     name: String,
///     greeting: Option<String>,
/// }
///
/// let greet = Region::new("greet", "com.greeting.create", |ctx: &Ctx| json!({"name": ctx.name}))
///     .on_success("evt.greeting.create.success", |ctx: &mut Ctx, event| {
///         ctx.greeting = event.data["greeting"].as_str().map(str::to_string);
///         Ok(())
///     })
///     .on_error("sys.com.greeting.create.error");
/// assert_eq!(greet.name(), "greet");
/// ```
pub struct Region<C> {
    name: String,
    call_kind: String,
    entry: Entry<C>,
    transitions: Vec<RegionTransition<C>>,
}

impl<C> Region<C> {
    /// Create a region that calls `call_kind` with the payload built by `entry`
    pub fn new<F>(name: impl Into<String>, call_kind: impl Into<String>, entry: F) -> Self
    where
        F: Fn(&C) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            call_kind: call_kind.into(),
            entry: Box::new(entry),
            transitions: Vec::new(),
        }
    }

    /// Move to `done` on `kind`, folding the response into the context
    pub fn on_success<F>(mut self, kind: impl Into<String>, assign: F) -> Self
    where
        F: Fn(&mut C, &WorkflowEvent) -> Result<(), ModelError> + Send + Sync + 'static,
    {
        self.transitions.push(RegionTransition {
            kind: kind.into(),
            target: RegionState::Done,
            assign: Some(Box::new(assign)),
        });
        self
    }

    /// Move to `error` on `kind`; the whole machine fails
    pub fn on_error(mut self, kind: impl Into<String>) -> Self {
        self.transitions.push(RegionTransition {
            kind: kind.into(),
            target: RegionState::Error,
            assign: None,
        });
        self
    }

    /// Region name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of the call emitted on entry
    pub fn call_kind(&self) -> &str {
        &self.call_kind
    }

    pub(crate) fn entry_call(&self, context: &C) -> ServiceCall {
        ServiceCall::new(self.call_kind.clone(), (self.entry)(context))
    }

    pub(crate) fn transitions(&self) -> &[RegionTransition<C>] {
        &self.transitions
    }

    pub(crate) fn transition_for(&self, kind: &str) -> Option<&RegionTransition<C>> {
        self.transitions.iter().find(|t| t.kind == kind)
    }

    pub(crate) fn has_target(&self, target: RegionState) -> bool {
        self.transitions.iter().any(|t| t.target == target)
    }
}

impl<C> fmt::Debug for Region<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("call_kind", &self.call_kind)
            .field(
                "transitions",
                &self
                    .transitions
                    .iter()
                    .map(|t| (t.kind.as_str(), t.target))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
