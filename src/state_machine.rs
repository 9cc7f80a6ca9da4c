// Copyright 2025 Cowboy AI, LLC.

//! State traits shared by workflow automata
//!
//! Both the lifecycle of a workflow instance and the local automaton of every
//! parallel region are small enum-based state machines. They share the same
//! shape: a named state, an explicit set of legal successors and a notion of
//! terminality after which nothing may change.

use std::fmt::Debug;

/// Trait for types that can be used as states in a state machine
pub trait State: Debug + Clone + PartialEq + Eq + Send + Sync {
    /// Get the name of this state for logging/debugging
    fn name(&self) -> &'static str;

    /// Check if this is a terminal state
    fn is_terminal(&self) -> bool {
        false
    }
}

/// Transition table of a state type
///
/// # Examples
///
/// ```rust
/// use cim_saga::state_machine::{State, StateTransitions};
///
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// enum Door {
///     Open,
///     Closed,
/// }
///
/// impl State for Door {
///     fn name(&self) -> &'static str {
///         match self {
///             Door::Open => "Open",
///             Door::Closed => "Closed",
///         }
///     }
/// }
///
/// impl StateTransitions for Door {
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Door::Open => vec![Door::Closed],
///             Door::Closed => vec![Door::Open],
///         }
///     }
/// }
///
/// assert!(Door::Open.can_transition_to(&Door::Closed));
/// assert!(Door::Open.transition_to(Door::Open).is_err());
/// ```
pub trait StateTransitions: State {
    /// Get all valid target states from this state
    fn valid_transitions(&self) -> Vec<Self>;

    /// Check if a transition to the target state is valid
    fn can_transition_to(&self, target: &Self) -> bool {
        !self.is_terminal() && self.valid_transitions().contains(target)
    }

    /// Move to `target`, returning the rejected pair on an illegal transition
    fn transition_to(&self, target: Self) -> Result<Self, InvalidTransition> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(InvalidTransition {
                from: self.name(),
                to: target.name(),
            })
        }
    }
}

/// A rejected transition between two named states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    /// Current state name
    pub from: &'static str,
    /// Attempted state name
    pub to: &'static str,
}
