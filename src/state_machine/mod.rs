// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lifecycle State Machines
//!
//! A resource's lifecycle is a Mealy machine over its provisioning events:
//!
//! ```text
//! (NodeState, LifecycleEvent) → (NodeState, TransitionOutput)
//! ```
//!
//! Transitions are pure. [`ResourceNode`](crate::resource::ResourceNode)
//! owns the current state and applies events under its own lock.

pub mod node_lifecycle;

use serde::{Deserialize, Serialize};

pub use node_lifecycle::{LifecycleEvent, NodeState, TransitionOutput};

/// Result of a lifecycle transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Rejected lifecycle transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum TransitionError {
    #[error("Invalid transition from {from} on {input}")]
    InvalidTransition { from: String, input: String },

    /// Resolved, Failed and Skipped are final for a graph
    #[error("State {0} is terminal")]
    Terminal(String),
}

/// Finite state machine driven by lifecycle events
pub trait StateMachine: Sized + Copy {
    type Input;
    type Output;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Every input this state accepts
    fn accepted_inputs(&self) -> Vec<Self::Input>;

    fn accepts(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// Apply `inputs` in order, stopping at the first rejected one
    fn replay<'a, I>(self, inputs: I) -> TransitionResult<Self>
    where
        I: IntoIterator<Item = &'a Self::Input>,
        Self::Input: 'a,
    {
        inputs
            .into_iter()
            .try_fold(self, |state, input| state.transition(input).map(|(next, _)| next))
    }
}
