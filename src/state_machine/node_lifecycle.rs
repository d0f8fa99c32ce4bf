// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Node Lifecycle State Machine
//!
//! Mealy machine tracking one resource node through a composition run.
//!
//! # States
//!
//! - Unregistered: declared but not yet part of a graph
//! - Registered: in a graph, waiting for its turn
//! - Resolving: input snapshot is being built, or waiting for a worker
//! - Provisioning: the provisioner call is in flight
//! - Resolved: outputs published (terminal)
//! - Failed: provisioning or input derivation failed (terminal)
//! - Skipped: an upstream resource failed (terminal)
//! - Cancelled: the run was cancelled before the provisioner was called
//!
//! `Cancelled` is the only non-terminal end state of a run. A later run picks
//! the node up again via `BeginResolve`.
//!
//! ```text
//! Unregistered ─Register→ Registered ─BeginResolve→ Resolving ─InputsResolved→ Provisioning
//!                    │                                  │                          │
//!                  Cancel                     UpstreamFailed / ResolveFailed   Succeeded / Failed
//!                    ▼                                  ▼                          ▼
//!                Cancelled                       Skipped / Failed          Resolved / Failed
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// Lifecycle state of a resource node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Unregistered,
    Registered,
    Resolving,
    Provisioning,
    Resolved,
    Failed,
    Skipped,
    Cancelled,
}

impl NodeState {
    /// Terminal states are never left again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeState::Resolved | NodeState::Failed | NodeState::Skipped
        )
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Lifecycle input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Node was added to a graph
    Register,
    /// Engine started building the input snapshot
    BeginResolve,
    /// Every input resolved to a literal
    InputsResolved,
    /// A dependency failed, the node will not be provisioned
    UpstreamFailed,
    /// An input could not be derived
    ResolveFailed,
    /// Provisioner returned outputs
    ProvisionSucceeded,
    /// Provisioner returned an error
    ProvisionFailed,
    /// Run cancelled before this node started
    Cancel,
}

/// Transition output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutput {
    /// Whether the new state ends the node's lifecycle
    pub terminal: bool,
}

impl TransitionOutput {
    fn to(state: NodeState) -> Self {
        Self {
            terminal: state.is_terminal(),
        }
    }
}

impl StateMachine for NodeState {
    type Input = LifecycleEvent;
    type Output = TransitionOutput;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use LifecycleEvent::*;
        use NodeState::*;

        if self.is_terminal() {
            return Err(TransitionError::Terminal(self.to_string()));
        }

        let next = match (self, input) {
            (Unregistered, Register) => Registered,

            (Registered | Cancelled, BeginResolve) => Resolving,
            (Registered | Resolving | Cancelled, Cancel) => Cancelled,

            (Resolving, InputsResolved) => Provisioning,
            (Resolving, UpstreamFailed) => Skipped,
            (Resolving, ResolveFailed) => Failed,

            (Provisioning, ProvisionSucceeded) => Resolved,
            (Provisioning, ProvisionFailed) => Failed,

            (state, event) => {
                return Err(TransitionError::InvalidTransition {
                    from: state.to_string(),
                    input: format!("{:?}", event),
                })
            }
        };

        Ok((next, TransitionOutput::to(next)))
    }

    fn accepted_inputs(&self) -> Vec<Self::Input> {
        use LifecycleEvent::*;
        use NodeState::*;

        match self {
            Unregistered => vec![Register],
            Registered | Cancelled => vec![BeginResolve, Cancel],
            Resolving => vec![InputsResolved, UpstreamFailed, ResolveFailed, Cancel],
            Provisioning => vec![ProvisionSucceeded, ProvisionFailed],
            Resolved | Failed | Skipped => vec![],
        }
    }
}
