// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for resource composition
//!
//! Every error the engine can produce lives in [`CompositionError`]. Errors are
//! `Clone` because a failed [`ValueCell`](crate::cell::ValueCell) hands the same
//! error to every subscriber, and `Serialize` because failures end up in the
//! JSON run report.
//!
//! # Propagation
//!
//! - Structural errors (`DuplicateId`, `DanglingReference`, `CycleDetected`)
//!   are returned from graph construction or from `run` before any provisioning.
//! - Per-node errors (`Provision`, `UpstreamFailed`, `Derivation`,
//!   `MissingOutput`) are recorded in the run report and never abort siblings.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::state_machine::TransitionError;

/// Errors that can occur while declaring, resolving, or running a graph
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "detail", rename_all = "snake_case")]
pub enum CompositionError {
    /// A resource or group with this id is already registered
    #[error("Duplicate id: {id}")]
    DuplicateId { id: String },

    /// A reference points at a resource that is not registered
    #[error("Dangling reference from {from} to unregistered {target}")]
    DanglingReference { from: String, target: String },

    /// The dependency graph contains a cycle
    #[error("Cycle detected: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    /// A referenced output cell has not been resolved yet
    #[error("Input {input} of {node} is not ready: {upstream} has not resolved")]
    InputNotReady {
        node: String,
        input: String,
        upstream: String,
    },

    /// A dependency of this resource failed
    #[error("Upstream resource {upstream} failed")]
    UpstreamFailed { upstream: String },

    /// Outputs were already published for this resource
    #[error("Outputs already published for {node}")]
    OutputAlreadyPublished { node: String },

    /// A value cell was assigned twice
    #[error("Value cell already resolved")]
    AlreadyResolved,

    /// The provisioner did not return an output that something references
    #[error("Resource {node} did not produce output {output}")]
    MissingOutput { node: String, output: String },

    /// Lookup of a resource id that is not in the graph
    #[error("Unknown resource: {id}")]
    UnknownResource { id: String },

    /// The graph was frozen by a topological ordering request
    #[error("Graph is frozen, cannot declare {id}")]
    GraphFrozen { id: String },

    /// A resource was placed into two composite groups
    #[error("Resource {member} already belongs to group {group}")]
    GroupConflict { member: String, group: String },

    /// The provisioner rejected the resource
    #[error("Provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    /// The run was cancelled before this resource started
    #[error("Cancelled")]
    Cancelled,

    /// A derived value or template could not be computed
    #[error("Derivation failed: {0}")]
    Derivation(String),

    /// Configuration is missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An identifier failed validation
    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    /// A lifecycle transition was not allowed
    #[error("Lifecycle error: {0}")]
    Transition(#[from] TransitionError),
}

/// Result type for composition operations
pub type CompositionResult<T> = Result<T, CompositionError>;

impl CompositionError {
    /// Whether this error is structural and must stop a run before it starts
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CompositionError::DuplicateId { .. }
                | CompositionError::DanglingReference { .. }
                | CompositionError::CycleDetected { .. }
        )
    }
}

impl From<serde_json::Error> for CompositionError {
    fn from(err: serde_json::Error) -> Self {
        CompositionError::Configuration(err.to_string())
    }
}

/// Category of a provisioner failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionErrorKind {
    /// Backend refused the request (validation, quota, conflict)
    Rejected,
    /// Backend could not be reached
    Unavailable,
    /// Backend did not answer in time
    Timeout,
    /// No backend handles this type tag
    UnsupportedType,
    /// Anything else
    Internal,
}

impl fmt::Display for ProvisionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionErrorKind::Rejected => "rejected",
            ProvisionErrorKind::Unavailable => "unavailable",
            ProvisionErrorKind::Timeout => "timeout",
            ProvisionErrorKind::UnsupportedType => "unsupported_type",
            ProvisionErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Opaque failure payload returned by a provisioner
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ProvisionError {
    pub kind: ProvisionErrorKind,
    pub message: String,
}

impl ProvisionError {
    pub fn new(kind: ProvisionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ProvisionErrorKind::Rejected, message)
    }

    pub fn unsupported(type_tag: &str) -> Self {
        Self::new(
            ProvisionErrorKind::UnsupportedType,
            format!("no provisioner registered for type '{}'", type_tag),
        )
    }
}
