// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run Report
//!
//! Aggregate result of one composition run, shaped for a plan/apply report:
//!
//! ```json
//! {
//!   "run_id": "0193…",
//!   "succeeded": ["rg", "vnet"],
//!   "failed": [{ "id": "cache", "error": { "error": "provision", "detail": { … } } }],
//!   "skipped": [{ "id": "secrets", "reason": { "kind": "upstream_failed", "upstream": "cache" } }],
//!   "outputs": { "redisCacheHostname": "…" }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::cell::CellState;
use crate::errors::{CompositionError, CompositionResult};
use crate::resource::ResourceNode;
use crate::state_machine::NodeState;
use crate::value::ResourceId;

/// Why a node was not provisioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// A dependency failed or was itself skipped
    UpstreamFailed { upstream: String },
    /// The run was cancelled before the node started
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UpstreamFailed { upstream } => write!(f, "upstream {} failed", upstream),
            SkipReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedResource {
    pub id: ResourceId,
    pub error: CompositionError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedResource {
    pub id: ResourceId,
    pub reason: SkipReason,
}

/// Outcome of a single node within a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Succeeded,
    Failed(CompositionError),
    Skipped(SkipReason),
}

impl NodeOutcome {
    /// Outcome already recorded on a node in a terminal state
    ///
    /// Returns `None` for nodes that still have work to do, including
    /// nodes cancelled by an earlier run.
    pub fn recorded(node: &ResourceNode) -> Option<Self> {
        match node.state() {
            NodeState::Resolved => Some(NodeOutcome::Succeeded),
            NodeState::Failed => Some(NodeOutcome::Failed(recorded_error(node))),
            NodeState::Skipped => match recorded_error(node) {
                CompositionError::UpstreamFailed { upstream } => {
                    Some(NodeOutcome::Skipped(SkipReason::UpstreamFailed { upstream }))
                }
                other => Some(NodeOutcome::Failed(other)),
            },
            _ => None,
        }
    }
}

fn recorded_error(node: &ResourceNode) -> CompositionError {
    match node.record().state() {
        CellState::Failed(error) => error,
        // Terminal failures always fail the record before the state changes
        _ => CompositionError::Derivation(format!("no recorded error for {}", node.id())),
    }
}

/// Aggregate result of [`CompositionEngine::run`](super::CompositionEngine::run)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: Vec<ResourceId>,
    pub failed: Vec<FailedResource>,
    pub skipped: Vec<SkippedResource>,
    /// Resolved stack exports, secrets masked
    pub outputs: BTreeMap<String, Value>,
}

impl RunReport {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at,
            finished_at: started_at,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub(crate) fn record(&mut self, id: ResourceId, outcome: NodeOutcome) {
        match outcome {
            NodeOutcome::Succeeded => self.succeeded.push(id),
            NodeOutcome::Failed(error) => self.failed.push(FailedResource { id, error }),
            NodeOutcome::Skipped(reason) => self.skipped.push(SkippedResource { id, reason }),
        }
    }

    /// Every node succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        self.skipped
            .iter()
            .any(|skipped| skipped.reason == SkipReason::Cancelled)
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    pub fn failure_of(&self, id: &ResourceId) -> Option<&CompositionError> {
        self.failed
            .iter()
            .find(|failed| &failed.id == id)
            .map(|failed| &failed.error)
    }

    pub fn skip_reason_of(&self, id: &ResourceId) -> Option<&SkipReason> {
        self.skipped
            .iter()
            .find(|skipped| &skipped.id == id)
            .map(|skipped| &skipped.reason)
    }

    /// Same outcomes and outputs, ignoring run id and timestamps
    pub fn same_outcome(&self, other: &RunReport) -> bool {
        self.succeeded == other.succeeded
            && self.failed == other.failed
            && self.skipped == other.skipped
            && self.outputs == other.outputs
    }

    pub fn to_json(&self) -> CompositionResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
