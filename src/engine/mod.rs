// Copyright (c) 2025 - Cowboy AI, Inc.
//! Composition Engine
//!
//! Walks a [`DependencyGraph`] level by level, builds each node's input
//! snapshot from upstream outputs, hands it to a [`Provisioner`] and
//! publishes the outputs it returns.
//!
//! # Scheduling
//!
//! ```text
//! level 0   rg ─────────────┐
//!                           ▼
//! level 1   vnet          plan        (run concurrently, bounded by
//!             │             │          EngineConfig::max_concurrency)
//!             ▼             ▼
//! level 2   subnet ───────▶ app
//! ```
//!
//! A node's level is one more than the deepest of its dependencies, so every
//! node in a level only reads cells settled by earlier levels. Input
//! snapshots are taken on the engine task; only the provisioner call runs on
//! a worker.
//!
//! # Failure policy
//!
//! - A provisioning failure fails the node's cells. Its dependents observe
//!   `UpstreamFailed` and are reported as skipped; unrelated branches carry on.
//! - Nothing is rolled back.
//! - Cancellation stops nodes that have not reached the provisioner. In-flight
//!   calls finish and their outcome is recorded. Cancelled nodes keep their
//!   cells unresolved and are picked up by the next `run`.
//! - Nodes that already reached a terminal state are reported again without
//!   calling the provisioner, which makes a repeated `run` a no-op.

pub mod report;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::errors::{CompositionError, CompositionResult, ProvisionError, ProvisionErrorKind};
use crate::graph::DependencyGraph;
use crate::provisioner::{ProvisionRequest, Provisioner};
use crate::resource::{ResolvedInputs, ResourceNode};
use crate::state_machine::{LifecycleEvent, NodeState};
use crate::value::ResourceId;

pub use report::{FailedResource, NodeOutcome, RunReport, SkipReason, SkippedResource};

/// Runs dependency graphs against a provisioner
#[derive(Clone)]
pub struct CompositionEngine {
    provisioner: Arc<dyn Provisioner>,
    config: EngineConfig,
}

impl CompositionEngine {
    /// Engine with default configuration: unbounded width, best effort
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self::with_config(provisioner, EngineConfig::default())
    }

    pub fn with_config(provisioner: Arc<dyn Provisioner>, config: EngineConfig) -> Self {
        Self {
            provisioner,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Provision every node of `graph`
    ///
    /// Structural errors (`CycleDetected`) are returned before the provisioner
    /// is called. Per-node failures end up in the report.
    pub async fn run(&self, graph: &DependencyGraph) -> CompositionResult<RunReport> {
        self.run_with_cancellation(graph, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), stopping early when `cancel` fires
    pub async fn run_with_cancellation(
        &self,
        graph: &DependencyGraph,
        cancel: CancellationToken,
    ) -> CompositionResult<RunReport> {
        let mut report = RunReport::new(Utc::now());
        let order = graph.topological_order()?;
        let levels = graph.levels()?;
        info!(
            "Starting run {} over {} resources in {} levels",
            report.run_id,
            order.len(),
            levels.len()
        );

        // fail_fast cancels this child, never the caller's token
        let cancel = cancel.child_token();
        let semaphore = self
            .config
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        let mut outcomes: HashMap<ResourceId, NodeOutcome> = HashMap::with_capacity(order.len());

        for (depth, level) in levels.iter().enumerate() {
            debug!("Level {}: {} resources", depth, level.len());
            let mut workers = JoinSet::new();
            let mut started = Vec::new();

            for id in level {
                let node = Arc::clone(graph.require(id)?);

                if let Some(outcome) = NodeOutcome::recorded(&node) {
                    debug!("{} is already {}, reusing its outcome", id, node.state());
                    outcomes.insert(id.clone(), outcome);
                    continue;
                }
                if cancel.is_cancelled() {
                    outcomes.insert(id.clone(), cancel_node(&node));
                    continue;
                }

                let snapshot = node
                    .advance(LifecycleEvent::BeginResolve)
                    .and_then(|_| node.input_snapshot(graph));
                match snapshot {
                    Ok(inputs) => {
                        started.push(id.clone());
                        workers.spawn(provision_node(
                            node,
                            inputs,
                            Arc::clone(&self.provisioner),
                            semaphore.clone(),
                            cancel.clone(),
                        ));
                    }
                    Err(error) => {
                        outcomes.insert(id.clone(), reject_node(&node, error));
                    }
                }
            }

            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok((id, outcome)) => {
                        outcomes.insert(id, outcome);
                    }
                    Err(join_error) => warn!("Provisioning task ended abnormally: {}", join_error),
                }
            }

            for id in started {
                if outcomes.contains_key(&id) {
                    continue;
                }
                let error = CompositionError::Provision(ProvisionError::new(
                    ProvisionErrorKind::Internal,
                    "provisioning task aborted",
                ));
                let node = graph.require(&id)?;
                if let Err(e) = node.fail_outputs(error.clone()) {
                    debug!("{}: {}", id, e);
                }
                let event = match node.state() {
                    NodeState::Resolving => LifecycleEvent::ResolveFailed,
                    _ => LifecycleEvent::ProvisionFailed,
                };
                advance_or_log(node, event);
                outcomes.insert(id, NodeOutcome::Failed(error));
            }

            let level_failed = level
                .iter()
                .any(|id| matches!(outcomes.get(id), Some(NodeOutcome::Failed(_))));
            if self.config.fail_fast && level_failed && !cancel.is_cancelled() {
                warn!("Failure at level {} with fail_fast set, cancelling remaining resources", depth);
                cancel.cancel();
            }
        }

        for id in order {
            if let Some(outcome) = outcomes.remove(&id) {
                report.record(id, outcome);
            }
        }
        report.outputs = graph.resolved_exports();
        report.finished_at = Utc::now();

        info!(
            "Run {} finished: {} succeeded, {} failed, {} skipped",
            report.run_id,
            report.succeeded.len(),
            report.failed.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

/// Worker body: wait for a permit, then call the provisioner
async fn provision_node(
    node: Arc<ResourceNode>,
    inputs: ResolvedInputs,
    provisioner: Arc<dyn Provisioner>,
    semaphore: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
) -> (ResourceId, NodeOutcome) {
    let id = node.id().clone();

    let _permit = match semaphore {
        Some(semaphore) => tokio::select! {
            biased;
            _ = cancel.cancelled() => return (id, cancel_node(&node)),
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => Some(permit),
                Err(_) => return (id, cancel_node(&node)),
            },
        },
        None => None,
    };
    if cancel.is_cancelled() {
        return (id, cancel_node(&node));
    }

    if let Err(error) = node.advance(LifecycleEvent::InputsResolved) {
        return (id, NodeOutcome::Failed(error));
    }

    let request = ProvisionRequest {
        id: id.clone(),
        type_tag: node.type_tag().clone(),
        inputs,
    };
    debug!("Provisioning {} ({}) with {:?}", id, request.type_tag, request.inputs);

    let outcome = match provisioner.provision(&request).await {
        Ok(outputs) => match node.publish_outputs(outputs) {
            Ok(()) => {
                advance_or_log(&node, LifecycleEvent::ProvisionSucceeded);
                info!("Provisioned {} ({})", id, request.type_tag);
                NodeOutcome::Succeeded
            }
            Err(error) => {
                advance_or_log(&node, LifecycleEvent::ProvisionFailed);
                warn!("Could not publish outputs of {}: {}", id, error);
                NodeOutcome::Failed(error)
            }
        },
        Err(provision_error) => {
            let error = CompositionError::Provision(provision_error);
            if let Err(e) = node.fail_outputs(error.clone()) {
                debug!("{}: {}", id, e);
            }
            advance_or_log(&node, LifecycleEvent::ProvisionFailed);
            warn!("Provisioning {} failed: {}", id, error);
            NodeOutcome::Failed(error)
        }
    };
    (id, outcome)
}

/// Record a snapshot failure on the node
fn reject_node(node: &ResourceNode, error: CompositionError) -> NodeOutcome {
    let (event, outcome) = match &error {
        CompositionError::UpstreamFailed { upstream } => {
            warn!("Skipping {}: upstream {} failed", node.id(), upstream);
            (
                LifecycleEvent::UpstreamFailed,
                NodeOutcome::Skipped(SkipReason::UpstreamFailed {
                    upstream: upstream.clone(),
                }),
            )
        }
        other => {
            warn!("Could not resolve inputs of {}: {}", node.id(), other);
            (LifecycleEvent::ResolveFailed, NodeOutcome::Failed(other.clone()))
        }
    };

    // Dependents read the node's cells, so they must see the failure too
    if let Err(e) = node.fail_outputs(error) {
        debug!("{}: {}", node.id(), e);
    }
    advance_or_log(node, event);
    outcome
}

fn cancel_node(node: &ResourceNode) -> NodeOutcome {
    warn!("Cancelled {} before provisioning", node.id());
    advance_or_log(node, LifecycleEvent::Cancel);
    NodeOutcome::Skipped(SkipReason::Cancelled)
}

fn advance_or_log(node: &ResourceNode, event: LifecycleEvent) {
    if let Err(e) = node.advance(event) {
        debug!("{}: ignoring {:?}: {}", node.id(), event, e);
    }
}
