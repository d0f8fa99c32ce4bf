// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Declarations and Nodes
//!
//! A [`ResourceDeclaration`] is a fully populated, immutable description of
//! one piece of infrastructure. It is built once and handed to
//! [`DependencyGraph::declare`](crate::graph::DependencyGraph::declare),
//! which turns it into a registered [`ResourceNode`].
//!
//! A node owns:
//! - its inputs, fixed at declaration
//! - an output record cell, settled exactly once after provisioning
//! - lazily created per-attribute output cells derived from the record
//! - its lifecycle state (see [`NodeState`])
//!
//! ```rust,ignore
//! let server = graph.declare(
//!     ResourceDeclaration::new(ResourceId::new("pg-server")?, "postgres-flexible-server")
//!         .input("version", "15")
//!         .secret_output("administratorLoginPassword"),
//! )?;
//! let db = graph.declare(
//!     ResourceDeclaration::new(ResourceId::new("atscale-db")?, "postgres-database")
//!         .input("serverName", server.output("name")),
//! )?;
//! ```

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Mutex, OnceLock};

use tracing::debug;

use crate::cell::{CellState, ValueCell};
use crate::errors::{CompositionError, CompositionResult};
use crate::graph::DependencyGraph;
use crate::state_machine::{LifecycleEvent, NodeState, StateMachine};
use crate::value::{validate_output_name, Input, OutputMap, OutputRef, ResourceId, TypeTag};

/// Immutable description of a resource to declare
#[derive(Debug, Clone)]
pub struct ResourceDeclaration {
    pub id: ResourceId,
    pub type_tag: TypeTag,
    pub inputs: BTreeMap<String, Input>,
    pub depends_on: Vec<ResourceId>,
    pub secret_outputs: BTreeSet<String>,
}

impl ResourceDeclaration {
    pub fn new(id: ResourceId, type_tag: impl Into<TypeTag>) -> Self {
        Self {
            id,
            type_tag: type_tag.into(),
            inputs: BTreeMap::new(),
            depends_on: Vec::new(),
            secret_outputs: BTreeSet::new(),
        }
    }

    pub fn input(mut self, name: impl Into<String>, value: impl Into<Input>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// Add an input only when a value is present
    pub fn optional_input<V: Into<Input>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.input(name, value),
            None => self,
        }
    }

    /// Ordering hint for a dependency that is not visible through inputs
    pub fn depends_on(mut self, dependency: ResourceId) -> Self {
        if !self.depends_on.contains(&dependency) {
            self.depends_on.push(dependency);
        }
        self
    }

    /// Mark an output as secret; inputs reading it become secret too
    pub fn secret_output(mut self, name: impl Into<String>) -> Self {
        self.secret_outputs.insert(name.into());
        self
    }
}

/// Inputs with every reference replaced by its resolved value
///
/// `Debug` output is redacted.
#[derive(Clone, Default, PartialEq)]
pub struct ResolvedInputs {
    pub values: OutputMap,
    /// Names of inputs whose values must not be logged
    pub secrets: BTreeSet<String>,
}

impl ResolvedInputs {
    /// Values with secrets replaced by a marker, safe for logs and reports
    pub fn redacted(&self) -> OutputMap {
        self.values
            .iter()
            .map(|(name, value)| {
                if self.secrets.contains(name) {
                    (name.clone(), Value::String(crate::SECRET_MARKER.to_string()))
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

impl fmt::Debug for ResolvedInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.redacted()).finish()
    }
}

/// A registered resource
#[derive(Debug)]
pub struct ResourceNode {
    id: ResourceId,
    type_tag: TypeTag,
    inputs: BTreeMap<String, Input>,
    depends_on: Vec<ResourceId>,
    secret_outputs: BTreeSet<String>,
    parent: OnceLock<ResourceId>,
    record: ValueCell<OutputMap>,
    outputs: Mutex<BTreeMap<String, ValueCell<Value>>>,
    state: Mutex<NodeState>,
}

impl ResourceNode {
    /// Build an unregistered node from a declaration
    pub fn new(declaration: ResourceDeclaration) -> CompositionResult<Self> {
        for name in &declaration.secret_outputs {
            validate_output_name(name)?;
        }
        for reference in declaration.inputs.values().flat_map(Input::references) {
            validate_output_name(&reference.output)?;
        }

        Ok(Self {
            id: declaration.id,
            type_tag: declaration.type_tag,
            inputs: declaration.inputs,
            depends_on: declaration.depends_on,
            secret_outputs: declaration.secret_outputs,
            parent: OnceLock::new(),
            record: ValueCell::new(),
            outputs: Mutex::new(BTreeMap::new()),
            state: Mutex::new(NodeState::Unregistered),
        })
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    pub fn inputs(&self) -> &BTreeMap<String, Input> {
        &self.inputs
    }

    /// Owning composite group, if any
    pub fn parent(&self) -> Option<&ResourceId> {
        self.parent.get()
    }

    pub(crate) fn set_parent(&self, group: &ResourceId) -> CompositionResult<()> {
        self.parent
            .set(group.clone())
            .map_err(|_| CompositionError::GroupConflict {
                member: self.id.to_string(),
                group: self.parent().map(ToString::to_string).unwrap_or_default(),
            })
    }

    pub fn is_secret_output(&self, name: &str) -> bool {
        self.secret_outputs.contains(name)
    }

    /// Dependencies in first-mention order: input references, then hints
    pub fn dependencies(&self) -> Vec<ResourceId> {
        let mut seen = BTreeSet::new();
        self.inputs
            .values()
            .flat_map(Input::references)
            .map(|reference| &reference.resource)
            .chain(self.depends_on.iter())
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect()
    }

    /// Whole output record of this resource
    pub fn record(&self) -> &ValueCell<OutputMap> {
        &self.record
    }

    /// Cell for a single output attribute
    ///
    /// The cell is derived from the output record; it fails with
    /// `MissingOutput` if the provisioner did not return this attribute.
    pub fn output(&self, name: &str) -> ValueCell<Value> {
        let mut outputs = self
            .outputs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        outputs
            .entry(name.to_string())
            .or_insert_with(|| {
                let node = self.id.to_string();
                let output = name.to_string();
                self.record.try_derive(move |record| {
                    record
                        .get(&output)
                        .cloned()
                        .ok_or(CompositionError::MissingOutput { node, output })
                })
            })
            .clone()
    }

    /// Reference to one of this node's outputs
    pub fn output_ref(&self, name: impl Into<String>) -> OutputRef {
        self.id.output(name)
    }

    /// Resolve each output exactly once
    pub fn publish_outputs(&self, values: OutputMap) -> CompositionResult<()> {
        self.record
            .resolve(values)
            .map_err(|_| CompositionError::OutputAlreadyPublished {
                node: self.id.to_string(),
            })
    }

    /// Fail every output with `error`
    pub fn fail_outputs(&self, error: CompositionError) -> CompositionResult<()> {
        self.record
            .fail(error)
            .map_err(|_| CompositionError::OutputAlreadyPublished {
                node: self.id.to_string(),
            })
    }

    /// Current lifecycle state
    pub fn state(&self) -> NodeState {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply a lifecycle event
    pub fn advance(&self, event: LifecycleEvent) -> CompositionResult<NodeState> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let (next, _) = state.transition(&event)?;
        debug!("{}: {} -> {} on {:?}", self.id, *state, next, event);
        *state = next;
        Ok(next)
    }

    /// Inputs with all references replaced by resolved upstream values
    ///
    /// Fails with `InputNotReady` if an upstream cell has not settled and with
    /// `UpstreamFailed` if it failed. Explicit dependency hints must have
    /// resolved as well.
    pub fn input_snapshot(&self, graph: &DependencyGraph) -> CompositionResult<ResolvedInputs> {
        for dependency in graph.dependencies(&self.id)? {
            let upstream = graph.require(&dependency)?;
            match upstream.record().state() {
                CellState::Resolved(_) => {}
                CellState::Unresolved => {
                    return Err(CompositionError::InputNotReady {
                        node: self.id.to_string(),
                        input: "dependsOn".to_string(),
                        upstream: dependency.to_string(),
                    })
                }
                CellState::Failed(_) => {
                    return Err(CompositionError::UpstreamFailed {
                        upstream: dependency.to_string(),
                    })
                }
            }
        }

        let mut resolved = ResolvedInputs::default();
        for (name, input) in &self.inputs {
            let mut secret = matches!(input, Input::Secret(_));
            let mut lookup = |reference: &OutputRef| -> CompositionResult<Value> {
                let upstream = graph.require(&reference.resource)?;
                secret |= upstream.is_secret_output(&reference.output);
                match upstream.output(&reference.output).state() {
                    CellState::Resolved(value) => Ok(value),
                    CellState::Unresolved => Err(CompositionError::InputNotReady {
                        node: self.id.to_string(),
                        input: name.clone(),
                        upstream: reference.resource.to_string(),
                    }),
                    CellState::Failed(_) => Err(CompositionError::UpstreamFailed {
                        upstream: reference.resource.to_string(),
                    }),
                }
            };

            let value = match input {
                Input::Literal(value) | Input::Secret(value) => value.clone(),
                Input::Reference(reference) => lookup(reference)?,
                Input::Interpolate(template) => Value::String(template.render(&mut lookup)?),
                Input::Derived(derived) => {
                    let source = lookup(&derived.source)?;
                    derived.apply(&source).map_err(|e| match e {
                        CompositionError::Derivation(_) => e,
                        other => CompositionError::Derivation(other.to_string()),
                    })?
                }
            };

            if secret {
                resolved.secrets.insert(name.clone());
            }
            resolved.values.insert(name.clone(), value);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    #[test]
    fn test_dependencies_are_deduplicated_in_order() {
        let node = ResourceNode::new(
            ResourceDeclaration::new(id("web"), "web-app")
                .input("serverFarmId", id("plan").output("id"))
                .input("vnet", Input::template("${vnet.name}-${plan.id}").unwrap())
                .depends_on(id("plan"))
                .depends_on(id("insights")),
        )
        .unwrap();

        // BTreeMap orders inputs by name: serverFarmId, vnet
        assert_eq!(
            node.dependencies(),
            vec![id("plan"), id("vnet"), id("insights")]
        );
    }

    #[test]
    fn test_publish_outputs_twice_keeps_first() {
        let node = ResourceNode::new(ResourceDeclaration::new(id("rg"), "resource-group")).unwrap();
        let name = node.output("name");

        node.publish_outputs(OutputMap::from([("name".to_string(), json!("rg-1"))]))
            .unwrap();
        let second =
            node.publish_outputs(OutputMap::from([("name".to_string(), json!("rg-2"))]));

        assert_eq!(
            second,
            Err(CompositionError::OutputAlreadyPublished { node: "rg".into() })
        );
        assert_eq!(name.value(), Some(json!("rg-1")));
    }

    #[test]
    fn test_missing_output_fails_only_that_cell() {
        let node = ResourceNode::new(ResourceDeclaration::new(id("sa"), "storage-account")).unwrap();
        let present = node.output("name");
        let missing = node.output("primaryEndpoints");

        node.publish_outputs(OutputMap::from([("name".to_string(), json!("sa1"))]))
            .unwrap();

        assert!(present.is_resolved());
        assert_eq!(
            missing.error(),
            Some(CompositionError::MissingOutput {
                node: "sa".into(),
                output: "primaryEndpoints".into()
            })
        );
    }

    #[test]
    fn test_output_cells_are_shared() {
        let node = ResourceNode::new(ResourceDeclaration::new(id("vnet"), "virtual-network")).unwrap();
        assert!(node.output("name").ptr_eq(&node.output("name")));
    }

    #[test]
    fn test_invalid_output_name_rejected() {
        let result = ResourceNode::new(
            ResourceDeclaration::new(id("kv"), "key-vault").secret_output("properties.vaultUri"),
        );
        assert!(matches!(
            result,
            Err(CompositionError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_redacted_inputs_hide_secrets() {
        let inputs = ResolvedInputs {
            values: OutputMap::from([
                ("host".to_string(), json!("pg.internal")),
                ("password".to_string(), json!("hunter2")),
            ]),
            secrets: BTreeSet::from(["password".to_string()]),
        };
        let redacted = inputs.redacted();
        assert_eq!(redacted["host"], json!("pg.internal"));
        assert_eq!(redacted["password"], json!(crate::SECRET_MARKER));
    }

    #[test]
    fn test_lifecycle_rejects_invalid_event() {
        let node = ResourceNode::new(ResourceDeclaration::new(id("x"), "t")).unwrap();
        assert!(node.advance(LifecycleEvent::BeginResolve).is_err());
        assert_eq!(node.advance(LifecycleEvent::Register).unwrap(), NodeState::Registered);
    }
}
