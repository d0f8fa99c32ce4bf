// Copyright (c) 2025 - Cowboy AI, Inc.
//! Declarative resource composition for CIM infrastructure stacks
//!
//! Callers declare typed resources whose inputs reference other resources'
//! outputs. The crate derives the dependency graph from those references,
//! orders it, and drives each resource through a pluggable [`Provisioner`],
//! publishing outputs into single-assignment [`ValueCell`]s that downstream
//! inputs read from.
//!
//! ```rust,ignore
//! use cim_composition::prelude::*;
//!
//! let mut graph = DependencyGraph::new();
//! let rg = graph.declare(ResourceDeclaration::new(ResourceId::new("rg")?, "resource-group")
//!     .input("location", "eastus2"))?;
//! graph.declare(ResourceDeclaration::new(ResourceId::new("vnet")?, "virtual-network")
//!     .input("resourceGroupName", rg.output("name")))?;
//!
//! let engine = CompositionEngine::new(Arc::new(RecordingProvisioner::echo()));
//! let report = engine.run(&graph).await?;
//! println!("{}", report.to_json()?);
//! ```

pub mod blueprints;
pub mod cell;
pub mod config;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod provisioner;
pub mod resource;
pub mod state_machine;
pub mod value;

/// Replacement text for secret values in logs, reports and exports
pub const SECRET_MARKER: &str = "[secret]";

// Re-export commonly used types
pub use cell::{CellState, ValueCell};
pub use config::{EngineConfig, StackConfig};
pub use engine::{CompositionEngine, RunReport, SkipReason};
pub use errors::{CompositionError, CompositionResult, ProvisionError, ProvisionErrorKind};
pub use graph::{CompositeGroup, DependencyGraph, ExportSource, StackExport};
pub use provisioner::{DispatchProvisioner, ProvisionRequest, Provisioner, RecordingProvisioner};
pub use resource::{ResolvedInputs, ResourceDeclaration, ResourceNode};
pub use value::{Input, OutputMap, OutputRef, ResourceId, Template, TypeTag};

/// Everything needed to declare and run a stack
pub mod prelude {
    pub use crate::config::{EngineConfig, StackConfig};
    pub use crate::engine::{CompositionEngine, RunReport, SkipReason};
    pub use crate::errors::{CompositionError, CompositionResult, ProvisionError};
    pub use crate::graph::DependencyGraph;
    pub use crate::provisioner::{DispatchProvisioner, Provisioner, RecordingProvisioner};
    pub use crate::resource::ResourceDeclaration;
    pub use crate::value::{Input, OutputMap, ResourceId, Template};
    pub use std::sync::Arc;
}
