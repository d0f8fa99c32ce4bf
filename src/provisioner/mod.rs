// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioner Contract
//!
//! The provisioner is the boundary to whatever actually creates
//! infrastructure (a cloud API, a Kubernetes API server, a Helm client). The
//! engine never interprets a [`TypeTag`]: it hands the provisioner a request
//! whose inputs are fully resolved and takes back an output record or an
//! opaque [`ProvisionError`].
//!
//! ```text
//! Engine                      Provisioner
//! ──────                      ───────────
//! ProvisionRequest ────────→  provision()
//!   { id, type_tag,              │
//!     resolved inputs }          ▼
//! OutputMap / ProvisionError ←── backend call
//! ```
//!
//! Retries are a provisioner concern; the engine calls each node at most
//! once per run.
//!
//! # Implementations
//!
//! - [`RecordingProvisioner`] - in-memory, records every request
//! - [`DispatchProvisioner`] - routes by type tag to registered backends

pub mod dispatch;
pub mod recording;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::errors::ProvisionError;
use crate::resource::ResolvedInputs;
use crate::value::{OutputMap, ResourceId, TypeTag};

pub use dispatch::DispatchProvisioner;
pub use recording::RecordingProvisioner;

/// A resolved resource ready for provisioning
#[derive(Clone, PartialEq)]
pub struct ProvisionRequest {
    pub id: ResourceId,
    pub type_tag: TypeTag,
    pub inputs: ResolvedInputs,
}

impl fmt::Debug for ProvisionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionRequest")
            .field("id", &self.id)
            .field("type_tag", &self.type_tag)
            .field("inputs", &self.inputs)
            .finish()
    }
}

/// Turns resolved inputs into real infrastructure
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create or update the resource and return its outputs
    async fn provision(&self, request: &ProvisionRequest) -> Result<OutputMap, ProvisionError>;
}

#[async_trait]
impl<P: Provisioner + ?Sized> Provisioner for Arc<P> {
    async fn provision(&self, request: &ProvisionRequest) -> Result<OutputMap, ProvisionError> {
        (**self).provision(request).await
    }
}
