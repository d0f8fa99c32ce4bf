// Copyright (c) 2025 - Cowboy AI, Inc.
//! Type-Tag Dispatch
//!
//! Routes each request to the backend registered for its type tag. Which
//! backend serves a tag (classic Redis vs Redis Enterprise, one Kubernetes
//! cluster vs another) is an explicit registration made by the caller.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::{ProvisionRequest, Provisioner};
use crate::errors::ProvisionError;
use crate::value::{OutputMap, TypeTag};

/// Provisioner that forwards by type tag
#[derive(Default, Clone)]
pub struct DispatchProvisioner {
    backends: BTreeMap<TypeTag, Arc<dyn Provisioner>>,
}

impl DispatchProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `type_tag` to `backend`, replacing any earlier registration
    pub fn register(mut self, type_tag: impl Into<TypeTag>, backend: Arc<dyn Provisioner>) -> Self {
        self.backends.insert(type_tag.into(), backend);
        self
    }

    /// Route several tags to one backend
    pub fn register_all<I, T>(mut self, type_tags: I, backend: Arc<dyn Provisioner>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeTag>,
    {
        for tag in type_tags {
            self.backends.insert(tag.into(), Arc::clone(&backend));
        }
        self
    }

    pub fn handles(&self, type_tag: &TypeTag) -> bool {
        self.backends.contains_key(type_tag)
    }

    pub fn type_tags(&self) -> impl Iterator<Item = &TypeTag> {
        self.backends.keys()
    }
}

#[async_trait]
impl Provisioner for DispatchProvisioner {
    async fn provision(&self, request: &ProvisionRequest) -> Result<OutputMap, ProvisionError> {
        let backend = self
            .backends
            .get(&request.type_tag)
            .ok_or_else(|| ProvisionError::unsupported(request.type_tag.as_str()))?;
        debug!("Dispatching {} to backend for {}", request.id, request.type_tag);
        backend.provision(request).await
    }
}
