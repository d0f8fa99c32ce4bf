// Copyright (c) 2025 - Cowboy AI, Inc.
//! Recording Provisioner
//!
//! In-memory provisioner that records every request it receives. Handlers
//! are registered per type tag; resources can be told to fail; an optional
//! echo fallback answers any type with the resolved inputs plus a synthetic
//! `id` and `name`.
//!
//! Useful for plans, tests and demos where nothing real should be created.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use super::{ProvisionRequest, Provisioner};
use crate::errors::ProvisionError;
use crate::value::{OutputMap, ResourceId, TypeTag};

/// Per-type handler
pub type Handler =
    Arc<dyn Fn(ProvisionRequest) -> BoxFuture<'static, Result<OutputMap, ProvisionError>> + Send + Sync>;

/// In-memory provisioner that records requests
#[derive(Default)]
pub struct RecordingProvisioner {
    handlers: HashMap<TypeTag, Handler>,
    fallback: Option<Handler>,
    failures: HashMap<ResourceId, ProvisionError>,
    latency: Option<Duration>,
    calls: Mutex<Vec<ProvisionRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingProvisioner {
    /// Provisioner with no handlers; every type is unsupported
    pub fn new() -> Self {
        Self::default()
    }

    /// Provisioner answering every type with [`echo_outputs`]
    pub fn echo() -> Self {
        Self::new().with_fallback(|request| async move { Ok(echo_outputs(&request)) })
    }

    /// Register an async handler for a type tag
    pub fn with_handler<F, Fut>(mut self, type_tag: impl Into<TypeTag>, handler: F) -> Self
    where
        F: Fn(ProvisionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<OutputMap, ProvisionError>> + Send + 'static,
    {
        self.handlers
            .insert(type_tag.into(), Arc::new(move |request| handler(request).boxed()));
        self
    }

    /// Handler for types without a registered handler
    pub fn with_fallback<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ProvisionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<OutputMap, ProvisionError>> + Send + 'static,
    {
        self.fallback = Some(Arc::new(move |request| handler(request).boxed()));
        self
    }

    /// Make one resource fail with `error`
    pub fn with_failure(mut self, id: ResourceId, error: ProvisionError) -> Self {
        self.failures.insert(id, error);
        self
    }

    /// Delay every call, to make concurrency observable
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Requests received so far, in arrival order
    pub fn calls(&self) -> Vec<ProvisionRequest> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Ids in call order
    pub fn called_ids(&self) -> Vec<ResourceId> {
        self.calls().into_iter().map(|request| request.id).collect()
    }

    /// Request received for one resource
    pub fn request_for(&self, id: &ResourceId) -> Option<ProvisionRequest> {
        self.calls().into_iter().find(|request| &request.id == id)
    }

    /// Highest number of concurrent calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Resolved inputs plus `id` (`/<type>/<resource>`) and `name`
///
/// Inputs named `id` or `name` take precedence over the synthetic values.
pub fn echo_outputs(request: &ProvisionRequest) -> OutputMap {
    let mut outputs = OutputMap::new();
    outputs.insert(
        "id".to_string(),
        Value::String(format!("/{}/{}", request.type_tag, request.id)),
    );
    outputs.insert("name".to_string(), Value::String(request.id.to_string()));
    outputs.extend(request.inputs.values.clone());
    outputs
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    async fn provision(&self, request: &ProvisionRequest) -> Result<OutputMap, ProvisionError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        debug!("Recording provisioner: {} ({})", request.id, request.type_tag);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let result = if let Some(error) = self.failures.get(&request.id) {
            Err(error.clone())
        } else if let Some(handler) = self
            .handlers
            .get(&request.type_tag)
            .or(self.fallback.as_ref())
        {
            handler(request.clone()).await
        } else {
            Err(ProvisionError::unsupported(request.type_tag.as_str()))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
