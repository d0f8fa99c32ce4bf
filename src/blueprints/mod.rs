// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Blueprints
//!
//! Builders for the Azure and Kubernetes building blocks of an AtScale
//! deployment. Each builder takes a fully populated, immutable `*Args`
//! value, declares its resources (and usually a [`CompositeGroup`]) on the
//! graph, and returns a handle of references other builders can consume.
//!
//! ```text
//! vnet_component ──appSubnetId──→ app_service_component
//!        │
//!        └──dbSubnetId──→ sql_database_component
//!
//! postgres_flexible ─┐
//!                    ├──→ atscale_secrets ──→ helm_chart
//! redis ─────────────┘            ▲
//! cluster ──k8s-provider──────────┘
//! ```
//!
//! [`web_platform`] declares a self-contained single-region web stack
//! (App Service, SQL, Cosmos DB, Redis, load balancer, application gateway,
//! Key Vault) in its own resource group.
//!
//! Settings that come from the stack configuration are read from an explicit
//! [`StackConfig`](crate::config::StackConfig) argument.
//!
//! Type tags are the opaque dispatch keys a provisioner registers for, e.g.
//! `"redis-enterprise-cluster"` or `"kubernetes-secret"`.
//!
//! [`CompositeGroup`]: crate::graph::CompositeGroup

pub mod cache;
pub mod database;
pub mod kubernetes;
pub mod network;
pub mod storage;
pub mod web;
pub mod web_platform;

use crate::errors::CompositionResult;
use crate::value::{Input, ResourceId};

pub use cache::{redis, Redis, RedisArgs, RedisBackend, RedisEnterpriseConfig};
pub use database::{
    postgres_flexible, sql_database_component, PostgresArgs, PostgresFlexible, SqlDatabase,
    SqlDatabaseArgs,
};
pub use kubernetes::{
    atscale_secrets, cluster, helm_chart, AtScaleSecrets, AtScaleSecretsArgs, Cluster, ClusterArgs,
    DatabaseLogin, HelmChart, HelmChartArgs,
};
pub use network::{vnet_component, Vnet, VnetArgs};
pub use storage::{standard_storage_account, StorageAccount, StorageAccountArgs};
pub use web::{app_service_component, AppService, AppServiceArgs};
pub use web_platform::{export_web_platform, web_platform, WebPlatform, WebPlatformArgs};

/// `{name}-{suffix}`
pub(crate) fn child_id(name: &str, suffix: &str) -> CompositionResult<ResourceId> {
    ResourceId::new(format!("{}-{}", name, suffix))
}

/// Treat a known value as secret; references keep their own secrecy
pub(crate) fn secret(input: Input) -> Input {
    match input {
        Input::Literal(value) => Input::Secret(value),
        other => other,
    }
}
