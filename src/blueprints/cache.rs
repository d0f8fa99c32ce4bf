// Copyright (c) 2025 - Cowboy AI, Inc.
//! Redis
//!
//! Two backends are supported and the caller picks one explicitly:
//!
//! - [`RedisBackend::Classic`]: a single `redis-cache` resource, TLS on 6380
//! - [`RedisBackend::Enterprise`]: a `redis-enterprise-cluster`, a database on
//!   it, and a key listing for that database
//!
//! Both expose the same [`Redis`] handle, so downstream blueprints do not care
//! which one was chosen. A provisioner that only speaks one of the two APIs
//! simply never registers the other backend's type tags.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::config::StackConfig;
use crate::errors::CompositionResult;
use crate::graph::DependencyGraph;
use crate::resource::ResourceDeclaration;
use crate::value::{Input, OutputRef, ResourceId, Template};

pub const REDIS_CACHE: &str = "redis-cache";
pub const REDIS_CACHE_KEYS: &str = "redis-cache-keys";
pub const REDIS_ENTERPRISE_CLUSTER: &str = "redis-enterprise-cluster";
pub const REDIS_ENTERPRISE_DATABASE: &str = "redis-enterprise-database";
pub const REDIS_ENTERPRISE_KEYS: &str = "redis-enterprise-database-keys";
pub const PRIVATE_ENDPOINT: &str = "private-endpoint";
pub const PRIVATE_DNS_ZONE_GROUP: &str = "private-dns-zone-group";

pub const DEFAULT_ENTERPRISE_PORT: u16 = 10000;
pub const CLASSIC_SSL_PORT: u16 = 6380;
pub const MINIMUM_TLS_VERSION: &str = "1.2";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusteringPolicy {
    #[default]
    EnterpriseCluster,
    #[serde(rename = "OSSCluster")]
    OssCluster,
}

impl fmt::Display for ClusteringPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusteringPolicy::EnterpriseCluster => f.write_str("EnterpriseCluster"),
            ClusteringPolicy::OssCluster => f.write_str("OSSCluster"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionPolicy {
    #[serde(rename = "AllKeysLFU")]
    AllKeysLfu,
    #[serde(rename = "AllKeysLRU")]
    AllKeysLru,
    AllKeysRandom,
    #[default]
    NoEviction,
    #[serde(rename = "VolatileLFU")]
    VolatileLfu,
    #[serde(rename = "VolatileLRU")]
    VolatileLru,
    VolatileRandom,
    #[serde(rename = "VolatileTTL")]
    VolatileTtl,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvictionPolicy::AllKeysLfu => "AllKeysLFU",
            EvictionPolicy::AllKeysLru => "AllKeysLRU",
            EvictionPolicy::AllKeysRandom => "AllKeysRandom",
            EvictionPolicy::NoEviction => "NoEviction",
            EvictionPolicy::VolatileLfu => "VolatileLFU",
            EvictionPolicy::VolatileLru => "VolatileLRU",
            EvictionPolicy::VolatileRandom => "VolatileRandom",
            EvictionPolicy::VolatileTtl => "VolatileTTL",
        };
        f.write_str(s)
    }
}

/// Redis Enterprise settings; unset options take the defaults below
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisEnterpriseConfig {
    /// e.g. `Enterprise_E10`, `EnterpriseFlash_F300`
    pub sku_name: String,
    pub capacity: u32,
    pub clustering_policy: Option<ClusteringPolicy>,
    pub eviction_policy: Option<EvictionPolicy>,
    pub port: Option<u16>,
}

impl RedisEnterpriseConfig {
    pub fn new(sku_name: impl Into<String>, capacity: u32) -> Self {
        Self {
            sku_name: sku_name.into(),
            capacity,
            clustering_policy: None,
            eviction_policy: None,
            port: None,
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_ENTERPRISE_PORT)
    }
}

/// Which Redis API provisions the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedisBackend {
    Classic {
        sku: String,
        family: String,
        capacity: u32,
    },
    Enterprise(RedisEnterpriseConfig),
}

/// Private endpoint placement
#[derive(Debug, Clone)]
pub struct RedisPrivateLink {
    pub subnet_id: Input,
    pub dns_zone_id: String,
}

#[derive(Debug, Clone)]
pub struct RedisArgs {
    pub env: String,
    pub location: String,
    pub resource_group_name: Input,
    pub backend: RedisBackend,
    pub private_link: Option<RedisPrivateLink>,
}

/// Connection details of a declared cache
#[derive(Debug, Clone)]
pub struct Redis {
    /// The cache or enterprise cluster
    pub cache: ResourceId,
    /// Enterprise database, if any
    pub database: Option<ResourceId>,
    pub keys: ResourceId,
    pub private_endpoint: Option<ResourceId>,
    pub dns_zone_group: Option<ResourceId>,
    pub host: OutputRef,
    pub port: Input,
    pub user: Input,
    /// Primary access key (secret)
    pub password: OutputRef,
    pub ssl_enabled: bool,
    /// `rediss://{host}:{port}/0?password={key}`
    pub connection_string: Template,
}

/// Declare a Redis cache on the chosen backend
///
/// With a private link, `vnetRg` is read from `config`: the endpoint lives in
/// the network's resource group, not the cache's.
pub fn redis(
    graph: &mut DependencyGraph,
    args: &RedisArgs,
    config: &StackConfig,
) -> CompositionResult<Redis> {
    let cache_id = ResourceId::new(format!("atscale-redis-{}", args.env))?;
    let keys_id = ResourceId::new(format!("atscale-redis-keys-{}", args.env))?;

    let (cache, database, keys, port, link) = match &args.backend {
        RedisBackend::Classic {
            sku,
            family,
            capacity,
        } => {
            let cache = graph.declare(
                ResourceDeclaration::new(cache_id, REDIS_CACHE)
                    .input("resourceGroupName", args.resource_group_name.clone())
                    .input("location", args.location.as_str())
                    .input(
                        "sku",
                        json!({ "name": sku, "family": family, "capacity": capacity }),
                    )
                    .input("minimumTlsVersion", MINIMUM_TLS_VERSION)
                    .input("enableNonSslPort", json!(false)),
            )?;
            let keys = graph.declare(
                ResourceDeclaration::new(keys_id, REDIS_CACHE_KEYS)
                    .input("resourceGroupName", args.resource_group_name.clone())
                    .input("name", cache.output("name"))
                    .secret_output("primaryKey")
                    .secret_output("secondaryKey"),
            )?;
            let port = Input::Reference(cache.output("sslPort"));
            (cache, None, keys, port, ("redisCache", "privatelink.redis.cache.windows.net"))
        }
        RedisBackend::Enterprise(enterprise) => {
            let cluster = graph.declare(
                ResourceDeclaration::new(cache_id, REDIS_ENTERPRISE_CLUSTER)
                    .input("resourceGroupName", args.resource_group_name.clone())
                    .input("location", args.location.as_str())
                    .input(
                        "sku",
                        json!({ "name": enterprise.sku_name, "capacity": enterprise.capacity }),
                    )
                    .input("minimumTlsVersion", MINIMUM_TLS_VERSION),
            )?;
            let database = graph.declare(
                ResourceDeclaration::new(
                    ResourceId::new(format!("atscale-redis-db-{}", args.env))?,
                    REDIS_ENTERPRISE_DATABASE,
                )
                .input("resourceGroupName", args.resource_group_name.clone())
                .input("clusterName", cluster.output("name"))
                .input("clientProtocol", "Encrypted")
                .input(
                    "clusteringPolicy",
                    enterprise.clustering_policy.unwrap_or_default().to_string(),
                )
                .input(
                    "evictionPolicy",
                    enterprise.eviction_policy.unwrap_or_default().to_string(),
                )
                .input("port", json!(enterprise.port())),
            )?;
            let keys = graph.declare(
                ResourceDeclaration::new(keys_id, REDIS_ENTERPRISE_KEYS)
                    .input("resourceGroupName", args.resource_group_name.clone())
                    .input("clusterName", cluster.output("name"))
                    .input("databaseName", database.output("name"))
                    .secret_output("primaryKey")
                    .secret_output("secondaryKey"),
            )?;
            let port = Input::literal(enterprise.port());
            (
                cluster,
                Some(database),
                keys,
                port,
                (
                    "redisEnterprise",
                    "privatelink.redisenterprise.cache.azure.net",
                ),
            )
        }
    };

    let (private_endpoint, dns_zone_group) = match &args.private_link {
        Some(private_link) => {
            let (group_id, zone_name) = link;
            let (endpoint, zone_group) =
                private_endpoint(graph, &cache, private_link, group_id, zone_name, config)?;
            (Some(endpoint), Some(zone_group))
        }
        None => (None, None),
    };

    let host = cache.output("hostName");
    let password = keys.output("primaryKey");
    let connection_string = {
        let template = Template::new()
            .text("rediss://")
            .reference(host.clone())
            .text(":");
        let template = match &port {
            Input::Reference(reference) => template.reference(reference.clone()),
            Input::Literal(Value::Number(n)) => template.text(n.to_string()),
            _ => template.text(CLASSIC_SSL_PORT.to_string()),
        };
        template
            .text("/0?password=")
            .reference(password.clone())
    };

    Ok(Redis {
        cache,
        database,
        keys,
        private_endpoint,
        dns_zone_group,
        host,
        port,
        user: Input::from(""),
        password,
        ssl_enabled: true,
        connection_string,
    })
}

fn private_endpoint(
    graph: &mut DependencyGraph,
    cache: &ResourceId,
    link: &RedisPrivateLink,
    group_id: &str,
    zone_name: &str,
    config: &StackConfig,
) -> CompositionResult<(ResourceId, ResourceId)> {
    let network_rg = config.require_string("vnetRg")?;

    let endpoint = graph.declare(
        ResourceDeclaration::new(ResourceId::new("atscale-redis-endpoint")?, PRIVATE_ENDPOINT)
            .input("resourceGroupName", network_rg.as_str())
            .input("subnetId", link.subnet_id.clone())
            .input("privateLinkServiceId", cache.output("id"))
            .input("groupIds", json!([group_id])),
    )?;

    let zone_group = graph.declare(
        ResourceDeclaration::new(
            ResourceId::new("atscale-redis-dnszonegroup")?,
            PRIVATE_DNS_ZONE_GROUP,
        )
        .input("resourceGroupName", network_rg.as_str())
        .input("privateEndpointName", endpoint.output("name"))
        .input(
            "privateDnsZoneConfigs",
            json!([{ "name": zone_name, "privateDnsZoneId": link.dns_zone_id }]),
        ),
    )?;

    Ok((endpoint, zone_group))
}
