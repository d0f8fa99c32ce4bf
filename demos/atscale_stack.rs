// Copyright (c) 2025 - Cowboy AI, Inc.
//! AtScale Stack Plan
//!
//! Declares the full AtScale deployment (network, Postgres, Redis, AKS,
//! Kubernetes secrets, Helm chart, web front end, log storage) and applies it
//! against an in-memory provisioner, printing the JSON run report.
//!
//! Run with: cargo run --example atscale_stack [stack-config.json]
//!
//! Without a config file a built-in development configuration is used.
//! `CIM_COMPOSE_MAX_CONCURRENCY` and `CIM_COMPOSE_FAIL_FAST` tune the engine.
//! Ctrl-C cancels resources that have not started yet.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cim_composition::blueprints::cache::RedisPrivateLink;
use cim_composition::blueprints::kubernetes::DatabaseLogin;
use cim_composition::blueprints::*;
use cim_composition::prelude::*;
use cim_composition::provisioner::recording::echo_outputs;
use cim_composition::ProvisionRequest;

const ENV: &str = "dev";
const LOCATION: &str = "eastus2";
const RESOURCE_GROUP: &str = "atscale-dev-rg";

fn dev_config() -> StackConfig {
    StackConfig::new()
        .with("postgreSqlAdmin", "sqladmin")
        .with("postgreSqlAdminPassword", "change-me")
        .with("flexDBSkuName", "Standard_D4ds_v5")
        .with("postgreServerStorage", 128)
        .with("vnetRg", "atscale-network-rg")
        .with("tenantId", "00000000-0000-0000-0000-000000000000")
}

fn load_config() -> Result<StackConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read stack config {}", path))?;
            Ok(StackConfig::from_json(&source)?)
        }
        None => Ok(dev_config()),
    }
}

/// Outputs a cloud backend would compute, keyed by type tag
fn computed_outputs(request: &ProvisionRequest) -> Vec<(&'static str, Value)> {
    let name = request.id.as_str();
    match request.type_tag.as_str() {
        "postgres-flexible-server" => vec![(
            "fullyQualifiedDomainName",
            json!(format!("{}.postgres.database.azure.com", name)),
        )],
        "postgres-database" => vec![(
            "name",
            request.inputs.get("databaseName").cloned().unwrap_or_else(|| json!(name)),
        )],
        "redis-enterprise-cluster" => vec![(
            "hostName",
            json!(format!("{}.{}.redisenterprise.cache.azure.net", name, LOCATION)),
        )],
        "redis-enterprise-database-keys" => vec![("primaryKey", json!("simulated-key"))],
        "azuread-application" | "azuread-service-principal" => {
            vec![("clientId", json!(format!("{}-client-id", name)))]
        }
        "azuread-service-principal-password" => vec![("value", json!("simulated-secret"))],
        "azuread-group" => vec![("objectId", json!(format!("{}-object-id", name)))],
        "managed-cluster-admin-credentials" => vec![("kubeconfig", json!("apiVersion: v1"))],
        "web-app" => vec![("defaultHostName", json!(format!("{}.azurewebsites.net", name)))],
        "storage-account" => vec![(
            "primaryEndpoints",
            json!({ "blob": format!("https://{}.blob.core.windows.net/", name) }),
        )],
        "helm-chart" => vec![("status", json!("deployed"))],
        _ => Vec::new(),
    }
}

fn simulated_provisioner() -> RecordingProvisioner {
    RecordingProvisioner::new()
        .with_latency(Duration::from_millis(50))
        .with_fallback(|request| async move {
            let mut outputs = echo_outputs(&request);
            for (key, value) in computed_outputs(&request) {
                outputs.insert(key.to_string(), value);
            }
            Ok(outputs)
        })
}

fn declare_stack(graph: &mut DependencyGraph, config: &StackConfig) -> Result<()> {
    let vnet = vnet_component(
        graph,
        "atscale",
        &VnetArgs {
            resource_group_name: Input::from(RESOURCE_GROUP),
            location: Input::from(LOCATION),
            address_space: vec!["10.20.0.0/16".to_string()],
            app_subnet_prefix: "10.20.1.0/24".to_string(),
            db_subnet_prefix: "10.20.2.0/24".to_string(),
        },
    )?;

    let postgres = postgres_flexible(
        graph,
        &PostgresArgs {
            app: "atscale".to_string(),
            env: ENV.to_string(),
            location: LOCATION.to_string(),
            instance: "01".to_string(),
            resource_group_name: Input::from(RESOURCE_GROUP),
            delegated_subnet_id: vnet.db_subnet_id.clone().into(),
            private_dns_zone_id: "/zones/privatelink.postgres.database.azure.com".to_string(),
            tags: BTreeMap::from([("env".to_string(), ENV.to_string())]),
        },
        config,
    )?;

    let redis = redis(
        graph,
        &RedisArgs {
            env: ENV.to_string(),
            location: LOCATION.to_string(),
            resource_group_name: Input::from(RESOURCE_GROUP),
            backend: RedisBackend::Enterprise(RedisEnterpriseConfig::new("Enterprise_E10", 2)),
            private_link: Some(RedisPrivateLink {
                subnet_id: vnet.app_subnet_id.clone().into(),
                dns_zone_id: "/zones/privatelink.redisenterprise.cache.azure.net".to_string(),
            }),
        },
        config,
    )?;

    let cluster = cluster(
        graph,
        &ClusterArgs {
            env: ENV.to_string(),
            location: LOCATION.to_string(),
            cluster_name: format!("atscale-{}-aks", ENV),
            tenant_id: config.require_string("tenantId")?,
            resource_group_name: Input::from(RESOURCE_GROUP),
            node_subnet_prefix: "10.20.8.0/22".to_string(),
            system_pool_vm_sku: "Standard_D4s_v5".to_string(),
            availability_zones: vec!["1".to_string(), "2".to_string(), "3".to_string()],
            private_dns_zone_id: format!("/zones/privatelink.{}.azmk8s.io", LOCATION),
        },
    )?;

    let password = config.require_secret("postgreSqlAdminPassword")?;
    let login = |database: &cim_composition::OutputRef| {
        DatabaseLogin::new(database.clone(), password.clone())
            .with_user(postgres.admin_login.as_str())
    };
    let secrets = atscale_secrets(
        graph,
        &AtScaleSecretsArgs {
            namespace: Input::from("atscale"),
            provider: Some(cluster.provider.clone()),
            postgres_host: postgres.host.clone().into(),
            postgres_port: None,
            atscale: login(&postgres.atscale_db),
            keycloak: login(&postgres.keycloak_db),
            pgwire: login(&postgres.pgwire_db),
            redis_host: redis.host.clone().into(),
            redis_port: Some(redis.port.clone()),
            redis_user: Some(redis.user.clone()),
            redis_password: redis.password.clone().into(),
        },
    )?;

    helm_chart(
        graph,
        &HelmChartArgs {
            namespace: Input::from("atscale"),
            provider: Some(cluster.provider.clone()),
            depends_on: secrets.all(),
            values: json!({
                "global": {
                    "atscale": { "host": "atscale.example.com", "tls": { "enabled": true } }
                }
            }),
            chart_version: None,
            release_name: None,
        },
    )?;

    let web = app_service_component(
        graph,
        "portal",
        &AppServiceArgs {
            resource_group_name: Input::from(RESOURCE_GROUP),
            location: Input::from(LOCATION),
            subnet_id: vnet.app_subnet_id.clone().into(),
            app_settings: BTreeMap::from([(
                "ATSCALE_HOST".to_string(),
                "atscale.example.com".to_string(),
            )]),
        },
    )?;

    let logs = standard_storage_account(
        graph,
        "logs",
        &StorageAccountArgs {
            resource_group_name: Input::from(RESOURCE_GROUP),
            location: Input::from(LOCATION),
            name_prefix: "atscalelogs".to_string(),
            suffix: None,
        },
    )?;
    info!("Storage account name: {}", logs.account_name);
    info!("Redis connection string: {}", redis.connection_string);
    info!("Portal endpoint: {}", web.endpoint);

    graph.export("redisCacheHostname", redis.host.clone(), false)?;
    graph.export("redisPrimaryKey", redis.password.clone(), true)?;
    graph.export("postgresHost", postgres.host.clone(), false)?;
    graph.export("clusterAdminGroup", cluster.admin_group.output("objectId"), false)?;
    graph.export("appServiceHost", web.default_host_name.clone(), false)?;
    graph.export("storageAccountName", logs.storage_account_name.clone(), false)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting AtScale stack plan");

    let config = load_config()?;
    let engine_config = EngineConfig::from_env()?;
    info!("Engine configuration: {:?}", engine_config);

    let mut graph = DependencyGraph::new();
    declare_stack(&mut graph, &config).context("Failed to declare stack")?;
    info!("Declared {} resources in {} groups", graph.len(), graph.groups().count());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling resources that have not started");
            on_interrupt.cancel();
        }
    });

    let engine = CompositionEngine::with_config(Arc::new(simulated_provisioner()), engine_config);
    let report = engine.run_with_cancellation(&graph, cancel).await?;

    println!("{}", report.to_json()?);

    if !report.is_success() {
        anyhow::bail!(
            "{} resources failed, {} skipped",
            report.failed.len(),
            report.skipped.len()
        );
    }
    Ok(())
}
