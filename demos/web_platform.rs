// Copyright (c) 2025 - Cowboy AI, Inc.
//! Web Platform Plan
//!
//! Declares a single-region web platform (App Service with a staging slot,
//! Azure SQL, Cosmos DB, Redis, load balancer, application gateway and Key
//! Vault) and applies it against an in-memory provisioner.
//!
//! Run with: cargo run --example web_platform

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::info;

use cim_composition::blueprints::*;
use cim_composition::prelude::*;
use cim_composition::provisioner::recording::echo_outputs;
use cim_composition::ProvisionRequest;

fn computed_outputs(request: &ProvisionRequest) -> Vec<(&'static str, Value)> {
    let name = request.id.as_str();
    match request.type_tag.as_str() {
        "web-app" => vec![("defaultHostName", json!(format!("{}.azurewebsites.net", name)))],
        "sql-server" => vec![(
            "fullyQualifiedDomainName",
            json!(format!("{}.database.windows.net", name)),
        )],
        "cosmosdb-account" => vec![(
            "documentEndpoint",
            json!(format!("https://{}.documents.azure.com:443/", name)),
        )],
        "redis-cache" => vec![
            ("hostName", json!(format!("{}.redis.cache.windows.net", name))),
            ("accessKeys", json!({ "primaryKey": "simulated-key" })),
        ],
        "key-vault" => vec![("vaultUri", json!(format!("https://{}.vault.azure.net/", name)))],
        _ => Vec::new(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = StackConfig::new()
        .with("sqlAdmin", "platformadmin")
        .with("sqlAdminPassword", "change-me");
    let args = WebPlatformArgs::new(
        "shop",
        "eastus",
        "00000000-0000-0000-0000-000000000000",
        "00000000-0000-0000-0000-000000000001",
    )
    .with_failover("westus")
    .with_tag("env", "dev");

    let mut graph = DependencyGraph::new();
    let platform = web_platform(&mut graph, &args, &config).context("Failed to declare platform")?;
    export_web_platform(&mut graph, &platform)?;
    info!("Declared {} resources, endpoint {}", graph.len(), platform.endpoint);

    let provisioner = RecordingProvisioner::new().with_fallback(|request| async move {
        let mut outputs = echo_outputs(&request);
        for (key, value) in computed_outputs(&request) {
            outputs.insert(key.to_string(), value);
        }
        Ok(outputs)
    });
    let report = CompositionEngine::new(Arc::new(provisioner)).run(&graph).await?;

    println!("{}", report.to_json()?);
    if !report.is_success() {
        anyhow::bail!("{} resources failed", report.failed.len());
    }
    Ok(())
}
