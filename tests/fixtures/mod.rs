// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-composition
//!
//! Small deterministic graphs shared by the integration tests. Every graph
//! is declared in a fixed order so topological orders are reproducible.
//!
//! # Design Principles
//! - Fixtures build graphs; tests run them
//! - Outputs come from `RecordingProvisioner::echo`, so a literal input
//!   named `out` is echoed back as the `out` output

#![allow(dead_code)]

use serde_json::json;
use tracing_subscriber::EnvFilter;

use cim_composition::prelude::*;
use cim_composition::StackConfig;

pub const TEST_TYPE: &str = "test-resource";

/// Install a test-friendly subscriber once; later calls are ignored
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn id(value: &str) -> ResourceId {
    ResourceId::new(value).expect("Invalid resource id in test fixture")
}

/// Resource with a literal `out` input that the echo provisioner returns
pub fn leaf(name: &str) -> ResourceDeclaration {
    ResourceDeclaration::new(id(name), TEST_TYPE).input("out", format!("{}-value", name))
}

/// Resource reading `upstream.out` into its `in` input
pub fn reader(name: &str, upstream: &str) -> ResourceDeclaration {
    leaf(name).input("in", id(upstream).output("out"))
}

/// `A`, `B` reading `A.out`, independent `C`
pub fn abc_graph() -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    graph.declare(leaf("A")).expect("declare A");
    graph.declare(reader("B", "A")).expect("declare B");
    graph.declare(leaf("C")).expect("declare C");
    graph
}

/// Two chains `A -> B -> D` and `C -> E`
pub fn two_chains() -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    graph.declare(leaf("A")).expect("declare A");
    graph.declare(reader("B", "A")).expect("declare B");
    graph.declare(leaf("C")).expect("declare C");
    graph.declare(reader("D", "B")).expect("declare D");
    graph.declare(reader("E", "C")).expect("declare E");
    graph
}

/// `width` independent resources
pub fn wide_graph(width: usize) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for i in 0..width {
        graph.declare(leaf(&format!("n{}", i))).expect("declare leaf");
    }
    graph
}

pub fn echo() -> Arc<RecordingProvisioner> {
    Arc::new(RecordingProvisioner::echo())
}

pub fn ids(values: &[&str]) -> Vec<ResourceId> {
    values.iter().map(|value| id(value)).collect()
}

/// Configuration the AtScale stack blueprints read
pub fn stack_config() -> StackConfig {
    StackConfig::new()
        .with("postgreSqlAdmin", "sqladmin")
        .with("postgreSqlAdminPassword", "pg-secret")
        .with("flexDBSkuName", "Standard_D4ds_v5")
        .with("postgreServerStorage", 128)
        .with("vnetRg", "atscale-network-rg")
        .with("location", json!("eastus2"))
}
