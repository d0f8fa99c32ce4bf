// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Graph Ordering and Failure Propagation

use proptest::prelude::*;
use std::collections::BTreeSet;

use cim_composition::prelude::*;

use crate::fixtures::{id, leaf};

// ============================================================================
// Graph Generation
// ============================================================================

/// Acyclic graph description: `edges` holds `(dependent, dependency)` pairs
#[derive(Debug, Clone)]
struct GraphShape {
    size: usize,
    edges: Vec<(usize, usize)>,
}

fn name(index: usize) -> String {
    format!("r{}", index)
}

/// Random DAG over `2..max` nodes
///
/// Nodes are ranked by a shuffled permutation; `(a, b)` becomes an edge
/// when `rank[b] < rank[a]` and the coin for that pair came up heads.
fn graph_shape(max: usize) -> impl Strategy<Value = GraphShape> {
    (2..max).prop_flat_map(|size| {
        (
            Just((0..size).collect::<Vec<usize>>()).prop_shuffle(),
            prop::collection::vec(prop::bool::weighted(0.3), size * size),
        )
            .prop_map(move |(rank, coins)| {
                let mut edges = Vec::new();
                for a in 0..size {
                    for b in 0..size {
                        if rank[b] < rank[a] && coins[a * size + b] {
                            edges.push((a, b));
                        }
                    }
                }
                GraphShape { size, edges }
            })
    })
}

/// Declare every node in index order, then add edges
///
/// Edges pointing back in declaration order become input references;
/// forward ones go through `add_dependency`.
fn build(shape: &GraphShape) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for a in 0..shape.size {
        let mut declaration = leaf(&name(a));
        for &(dependent, dependency) in &shape.edges {
            if dependent == a && dependency < a {
                declaration = declaration.input(
                    format!("from_{}", name(dependency)),
                    id(&name(dependency)).output("out"),
                );
            }
        }
        graph.declare(declaration).unwrap();
    }
    for &(dependent, dependency) in &shape.edges {
        if dependency > dependent {
            graph
                .add_dependency(&id(&name(dependent)), &id(&name(dependency)))
                .unwrap();
        }
    }
    graph
}

/// Every node that transitively depends on `failed`
fn downstream_of(shape: &GraphShape, failed: usize) -> BTreeSet<usize> {
    let mut reached = BTreeSet::new();
    let mut frontier = vec![failed];
    while let Some(current) = frontier.pop() {
        for &(dependent, dependency) in &shape.edges {
            if dependency == current && reached.insert(dependent) {
                frontier.push(dependent);
            }
        }
    }
    reached
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Topological order is a permutation with dependencies first
    #[test]
    fn prop_topological_order_respects_edges(shape in graph_shape(16)) {
        let graph = build(&shape);
        let order = graph.topological_order().unwrap();

        prop_assert_eq!(order.len(), shape.size);
        let unique: BTreeSet<&ResourceId> = order.iter().collect();
        prop_assert_eq!(unique.len(), shape.size);

        let position = |index: usize| {
            order.iter().position(|o| o.as_str() == name(index)).unwrap()
        };
        for &(dependent, dependency) in &shape.edges {
            prop_assert!(position(dependency) < position(dependent));
        }
    }

    /// The same graph always yields the same order
    #[test]
    fn prop_topological_order_is_deterministic(shape in graph_shape(16)) {
        let first = build(&shape).topological_order().unwrap();
        let second = build(&shape).topological_order().unwrap();
        prop_assert_eq!(first, second);
    }

    /// Levels only ever hold nodes whose dependencies sit in earlier levels
    #[test]
    fn prop_levels_follow_dependencies(shape in graph_shape(16)) {
        let graph = build(&shape);
        let levels = graph.levels().unwrap();
        let level_of = |index: usize| {
            levels
                .iter()
                .position(|level| level.iter().any(|o| o.as_str() == name(index)))
                .unwrap()
        };

        prop_assert_eq!(levels.iter().map(Vec::len).sum::<usize>(), shape.size);
        for &(dependent, dependency) in &shape.edges {
            prop_assert!(level_of(dependency) < level_of(dependent));
        }
    }

    /// Closing any chain into a loop aborts the run before provisioning
    #[test]
    fn prop_cycle_prevents_any_provisioning(shape in graph_shape(10), length in 2usize..5) {
        let mut graph = build(&shape);
        let offset = shape.size;
        for i in 0..length {
            graph.declare(leaf(&name(offset + i))).unwrap();
        }
        for i in 1..length {
            graph.add_dependency(&id(&name(offset + i)), &id(&name(offset + i - 1))).unwrap();
        }
        graph.add_dependency(&id(&name(offset)), &id(&name(offset + length - 1))).unwrap();

        let provisioner = Arc::new(RecordingProvisioner::echo());
        let result = tokio_test::block_on(CompositionEngine::new(provisioner.clone()).run(&graph));

        let is_cycle = matches!(result, Err(CompositionError::CycleDetected { .. }));
        prop_assert!(is_cycle);
        prop_assert_eq!(provisioner.call_count(), 0);
    }

    /// A failure skips exactly its transitive dependents
    #[test]
    fn prop_failure_reaches_only_dependents(
        shape in graph_shape(12),
        pick in any::<prop::sample::Index>(),
    ) {
        let failed = pick.index(shape.size);
        let graph = build(&shape);
        let provisioner = Arc::new(
            RecordingProvisioner::echo()
                .with_failure(id(&name(failed)), ProvisionError::rejected("injected")),
        );

        let report = tokio_test::block_on(CompositionEngine::new(provisioner).run(&graph)).unwrap();
        let downstream = downstream_of(&shape, failed);

        prop_assert_eq!(report.total(), shape.size);
        prop_assert_eq!(report.failed.len(), 1);
        prop_assert_eq!(report.skipped.len(), downstream.len());
        for index in 0..shape.size {
            let resource = id(&name(index));
            if index == failed {
                prop_assert!(report.failure_of(&resource).is_some());
            } else if downstream.contains(&index) {
                let is_upstream_failure = matches!(
                    report.skip_reason_of(&resource),
                    Some(SkipReason::UpstreamFailed { .. })
                );
                prop_assert!(is_upstream_failure);
            } else {
                prop_assert!(report.succeeded.contains(&resource));
            }
        }
    }
}
