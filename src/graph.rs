// Copyright (c) 2025 - Cowboy AI, Inc.
//! Dependency Graph
//!
//! Resources register one at a time. Edges are never stored on their own:
//! they are recomputed from each node's input references, its `depends_on`
//! hints, and any ordering edges added later with
//! [`DependencyGraph::add_dependency`].
//!
//! # Ordering
//!
//! [`DependencyGraph::topological_order`] runs Kahn's algorithm with a
//! min-heap keyed on declaration index, so independent resources keep the
//! order in which they were declared and plans are reproducible. The first
//! ordering request freezes the graph against further declarations.
//!
//! When Kahn's algorithm cannot place every node, a depth-first traversal
//! with an in-progress set recovers one concrete cycle for the error.
//!
//! # Composite groups
//!
//! A [`CompositeGroup`] bundles member resources (a VNet with its subnets, a
//! SQL server with its database and private endpoint) and exposes selected
//! member outputs. Exposed outputs only become readable once every member
//! has resolved.

use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::cell::{all, zip, ValueCell};
use crate::errors::{CompositionError, CompositionResult};
use crate::resource::{ResolvedInputs, ResourceDeclaration, ResourceNode};
use crate::state_machine::LifecycleEvent;
use crate::value::{OutputMap, OutputRef, ResourceId, Template};
use crate::SECRET_MARKER;

/// Named stack output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackExport {
    pub name: String,
    pub source: ExportSource,
    pub secret: bool,
}

/// What a stack export reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportSource {
    Output(OutputRef),
    /// Rendered once every referenced output has resolved
    Template(Template),
}

/// Graph of declared resources
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<Arc<ResourceNode>>,
    index: HashMap<ResourceId, usize>,
    extra_edges: HashMap<usize, Vec<usize>>,
    groups: BTreeMap<ResourceId, CompositeGroup>,
    exports: Vec<StackExport>,
    frozen: AtomicBool,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Declare a resource and return its id
    pub fn declare(&mut self, declaration: ResourceDeclaration) -> CompositionResult<ResourceId> {
        let node = self.add_node(ResourceNode::new(declaration)?)?;
        Ok(node.id().clone())
    }

    /// Register a node
    ///
    /// Fails with `DuplicateId` if the id is taken by a resource or group and
    /// with `DanglingReference` if any dependency is not registered yet.
    pub fn add_node(&mut self, node: ResourceNode) -> CompositionResult<Arc<ResourceNode>> {
        if self.is_frozen() {
            return Err(CompositionError::GraphFrozen {
                id: node.id().to_string(),
            });
        }
        if self.index.contains_key(node.id()) || self.groups.contains_key(node.id()) {
            return Err(CompositionError::DuplicateId {
                id: node.id().to_string(),
            });
        }
        for dependency in node.dependencies() {
            if !self.index.contains_key(&dependency) {
                return Err(CompositionError::DanglingReference {
                    from: node.id().to_string(),
                    target: dependency.to_string(),
                });
            }
        }

        node.advance(LifecycleEvent::Register)?;
        let node = Arc::new(node);
        debug!(
            "Registered {} ({}) with {} dependencies",
            node.id(),
            node.type_tag(),
            node.dependencies().len()
        );
        self.index.insert(node.id().clone(), self.nodes.len());
        self.nodes.push(Arc::clone(&node));
        Ok(node)
    }

    /// Add an ordering edge between two registered resources
    ///
    /// Unlike declarations this can point "forward" in declaration order, so
    /// it is the one way to build a cycle.
    pub fn add_dependency(
        &mut self,
        dependent: &ResourceId,
        dependency: &ResourceId,
    ) -> CompositionResult<()> {
        if self.is_frozen() {
            return Err(CompositionError::GraphFrozen {
                id: dependent.to_string(),
            });
        }
        let from = self.position(dependent)?;
        let to = self
            .index
            .get(dependency)
            .copied()
            .ok_or_else(|| CompositionError::DanglingReference {
                from: dependent.to_string(),
                target: dependency.to_string(),
            })?;
        let edges = self.extra_edges.entry(from).or_default();
        if !edges.contains(&to) {
            edges.push(to);
        }
        Ok(())
    }

    pub fn node(&self, id: &ResourceId) -> Option<&Arc<ResourceNode>> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Like [`node`](Self::node) but fails with `UnknownResource`
    pub fn require(&self, id: &ResourceId) -> CompositionResult<&Arc<ResourceNode>> {
        self.node(id).ok_or_else(|| CompositionError::UnknownResource { id: id.to_string() })
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<ResourceNode>> {
        self.nodes.iter()
    }

    fn position(&self, id: &ResourceId) -> CompositionResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| CompositionError::UnknownResource { id: id.to_string() })
    }

    fn edges_of(&self, position: usize) -> Vec<usize> {
        let mut edges: Vec<usize> = self.nodes[position]
            .dependencies()
            .iter()
            .filter_map(|id| self.index.get(id).copied())
            .collect();
        if let Some(extra) = self.extra_edges.get(&position) {
            for &to in extra {
                if !edges.contains(&to) {
                    edges.push(to);
                }
            }
        }
        edges
    }

    /// Every resource `id` must wait for
    pub fn dependencies(&self, id: &ResourceId) -> CompositionResult<Vec<ResourceId>> {
        let position = self.position(id)?;
        Ok(self
            .edges_of(position)
            .into_iter()
            .map(|i| self.nodes[i].id().clone())
            .collect())
    }

    /// Resources that directly depend on `id`
    pub fn dependents(&self, id: &ResourceId) -> CompositionResult<Vec<ResourceId>> {
        let target = self.position(id)?;
        Ok((0..self.nodes.len())
            .filter(|&i| self.edges_of(i).contains(&target))
            .map(|i| self.nodes[i].id().clone())
            .collect())
    }

    /// Dependency-respecting order, ties broken by declaration order
    ///
    /// Freezes the graph. Fails with `CycleDetected` if no order exists.
    pub fn topological_order(&self) -> CompositionResult<Vec<ResourceId>> {
        self.frozen.store(true, Ordering::Release);

        let n = self.nodes.len();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree: Vec<usize> = vec![0; n];
        for (i, degree) in in_degree.iter_mut().enumerate() {
            for dep in self.edges_of(i) {
                dependents[dep].push(i);
                *degree += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &next in &dependents[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != n {
            let cycle = self.detect_cycle().unwrap_or_else(|| {
                (0..n)
                    .filter(|i| in_degree[*i] > 0)
                    .map(|i| self.nodes[i].id().clone())
                    .collect()
            });
            return Err(CompositionError::CycleDetected {
                cycle: cycle.into_iter().map(String::from).collect(),
            });
        }

        debug!("Topological order over {} resources", n);
        Ok(order
            .into_iter()
            .map(|i| self.nodes[i].id().clone())
            .collect())
    }

    /// Find one cycle as a closed path `a -> b -> ... -> a`
    pub fn detect_cycle(&self) -> Option<Vec<ResourceId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            at: usize,
            marks: &mut [Mark],
            path: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            marks[at] = Mark::InProgress;
            path.push(at);
            for next in graph.edges_of(at) {
                match marks[next] {
                    Mark::InProgress => {
                        let start = path.iter().position(|&p| p == next).unwrap_or(0);
                        let mut cycle = path[start..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        if let Some(cycle) = visit(graph, next, marks, path) {
                            return Some(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }
            path.pop();
            marks[at] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        for start in 0..self.nodes.len() {
            if marks[start] == Mark::Unvisited {
                let mut path = Vec::new();
                if let Some(cycle) = visit(self, start, &mut marks, &mut path) {
                    return Some(
                        cycle
                            .into_iter()
                            .map(|i| self.nodes[i].id().clone())
                            .collect(),
                    );
                }
            }
        }
        None
    }

    /// Group resources by depth: a node's depth is one more than the deepest
    /// of its dependencies. Each level keeps topological order.
    pub fn levels(&self) -> CompositionResult<Vec<Vec<ResourceId>>> {
        let order = self.topological_order()?;
        let mut depth: HashMap<usize, usize> = HashMap::new();
        let mut levels: Vec<Vec<ResourceId>> = Vec::new();

        for id in order {
            let position = self.position(&id)?;
            let level = self
                .edges_of(position)
                .iter()
                .filter_map(|dep| depth.get(dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(position, level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(id);
        }
        Ok(levels)
    }

    /// Input snapshot of a registered resource
    pub fn input_snapshot(&self, id: &ResourceId) -> CompositionResult<ResolvedInputs> {
        self.require(id)?.input_snapshot(self)
    }

    /// Publish outputs of a registered resource
    pub fn publish_outputs(&self, id: &ResourceId, values: OutputMap) -> CompositionResult<()> {
        self.require(id)?.publish_outputs(values)
    }

    /// Bundle members into a composite group
    ///
    /// Every check runs before any member is claimed: a missing, repeated or
    /// already grouped member leaves the graph unchanged.
    pub fn group(
        &mut self,
        id: ResourceId,
        members: Vec<ResourceId>,
        exposed: BTreeMap<String, OutputRef>,
    ) -> CompositionResult<CompositeGroup> {
        if self.index.contains_key(&id) || self.groups.contains_key(&id) {
            return Err(CompositionError::DuplicateId { id: id.to_string() });
        }

        let dangling = |target: &ResourceId| CompositionError::DanglingReference {
            from: id.to_string(),
            target: target.to_string(),
        };

        let mut nodes: Vec<Arc<ResourceNode>> = Vec::with_capacity(members.len());
        for member in &members {
            let node = self.node(member).ok_or_else(|| dangling(member))?;
            if nodes.iter().any(|claimed| claimed.id() == member) {
                return Err(CompositionError::DuplicateId {
                    id: member.to_string(),
                });
            }
            if let Some(existing) = node.parent() {
                return Err(CompositionError::GroupConflict {
                    member: member.to_string(),
                    group: existing.to_string(),
                });
            }
            nodes.push(Arc::clone(node));
        }
        for reference in exposed.values() {
            if !members.contains(&reference.resource) {
                return Err(dangling(&reference.resource));
            }
        }

        for node in &nodes {
            node.set_parent(&id)?;
        }

        let group = CompositeGroup {
            id: id.clone(),
            members: nodes,
            exposed,
        };
        debug!("Registered group {} with {} members", id, group.members.len());
        self.groups.insert(id, group.clone());
        Ok(group)
    }

    pub fn group_by_id(&self, id: &ResourceId) -> Option<&CompositeGroup> {
        self.groups.get(id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &CompositeGroup> {
        self.groups.values()
    }

    /// Record a stack output
    pub fn export(
        &mut self,
        name: impl Into<String>,
        reference: OutputRef,
        secret: bool,
    ) -> CompositionResult<()> {
        self.push_export(name.into(), ExportSource::Output(reference), secret)
    }

    /// Record a stack output interpolated from resource outputs
    pub fn export_template(
        &mut self,
        name: impl Into<String>,
        template: Template,
        secret: bool,
    ) -> CompositionResult<()> {
        self.push_export(name.into(), ExportSource::Template(template), secret)
    }

    fn push_export(
        &mut self,
        name: String,
        source: ExportSource,
        secret: bool,
    ) -> CompositionResult<()> {
        if self.exports.iter().any(|export| export.name == name) {
            return Err(CompositionError::DuplicateId { id: name });
        }
        let references: Vec<&OutputRef> = match &source {
            ExportSource::Output(reference) => vec![reference],
            ExportSource::Template(template) => template.references().collect(),
        };
        if let Some(missing) = references
            .into_iter()
            .find(|reference| !self.index.contains_key(&reference.resource))
        {
            return Err(CompositionError::DanglingReference {
                from: format!("export:{}", name),
                target: missing.resource.to_string(),
            });
        }
        self.exports.push(StackExport {
            name,
            source,
            secret,
        });
        Ok(())
    }

    pub fn exports(&self) -> &[StackExport] {
        &self.exports
    }

    /// Resolved value of one output and whether it is secret
    fn export_value(&self, reference: &OutputRef) -> Option<(Value, bool)> {
        let node = self.node(&reference.resource)?;
        let value = node.output(&reference.output).value()?;
        Some((value, node.is_secret_output(&reference.output)))
    }

    /// Values of every export that has resolved, secrets masked
    ///
    /// A template export is secret as soon as one of its references is.
    pub fn resolved_exports(&self) -> BTreeMap<String, Value> {
        self.exports
            .iter()
            .filter_map(|export| {
                let (value, secret_output) = match &export.source {
                    ExportSource::Output(reference) => self.export_value(reference)?,
                    ExportSource::Template(template) => {
                        let mut secret = false;
                        let rendered = template
                            .render(|reference| {
                                let (value, is_secret) =
                                    self.export_value(reference).ok_or_else(|| {
                                        CompositionError::InputNotReady {
                                            node: format!("export:{}", export.name),
                                            input: reference.output.clone(),
                                            upstream: reference.resource.to_string(),
                                        }
                                    })?;
                                secret |= is_secret;
                                Ok(value)
                            })
                            .ok()?;
                        (Value::String(rendered), secret)
                    }
                };
                let value = if export.secret || secret_output {
                    Value::String(SECRET_MARKER.to_string())
                } else {
                    value
                };
                Some((export.name.clone(), value))
            })
            .collect()
    }
}

/// Resources sharing one lifecycle boundary
#[derive(Debug, Clone)]
pub struct CompositeGroup {
    id: ResourceId,
    members: Vec<Arc<ResourceNode>>,
    exposed: BTreeMap<String, OutputRef>,
}

impl CompositeGroup {
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn member_ids(&self) -> Vec<ResourceId> {
        self.members.iter().map(|node| node.id().clone()).collect()
    }

    pub fn exposed(&self) -> &BTreeMap<String, OutputRef> {
        &self.exposed
    }

    /// Reference behind an exposed output name
    pub fn exposed_ref(&self, name: &str) -> CompositionResult<&OutputRef> {
        self.exposed
            .get(name)
            .ok_or_else(|| CompositionError::MissingOutput {
                node: self.id.to_string(),
                output: name.to_string(),
            })
    }

    /// Resolves once every member has resolved; fails if any member fails
    pub fn settled(&self) -> ValueCell<()> {
        let records: Vec<ValueCell<OutputMap>> = self
            .members
            .iter()
            .map(|node| node.record().clone())
            .collect();
        all(&records).derive(|_| ())
    }

    /// Exposed output, readable only after all members resolve
    pub fn output(&self, name: &str) -> CompositionResult<ValueCell<Value>> {
        let reference = self.exposed_ref(name)?;
        let member = self
            .members
            .iter()
            .find(|node| node.id() == &reference.resource)
            .ok_or_else(|| CompositionError::UnknownResource {
                id: reference.resource.to_string(),
            })?;
        let cell = member.output(&reference.output);
        Ok(zip(&self.settled(), &cell).derive(|(_, value)| value))
    }

    /// All exposed outputs as one record
    pub fn outputs(&self) -> CompositionResult<ValueCell<OutputMap>> {
        let names: Vec<String> = self.exposed.keys().cloned().collect();
        let cells = names
            .iter()
            .map(|name| self.output(name))
            .collect::<CompositionResult<Vec<_>>>()?;
        Ok(all(&cells).derive(move |values| names.into_iter().zip(values).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Input;
    use serde_json::json;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn declare(graph: &mut DependencyGraph, name: &str, deps: &[&str]) -> ResourceId {
        let mut declaration = ResourceDeclaration::new(id(name), "test-resource");
        for dep in deps {
            declaration = declaration.input(format!("from_{}", dep), id(dep).output("out"));
        }
        graph.declare(declaration).unwrap()
    }

    fn publish(graph: &DependencyGraph, name: &str) {
        graph
            .publish_outputs(&id(name), OutputMap::from([("out".to_string(), json!(name))]))
            .unwrap();
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut graph = DependencyGraph::new();
        declare(&mut graph, "a", &[]);
        let result = graph.declare(ResourceDeclaration::new(id("a"), "other"));
        assert_eq!(result, Err(CompositionError::DuplicateId { id: "a".into() }));
    }

    #[test]
    fn test_dangling_reference_rejected_at_declare() {
        let mut graph = DependencyGraph::new();
        let result = graph.declare(
            ResourceDeclaration::new(id("b"), "t").input("x", id("z").output("out")),
        );
        assert_eq!(
            result,
            Err(CompositionError::DanglingReference {
                from: "b".into(),
                target: "z".into()
            })
        );
        assert!(graph.is_empty());
    }

    #[test]
    fn test_order_is_stable_by_declaration() {
        let mut graph = DependencyGraph::new();
        declare(&mut graph, "c", &[]);
        declare(&mut graph, "a", &[]);
        declare(&mut graph, "b", &["c"]);
        declare(&mut graph, "d", &[]);

        let order: Vec<String> = graph
            .topological_order()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(order, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_late_edge_reorders() {
        let mut graph = DependencyGraph::new();
        declare(&mut graph, "helm", &[]);
        declare(&mut graph, "secrets", &[]);
        graph.add_dependency(&id("helm"), &id("secrets")).unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec![id("secrets"), id("helm")]);
    }

    #[test]
    fn test_cycle_detected_with_path() {
        let mut graph = DependencyGraph::new();
        declare(&mut graph, "a", &[]);
        declare(&mut graph, "b", &["a"]);
        declare(&mut graph, "c", &["b"]);
        graph.add_dependency(&id("a"), &id("c")).unwrap();

        match graph.topological_order() {
            Err(CompositionError::CycleDetected { cycle }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_ordering_freezes_graph() {
        let mut graph = DependencyGraph::new();
        declare(&mut graph, "a", &[]);
        graph.topological_order().unwrap();

        let result = graph.declare(ResourceDeclaration::new(id("late"), "t"));
        assert!(matches!(result, Err(CompositionError::GraphFrozen { .. })));
    }

    #[test]
    fn test_levels_group_by_depth() {
        let mut graph = DependencyGraph::new();
        declare(&mut graph, "rg", &[]);
        declare(&mut graph, "vnet", &["rg"]);
        declare(&mut graph, "plan", &["rg"]);
        declare(&mut graph, "subnet", &["vnet"]);
        declare(&mut graph, "app", &["plan", "subnet"]);

        let levels = graph.levels().unwrap();
        assert_eq!(
            levels,
            vec![
                vec![id("rg")],
                vec![id("vnet"), id("plan")],
                vec![id("subnet")],
                vec![id("app")],
            ]
        );
    }

    #[test]
    fn test_dependents_lookup() {
        let mut graph = DependencyGraph::new();
        declare(&mut graph, "server", &[]);
        declare(&mut graph, "db1", &["server"]);
        declare(&mut graph, "db2", &["server"]);
        assert_eq!(
            graph.dependents(&id("server")).unwrap(),
            vec![id("db1"), id("db2")]
        );
    }

    #[test]
    fn test_input_snapshot_states() {
        let mut graph = DependencyGraph::new();
        declare(&mut graph, "a", &[]);
        graph
            .declare(
                ResourceDeclaration::new(id("b"), "t")
                    .input("url", Input::template("https://${a.out}/").unwrap())
                    .input("size", Input::literal(3)),
            )
            .unwrap();

        assert!(matches!(
            graph.input_snapshot(&id("b")),
            Err(CompositionError::InputNotReady { .. })
        ));

        publish(&graph, "a");
        let snapshot = graph.input_snapshot(&id("b")).unwrap();
        assert_eq!(snapshot.values["url"], json!("https://a/"));
        assert_eq!(snapshot.values["size"], json!(3));
    }

    #[test]
    fn test_input_snapshot_reports_upstream_failure() {
        let mut graph = DependencyGraph::new();
        declare(&mut graph, "a", &[]);
        declare(&mut graph, "b", &["a"]);
        graph
            .require(&id("a"))
            .unwrap()
            .fail_outputs(CompositionError::Cancelled)
            .unwrap();

        assert_eq!(
            graph.input_snapshot(&id("b")),
            Err(CompositionError::UpstreamFailed {
                upstream: "a".into()
            })
        );
    }

    #[test]
    fn test_group_outputs_wait_for_all_members() {
        let mut graph = DependencyGraph::new();
        declare(&mut graph, "vnet", &[]);
        declare(&mut graph, "app-subnet", &["vnet"]);
        let group = graph
            .group(
                id("network"),
                vec![id("vnet"), id("app-subnet")],
                BTreeMap::from([("vnetName".to_string(), id("vnet").output("out"))]),
            )
            .unwrap();

        let vnet_name = group.output("vnetName").unwrap();
        publish(&graph, "vnet");
        assert!(!vnet_name.is_settled());

        publish(&graph, "app-subnet");
        assert_eq!(vnet_name.value(), Some(json!("vnet")));
        assert_eq!(
            graph.node(&id("vnet")).unwrap().parent(),
            Some(&id("network"))
        );
    }

    #[test]
    fn test_group_validation() {
        let mut graph = DependencyGraph::new();
        declare(&mut graph, "a", &[]);
        declare(&mut graph, "b", &[]);

        let dangling = graph.group(id("g"), vec![id("a"), id("zz")], BTreeMap::new());
        assert!(matches!(
            dangling,
            Err(CompositionError::DanglingReference { .. })
        ));

        let exposed_outside = graph.group(
            id("g"),
            vec![id("a")],
            BTreeMap::from([("x".to_string(), id("b").output("out"))]),
        );
        assert!(matches!(
            exposed_outside,
            Err(CompositionError::DanglingReference { .. })
        ));

        graph.group(id("g1"), vec![id("a")], BTreeMap::new()).unwrap();
        let conflict = graph.group(id("g2"), vec![id("a")], BTreeMap::new());
        assert!(matches!(conflict, Err(CompositionError::GroupConflict { .. })));

        let clash = graph.group(id("b"), vec![], BTreeMap::new());
        assert_eq!(clash.err(), Some(CompositionError::DuplicateId { id: "b".into() }));
    }

    #[test]
    fn test_group_with_repeated_member_claims_nothing() {
        let mut graph = DependencyGraph::new();
        declare(&mut graph, "a", &[]);
        declare(&mut graph, "b", &[]);

        let repeated = graph.group(id("g"), vec![id("b"), id("a"), id("a")], BTreeMap::new());
        assert_eq!(repeated.err(), Some(CompositionError::DuplicateId { id: "a".into() }));
        assert!(graph.group_by_id(&id("g")).is_none());
        assert_eq!(graph.node(&id("a")).unwrap().parent(), None);
        assert_eq!(graph.node(&id("b")).unwrap().parent(), None);

        let group = graph.group(id("g2"), vec![id("a"), id("b")], BTreeMap::new()).unwrap();
        assert_eq!(group.member_ids(), vec![id("a"), id("b")]);
        assert_eq!(graph.node(&id("a")).unwrap().parent(), Some(&id("g2")));
    }

    #[test]
    fn test_resolved_exports_mask_secrets() {
        let mut graph = DependencyGraph::new();
        graph
            .declare(ResourceDeclaration::new(id("cache"), "redis").secret_output("primaryKey"))
            .unwrap();
        graph.export("host", id("cache").output("hostName"), false).unwrap();
        graph.export("key", id("cache").output("primaryKey"), false).unwrap();
        graph.export("pending", id("cache").output("absent"), false).unwrap();

        graph
            .publish_outputs(
                &id("cache"),
                OutputMap::from([
                    ("hostName".to_string(), json!("c.redis.net")),
                    ("primaryKey".to_string(), json!("k3y")),
                ]),
            )
            .unwrap();

        let exports = graph.resolved_exports();
        assert_eq!(exports["host"], json!("c.redis.net"));
        assert_eq!(exports["key"], json!(SECRET_MARKER));
        assert!(!exports.contains_key("pending"));
    }

    #[test]
    fn test_template_export_renders_once_resolved() {
        let mut graph = DependencyGraph::new();
        graph
            .declare(ResourceDeclaration::new(id("app"), "web-app"))
            .unwrap();
        graph
            .declare(ResourceDeclaration::new(id("vault"), "key-vault").secret_output("uri"))
            .unwrap();
        graph
            .export_template(
                "endpoint",
                Template::new()
                    .text("https://")
                    .reference(id("app").output("defaultHostName")),
                false,
            )
            .unwrap();
        graph
            .export_template("vault", Template::parse("${vault.uri}/keys").unwrap(), false)
            .unwrap();

        assert!(graph.resolved_exports().is_empty());

        graph
            .publish_outputs(
                &id("app"),
                OutputMap::from([("defaultHostName".to_string(), json!("app.azurewebsites.net"))]),
            )
            .unwrap();
        graph
            .publish_outputs(
                &id("vault"),
                OutputMap::from([("uri".to_string(), json!("https://v.vault.azure.net"))]),
            )
            .unwrap();

        let exports = graph.resolved_exports();
        assert_eq!(exports["endpoint"], json!("https://app.azurewebsites.net"));
        assert_eq!(exports["vault"], json!(SECRET_MARKER));
    }

    #[test]
    fn test_template_export_rejects_unknown_resource() {
        let mut graph = DependencyGraph::new();
        let result = graph.export_template(
            "endpoint",
            Template::parse("https://${missing.host}").unwrap(),
            false,
        );
        assert_eq!(
            result,
            Err(CompositionError::DanglingReference {
                from: "export:endpoint".to_string(),
                target: "missing".to_string(),
            })
        );
        assert!(graph.exports().is_empty());
    }
}
