//! In-process graph store.
//!
//! Nodes and edges live in flat tables keyed by integer ids. A per-project
//! `StableGraph` holds only ids and serves as the adjacency index, so cascade
//! deletes and traversals are index operations. All mutations of a project go
//! through one `parking_lot::RwLock`, which is the store's concurrency
//! guarantee for writers.

use super::{DeletedNode, GraphStore, ensure_project_id};
use crate::error::{GraphError, Result};
use crate::types::*;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

/// Everything the store knows about one project.
#[derive(Default)]
struct ProjectGraph {
    /// Adjacency index: node weights are node ids, edge weights carry the
    /// edge id and its type so traversals can filter without a table lookup.
    topology: StableDiGraph<NodeId, (EdgeId, EdgeType)>,
    node_index: HashMap<NodeId, NodeIndex>,
    edge_index: HashMap<EdgeId, EdgeIndex>,
    /// Live node key -> node id
    keys: HashMap<String, NodeId>,
    /// Ordered by id, which is creation order
    nodes: BTreeMap<NodeId, GraphNode>,
    edges: BTreeMap<EdgeId, GraphEdge>,
    /// Linear version chain, oldest first
    versions: Vec<Version>,
    operations: Vec<UpdateOperation>,
}

impl ProjectGraph {
    fn current_version(&self) -> Option<&Version> {
        self.versions.last()
    }

    fn version_number(&self, version_id: VersionId) -> Option<u64> {
        self.versions
            .iter()
            .find(|v| v.id == version_id)
            .map(|v| v.version_number)
    }

    fn ensure_writable(&self, ctx: &GraphContext) -> Result<()> {
        match self.current_version() {
            Some(current) if current.id == ctx.version_id => Ok(()),
            Some(current) => Err(GraphError::conflict(format!(
                "version {} of project {} is not writable (current is {})",
                ctx.version_id, ctx.project_id, current.id
            ))),
            None => Err(GraphError::conflict(format!(
                "project {} has no version to write to",
                ctx.project_id
            ))),
        }
    }

    /// Resolve a version pin to its number. Pins from other projects are a
    /// caller error.
    fn pin(&self, project_id: &str, version_id: Option<VersionId>) -> Result<Option<u64>> {
        match version_id {
            None => Ok(None),
            Some(id) => self.version_number(id).map(Some).ok_or_else(|| {
                GraphError::invalid(format!(
                    "version {id} does not belong to project {project_id}"
                ))
            }),
        }
    }

    /// Rows are live; a pinned read sees rows last written at or before the pin.
    fn visible(&self, row_version: VersionId, pin: Option<u64>) -> bool {
        match pin {
            None => true,
            Some(limit) => self
                .version_number(row_version)
                .is_some_and(|number| number <= limit),
        }
    }

    fn incident_edges(&self, node_id: NodeId) -> Vec<EdgeId> {
        let Some(&idx) = self.node_index.get(&node_id) else {
            return Vec::new();
        };
        let mut ids: BTreeSet<EdgeId> = BTreeSet::new();
        for direction in [Direction::Outgoing, Direction::Incoming] {
            for edge in self.topology.edges_directed(idx, direction) {
                ids.insert(edge.weight().0);
            }
        }
        ids.into_iter().collect()
    }

    fn edges_from(&self, node_id: NodeId, direction: Direction) -> Vec<GraphEdge> {
        let Some(&idx) = self.node_index.get(&node_id) else {
            return Vec::new();
        };
        let mut edges: Vec<GraphEdge> = self
            .topology
            .edges_directed(idx, direction)
            .filter_map(|e| self.edges.get(&e.weight().0).cloned())
            .collect();
        edges.sort_by_key(|e| e.id);
        edges
    }

    fn remove_edge(&mut self, edge_id: EdgeId) -> Option<GraphEdge> {
        let edge = self.edges.remove(&edge_id)?;
        if let Some(idx) = self.edge_index.remove(&edge_id) {
            self.topology.remove_edge(idx);
        }
        Some(edge)
    }
}

/// Arena-backed [`GraphStore`] kept entirely in memory.
pub struct MemoryGraphStore {
    projects: RwLock<HashMap<String, ProjectGraph>>,
    /// Owning project of every live row, for id-only lookups
    node_owner: DashMap<NodeId, String>,
    edge_owner: DashMap<EdgeId, String>,
    version_owner: DashMap<VersionId, String>,
    next_node_id: AtomicU64,
    next_edge_id: AtomicU64,
    next_version_id: AtomicU64,
    next_operation_id: AtomicU64,
    reject_operation_log: AtomicBool,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            node_owner: DashMap::new(),
            edge_owner: DashMap::new(),
            version_owner: DashMap::new(),
            next_node_id: AtomicU64::new(1),
            next_edge_id: AtomicU64::new(1),
            next_version_id: AtomicU64::new(1),
            next_operation_id: AtomicU64::new(1),
            reject_operation_log: AtomicBool::new(false),
        }
    }

    /// Make every audit-log write fail, to exercise best-effort logging.
    #[cfg(test)]
    pub(crate) fn fail_operation_log(&self, fail: bool) {
        self.reject_operation_log.store(fail, Ordering::SeqCst);
    }

    fn owner_of_node(&self, node_id: NodeId) -> Option<String> {
        self.node_owner.get(&node_id).map(|p| p.value().clone())
    }

    fn owner_of_edge(&self, edge_id: EdgeId) -> Option<String> {
        self.edge_owner.get(&edge_id).map(|p| p.value().clone())
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

fn page<T: Clone>(items: Vec<T>, limit: Option<usize>, offset: usize, started: Instant) -> QueryResult<T> {
    let total_count = items.len();
    let data: Vec<T> = items
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    let has_more = offset.saturating_add(data.len()) < total_count;
    QueryResult {
        data,
        total_count,
        has_more,
        time_ms: started.elapsed().as_millis() as u64,
    }
}

/// Enumerate simple cycles that start and end at `start`, visiting only
/// members of the same component with larger ids, up to `max_depth` edges.
fn cycles_from(
    graph: &DiGraphMap<NodeId, ()>,
    members: &HashSet<NodeId>,
    start: NodeId,
    max_depth: usize,
    path: &mut Vec<NodeId>,
    on_path: &mut HashSet<NodeId>,
    found: &mut Vec<Vec<NodeId>>,
) {
    let Some(&current) = path.last() else {
        return;
    };
    let mut next: Vec<NodeId> = graph.neighbors(current).collect();
    next.sort();
    for neighbor in next {
        if neighbor == start {
            found.push(path.clone());
            continue;
        }
        if neighbor < start || !members.contains(&neighbor) || on_path.contains(&neighbor) {
            continue;
        }
        if path.len() >= max_depth {
            continue;
        }
        path.push(neighbor);
        on_path.insert(neighbor);
        cycles_from(graph, members, start, max_depth, path, on_path, found);
        on_path.remove(&neighbor);
        path.pop();
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn create_new_version(
        &self,
        project_id: &str,
        parent: Option<VersionId>,
        checksum: Option<String>,
    ) -> Result<VersionId> {
        ensure_project_id(project_id)?;
        let mut projects = self.projects.write();
        let project = projects.entry(project_id.to_string()).or_default();

        let current = project.current_version().map(|v| v.id);
        if let Some(requested) = parent {
            if Some(requested) != current {
                return Err(GraphError::conflict(format!(
                    "version {requested} is not the current version of project {project_id}"
                )));
            }
        }

        let id = VersionId(self.next_version_id.fetch_add(1, Ordering::SeqCst));
        project.versions.push(Version {
            id,
            project_id: project_id.to_string(),
            version_number: project.versions.len() as u64 + 1,
            parent_version_id: current,
            checksum,
            operations_count: 0,
            created_at: Utc::now(),
        });
        self.version_owner.insert(id, project_id.to_string());

        tracing::debug!("Created version {} for project {}", id, project_id);
        Ok(id)
    }

    async fn get_current_version(&self, project_id: &str) -> Result<Option<Version>> {
        let projects = self.projects.read();
        Ok(projects
            .get(project_id)
            .and_then(|p| p.current_version().cloned()))
    }

    async fn get_version(&self, version_id: VersionId) -> Result<Option<Version>> {
        let Some(owner) = self.version_owner.get(&version_id).map(|o| o.value().clone()) else {
            return Ok(None);
        };
        let projects = self.projects.read();
        Ok(projects
            .get(&owner)
            .and_then(|p| p.versions.iter().find(|v| v.id == version_id).cloned()))
    }

    async fn get_version_history(&self, project_id: &str, limit: usize) -> Result<Vec<Version>> {
        let projects = self.projects.read();
        Ok(projects
            .get(project_id)
            .map(|p| p.versions.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn add_node(&self, ctx: &GraphContext, draft: NodeDraft) -> Result<GraphNode> {
        let mut projects = self.projects.write();
        let project = projects
            .get_mut(&ctx.project_id)
            .ok_or_else(|| GraphError::conflict(format!("unknown project {}", ctx.project_id)))?;
        project.ensure_writable(ctx)?;

        if project.keys.contains_key(&draft.node_key) {
            return Err(GraphError::conflict(format!(
                "node key {} already exists in project {}",
                draft.node_key, ctx.project_id
            )));
        }

        let id = NodeId(self.next_node_id.fetch_add(1, Ordering::SeqCst));
        let node = GraphNode::from_draft(id, ctx, draft, Utc::now());

        let idx = project.topology.add_node(id);
        project.node_index.insert(id, idx);
        project.keys.insert(node.node_key.clone(), id);
        project.nodes.insert(id, node.clone());
        self.node_owner.insert(id, ctx.project_id.clone());

        Ok(node)
    }

    async fn update_node(
        &self,
        ctx: &GraphContext,
        node_id: NodeId,
        patch: NodePatch,
    ) -> Result<Option<GraphNode>> {
        let mut projects = self.projects.write();
        let Some(project) = projects.get_mut(&ctx.project_id) else {
            return Ok(None);
        };
        project.ensure_writable(ctx)?;

        let Some(old_key) = project.nodes.get(&node_id).map(|n| n.node_key.clone()) else {
            return Ok(None);
        };

        if let Some(new_key) = &patch.node_key {
            if *new_key != old_key {
                if project.keys.contains_key(new_key) {
                    return Err(GraphError::conflict(format!(
                        "node key {} already exists in project {}",
                        new_key, ctx.project_id
                    )));
                }
                project.keys.remove(&old_key);
                project.keys.insert(new_key.clone(), node_id);
            }
        }

        let Some(node) = project.nodes.get_mut(&node_id) else {
            return Ok(None);
        };
        patch.apply_to(node);
        node.version_id = ctx.version_id;
        node.updated_at = Utc::now();
        Ok(Some(node.clone()))
    }

    async fn delete_node(&self, node_id: NodeId) -> Result<Option<DeletedNode>> {
        let Some(owner) = self.owner_of_node(node_id) else {
            return Ok(None);
        };
        let mut projects = self.projects.write();
        let Some(project) = projects.get_mut(&owner) else {
            return Ok(None);
        };

        // Edges go first so no edge ever outlives an endpoint.
        let mut edges = Vec::new();
        for edge_id in project.incident_edges(node_id) {
            if let Some(edge) = project.remove_edge(edge_id) {
                self.edge_owner.remove(&edge_id);
                edges.push(edge);
            }
        }

        let Some(node) = project.nodes.remove(&node_id) else {
            return Ok(None);
        };
        if let Some(idx) = project.node_index.remove(&node_id) {
            project.topology.remove_node(idx);
        }
        project.keys.remove(&node.node_key);
        self.node_owner.remove(&node_id);

        Ok(Some(DeletedNode { node, edges }))
    }

    async fn get_node(&self, node_id: NodeId) -> Result<Option<GraphNode>> {
        let Some(owner) = self.owner_of_node(node_id) else {
            return Ok(None);
        };
        let projects = self.projects.read();
        Ok(projects
            .get(&owner)
            .and_then(|p| p.nodes.get(&node_id).cloned()))
    }

    async fn get_node_by_key(
        &self,
        project_id: &str,
        node_key: &str,
        version_id: Option<VersionId>,
    ) -> Result<Option<GraphNode>> {
        let projects = self.projects.read();
        let Some(project) = projects.get(project_id) else {
            return Ok(None);
        };
        let pin = project.pin(project_id, version_id)?;
        Ok(project
            .keys
            .get(node_key)
            .and_then(|id| project.nodes.get(id))
            .filter(|node| project.visible(node.version_id, pin))
            .cloned())
    }

    async fn query_nodes(
        &self,
        project_id: &str,
        filter: &NodeFilter,
    ) -> Result<QueryResult<GraphNode>> {
        let started = Instant::now();
        let projects = self.projects.read();
        let Some(project) = projects.get(project_id) else {
            return Ok(page(Vec::new(), filter.limit, filter.offset, started));
        };
        let pin = project.pin(project_id, filter.version_id)?;
        let pattern = filter.fuzzy_pattern.as_ref().map(|p| p.to_lowercase());

        let matches: Vec<GraphNode> = project
            .nodes
            .values()
            .filter(|n| filter.node_type.is_none_or(|t| n.node_type == t))
            .filter(|n| {
                filter
                    .name
                    .as_ref()
                    .is_none_or(|name| n.name.as_deref() == Some(name.as_str()))
            })
            .filter(|n| {
                filter
                    .file_path
                    .as_ref()
                    .is_none_or(|path| n.location.file_path == *path)
            })
            .filter(|n| {
                pattern.as_ref().is_none_or(|p| {
                    n.name
                        .as_ref()
                        .is_some_and(|name| name.to_lowercase().contains(p.as_str()))
                })
            })
            .filter(|n| project.visible(n.version_id, pin))
            .cloned()
            .collect();

        Ok(page(matches, filter.limit, filter.offset, started))
    }

    async fn add_edge(&self, ctx: &GraphContext, draft: EdgeDraft) -> Result<GraphEdge> {
        let mut projects = self.projects.write();
        let project = projects
            .get_mut(&ctx.project_id)
            .ok_or_else(|| GraphError::conflict(format!("unknown project {}", ctx.project_id)))?;
        project.ensure_writable(ctx)?;

        let (Some(&source_idx), Some(&target_idx)) = (
            project.node_index.get(&draft.source_node_id),
            project.node_index.get(&draft.target_node_id),
        ) else {
            return Err(GraphError::conflict(format!(
                "edge {} -> {} references a node outside project {}",
                draft.source_node_id, draft.target_node_id, ctx.project_id
            )));
        };

        let duplicate = project
            .topology
            .edges_directed(source_idx, Direction::Outgoing)
            .any(|e| e.target() == target_idx && e.weight().1 == draft.edge_type);
        if duplicate {
            return Err(GraphError::conflict(format!(
                "{} edge {} -> {} already exists",
                draft.edge_type, draft.source_node_id, draft.target_node_id
            )));
        }

        let id = EdgeId(self.next_edge_id.fetch_add(1, Ordering::SeqCst));
        let edge = GraphEdge {
            id,
            project_id: ctx.project_id.clone(),
            version_id: ctx.version_id,
            source_node_id: draft.source_node_id,
            target_node_id: draft.target_node_id,
            edge_type: draft.edge_type,
            weight: draft.weight,
            call_type: draft.call_type,
            is_conditional: draft.is_conditional,
            is_loop_dependent: draft.is_loop_dependent,
            is_async_context: draft.is_async_context,
            properties: draft.properties,
            created_at: Utc::now(),
        };

        let idx = project
            .topology
            .add_edge(source_idx, target_idx, (id, edge.edge_type));
        project.edge_index.insert(id, idx);
        project.edges.insert(id, edge.clone());
        self.edge_owner.insert(id, ctx.project_id.clone());

        Ok(edge)
    }

    async fn update_edge(
        &self,
        ctx: &GraphContext,
        edge_id: EdgeId,
        patch: EdgePatch,
    ) -> Result<Option<GraphEdge>> {
        let mut projects = self.projects.write();
        let Some(project) = projects.get_mut(&ctx.project_id) else {
            return Ok(None);
        };
        project.ensure_writable(ctx)?;
        let Some(edge) = project.edges.get_mut(&edge_id) else {
            return Ok(None);
        };
        patch.apply_to(edge);
        edge.version_id = ctx.version_id;
        Ok(Some(edge.clone()))
    }

    async fn delete_edge(&self, edge_id: EdgeId) -> Result<Option<GraphEdge>> {
        let Some(owner) = self.owner_of_edge(edge_id) else {
            return Ok(None);
        };
        let mut projects = self.projects.write();
        let removed = projects
            .get_mut(&owner)
            .and_then(|p| p.remove_edge(edge_id));
        if removed.is_some() {
            self.edge_owner.remove(&edge_id);
        }
        Ok(removed)
    }

    async fn get_edge(&self, edge_id: EdgeId) -> Result<Option<GraphEdge>> {
        let Some(owner) = self.owner_of_edge(edge_id) else {
            return Ok(None);
        };
        let projects = self.projects.read();
        Ok(projects
            .get(&owner)
            .and_then(|p| p.edges.get(&edge_id).cloned()))
    }

    async fn query_edges(
        &self,
        project_id: &str,
        filter: &EdgeFilter,
    ) -> Result<QueryResult<GraphEdge>> {
        let started = Instant::now();
        let projects = self.projects.read();
        let Some(project) = projects.get(project_id) else {
            return Ok(page(Vec::new(), filter.limit, filter.offset, started));
        };
        let pin = project.pin(project_id, filter.version_id)?;

        let candidates = match (filter.source_node_id, filter.target_node_id) {
            (Some(source), _) => project.edges_from(source, Direction::Outgoing),
            (None, Some(target)) => project.edges_from(target, Direction::Incoming),
            (None, None) => project.edges.values().cloned().collect(),
        };

        let matches: Vec<GraphEdge> = candidates
            .into_iter()
            .filter(|e| filter.source_node_id.is_none_or(|s| e.source_node_id == s))
            .filter(|e| filter.target_node_id.is_none_or(|t| e.target_node_id == t))
            .filter(|e| filter.matches_type(e.edge_type))
            .filter(|e| project.visible(e.version_id, pin))
            .collect();

        Ok(page(matches, filter.limit, filter.offset, started))
    }

    async fn find_circular_dependencies(
        &self,
        project_id: &str,
        max_depth: usize,
    ) -> Result<Vec<Vec<NodeId>>> {
        if max_depth == 0 {
            return Ok(Vec::new());
        }
        let projects = self.projects.read();
        let Some(project) = projects.get(project_id) else {
            return Ok(Vec::new());
        };

        let mut graph: DiGraphMap<NodeId, ()> = DiGraphMap::new();
        for id in project.nodes.keys() {
            graph.add_node(*id);
        }
        for edge in project.edges.values() {
            if edge.edge_type.is_dependency() {
                graph.add_edge(edge.source_node_id, edge.target_node_id, ());
            }
        }

        let mut cycles: Vec<Vec<NodeId>> = Vec::new();
        for component in tarjan_scc(&graph) {
            if component.len() == 1 {
                let node = component[0];
                if graph.contains_edge(node, node) {
                    cycles.push(vec![node]);
                }
                continue;
            }

            let members: HashSet<NodeId> = component.iter().copied().collect();
            let mut starts = component;
            starts.sort();
            for start in starts {
                let mut path = vec![start];
                let mut on_path = HashSet::from([start]);
                cycles_from(
                    &graph,
                    &members,
                    start,
                    max_depth,
                    &mut path,
                    &mut on_path,
                    &mut cycles,
                );
            }
        }

        cycles.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        Ok(cycles)
    }

    async fn get_node_with_connections(
        &self,
        node_id: NodeId,
    ) -> Result<Option<NodeWithConnections>> {
        let Some(owner) = self.owner_of_node(node_id) else {
            return Ok(None);
        };
        let projects = self.projects.read();
        let Some(project) = projects.get(&owner) else {
            return Ok(None);
        };
        let Some(node) = project.nodes.get(&node_id).cloned() else {
            return Ok(None);
        };
        Ok(Some(NodeWithConnections {
            incoming: project.edges_from(node_id, Direction::Incoming),
            outgoing: project.edges_from(node_id, Direction::Outgoing),
            node,
        }))
    }

    async fn get_graph_statistics(&self, project_id: &str) -> Result<GraphStatistics> {
        let projects = self.projects.read();
        let Some(project) = projects.get(project_id) else {
            return Ok(GraphStatistics {
                project_id: project_id.to_string(),
                ..GraphStatistics::default()
            });
        };

        let mut stats = GraphStatistics {
            project_id: project_id.to_string(),
            total_nodes: project.nodes.len(),
            total_edges: project.edges.len(),
            version_count: project.versions.len(),
            current_version: project.current_version().map(|v| v.version_number),
            operation_count: project.operations.len(),
            ..GraphStatistics::default()
        };

        let mut files = HashSet::new();
        let mut complexity_total: u64 = 0;
        for node in project.nodes.values() {
            *stats
                .nodes_by_type
                .entry(node.node_type.as_str().to_string())
                .or_insert(0) += 1;
            *stats.languages.entry(node.language.clone()).or_insert(0) += 1;
            files.insert(node.location.file_path.as_str());
            complexity_total += u64::from(node.complexity);
        }
        for edge in project.edges.values() {
            *stats
                .edges_by_type
                .entry(edge.edge_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        stats.file_count = files.len();
        if !project.nodes.is_empty() {
            stats.average_complexity = complexity_total as f64 / project.nodes.len() as f64;
        }
        Ok(stats)
    }

    async fn log_update_operation(
        &self,
        ctx: &GraphContext,
        op: OperationDraft,
    ) -> Result<OperationId> {
        if self.reject_operation_log.load(Ordering::SeqCst) {
            return Err(GraphError::storage(
                "append to operation log",
                std::io::Error::other("operation log unavailable"),
            ));
        }

        let mut projects = self.projects.write();
        let project = projects
            .get_mut(&ctx.project_id)
            .ok_or_else(|| GraphError::conflict(format!("unknown project {}", ctx.project_id)))?;
        let version = project
            .versions
            .iter_mut()
            .find(|v| v.id == ctx.version_id)
            .ok_or_else(|| {
                GraphError::conflict(format!(
                    "version {} does not belong to project {}",
                    ctx.version_id, ctx.project_id
                ))
            })?;
        version.operations_count += 1;

        let id = OperationId(self.next_operation_id.fetch_add(1, Ordering::SeqCst));
        project.operations.push(UpdateOperation {
            id,
            project_id: ctx.project_id.clone(),
            version_id: ctx.version_id,
            operation_type: op.operation_type,
            node_id: op.node_id,
            edge_id: op.edge_id,
            operation_data: op.operation_data,
            rollback_data: op.rollback_data,
            file_path: op.file_path,
            change_reason: op.change_reason,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list_operations(
        &self,
        project_id: &str,
        version_id: Option<VersionId>,
    ) -> Result<Vec<UpdateOperation>> {
        let projects = self.projects.read();
        Ok(projects
            .get(project_id)
            .map(|p| {
                p.operations
                    .iter()
                    .filter(|op| version_id.is_none_or(|v| op.version_id == v))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
