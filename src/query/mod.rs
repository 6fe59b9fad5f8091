//! Read-only graph analytics over a [`GraphStore`](crate::store::GraphStore).
//!
//! Every traversal is breadth-first with a visited set and an explicit depth
//! bound, so cyclic call and usage graphs terminate. Nodes that cannot be
//! resolved (deleted mid-query, or not visible at the pinned version) are
//! left out of results rather than failing the query.

pub mod search;

use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::store::SharedStore;
use crate::types::*;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

const BOTTLENECK_LIMIT: usize = 20;
const DIRECT_IMPACT_DEPTH: usize = 1;

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DependencyOptions {
    pub max_depth: usize,
    pub edge_types: Vec<EdgeType>,
}

impl Default for DependencyOptions {
    fn default() -> Self {
        Self {
            max_depth: 5,
            edge_types: vec![EdgeType::Uses, EdgeType::Imports, EdgeType::Calls],
        }
    }
}

impl DependencyOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_edge_types(mut self, edge_types: &[EdgeType]) -> Self {
        self.edge_types = edge_types.to_vec();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathOptions {
    pub max_depth: usize,
    pub edge_types: Vec<EdgeType>,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            edge_types: vec![EdgeType::Calls, EdgeType::Uses],
        }
    }
}

impl PathOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_edge_types(mut self, edge_types: &[EdgeType]) -> Self {
        self.edge_types = edge_types.to_vec();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    /// Restrict to these types; `None` searches every type
    pub node_types: Option<Vec<NodeType>>,
    /// Also match against docstrings and purposes
    pub include_content: bool,
    pub fuzzy_threshold: f64,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            node_types: None,
            include_content: false,
            fuzzy_threshold: 0.3,
            limit: 20,
        }
    }
}

impl SearchOptions {
    pub fn of_types(mut self, node_types: &[NodeType]) -> Self {
        self.node_types = Some(node_types.to_vec());
        self
    }

    pub fn with_content(mut self) -> Self {
        self.include_content = true;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

// ============================================================================
// Results
// ============================================================================

/// A fewest-edges path between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub total_weight: f64,
    /// Edge count
    pub length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_affected(count: usize) -> Self {
        match count {
            c if c > 50 => Self::Critical,
            c if c > 20 => Self::High,
            c if c > 5 => Self::Medium,
            _ => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactAnalysis {
    pub target: GraphNode,
    pub directly_affected: Vec<GraphNode>,
    pub indirectly_affected: Vec<GraphNode>,
    pub affected_files: Vec<String>,
    pub risk_level: RiskLevel,
    pub estimated_change_complexity: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_length(length: usize) -> Self {
        match length {
            l if l > 10 => Self::High,
            l if l > 5 => Self::Medium,
            _ => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircularDependency {
    /// Cycle order, starting at the smallest node id
    pub nodes: Vec<GraphNode>,
    pub length: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bottleneck {
    pub node: GraphNode,
    pub incoming: usize,
    pub outgoing: usize,
    pub centrality: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Name,
    Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub node: GraphNode,
    pub score: f64,
    pub matched: MatchKind,
}

// ============================================================================
// Engine
// ============================================================================

/// Graph analytics over one store, optionally pinned to a version.
#[derive(Clone)]
pub struct QueryEngine {
    store: SharedStore,
    version: Option<VersionId>,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            version: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// A view of the same store that reads as of `version_id`.
    pub fn at_version(&self, version_id: VersionId) -> Self {
        Self {
            version: Some(version_id),
            ..self.clone()
        }
    }

    pub fn pinned_version(&self) -> Option<VersionId> {
        self.version
    }

    pub fn dependency_options(&self) -> DependencyOptions {
        DependencyOptions::default().with_max_depth(self.config.dependency_depth)
    }

    pub fn path_options(&self) -> PathOptions {
        PathOptions::default().with_max_depth(self.config.path_depth)
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions::default()
            .with_threshold(self.config.fuzzy_threshold)
            .with_limit(self.config.default_search_limit)
    }

    /// Fetch a node if it exists and is visible at the pinned version.
    pub async fn node(&self, node_id: NodeId) -> Result<Option<GraphNode>> {
        let Some(node) = self.store.get_node(node_id).await? else {
            return Ok(None);
        };
        let Some(pin) = self.version else {
            return Ok(Some(node));
        };
        let (Some(pinned), Some(written)) = (
            self.store.get_version(pin).await?,
            self.store.get_version(node.version_id).await?,
        ) else {
            return Ok(None);
        };
        let visible =
            written.project_id == pinned.project_id && written.version_number <= pinned.version_number;
        Ok(visible.then_some(node))
    }

    async fn edges(
        &self,
        project_id: &str,
        node_id: NodeId,
        direction: Direction,
        edge_types: &[EdgeType],
    ) -> Result<Vec<GraphEdge>> {
        let filter = match direction {
            Direction::Outgoing => EdgeFilter::new().from_node(node_id),
            Direction::Incoming => EdgeFilter::new().to_node(node_id),
        }
        .of_types(edge_types)
        .at_version(self.version);
        Ok(self.store.query_edges(project_id, &filter).await?.data)
    }

    fn far_end(edge: &GraphEdge, direction: Direction) -> NodeId {
        match direction {
            Direction::Outgoing => edge.target_node_id,
            Direction::Incoming => edge.source_node_id,
        }
    }

    async fn neighbors(&self, node_id: NodeId, direction: Direction) -> Result<Vec<GraphNode>> {
        let Some(node) = self.node(node_id).await? else {
            return Ok(Vec::new());
        };
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for edge in self
            .edges(&node.project_id, node_id, direction, &[EdgeType::Calls])
            .await?
        {
            let other = Self::far_end(&edge, direction);
            if seen.insert(other) {
                if let Some(neighbor) = self.node(other).await? {
                    found.push(neighbor);
                }
            }
        }
        Ok(found)
    }

    /// Nodes with a CALLS edge into `node_id`.
    pub async fn find_callers(&self, node_id: NodeId) -> Result<Vec<GraphNode>> {
        self.neighbors(node_id, Direction::Incoming).await
    }

    /// Nodes `node_id` has a CALLS edge to.
    pub async fn find_callees(&self, node_id: NodeId) -> Result<Vec<GraphNode>> {
        self.neighbors(node_id, Direction::Outgoing).await
    }

    /// Breadth-first reach from `start`, excluding `start` itself, in
    /// discovery order.
    async fn reach(
        &self,
        start: NodeId,
        direction: Direction,
        options: &DependencyOptions,
    ) -> Result<Vec<GraphNode>> {
        let Some(origin) = self.node(start).await? else {
            return Ok(Vec::new());
        };
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut reached = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= options.max_depth {
                continue;
            }
            for edge in self
                .edges(&origin.project_id, current, direction, &options.edge_types)
                .await?
            {
                let next = Self::far_end(&edge, direction);
                if !visited.insert(next) {
                    continue;
                }
                if let Some(node) = self.node(next).await? {
                    reached.push(node);
                    queue.push_back((next, depth + 1));
                }
            }
        }
        Ok(reached)
    }

    /// Everything `node_id` depends on, transitively up to the depth bound.
    pub async fn find_dependencies(
        &self,
        node_id: NodeId,
        options: &DependencyOptions,
    ) -> Result<Vec<GraphNode>> {
        self.reach(node_id, Direction::Outgoing, options).await
    }

    /// Everything that depends on `node_id`, transitively up to the depth
    /// bound.
    pub async fn find_dependents(
        &self,
        node_id: NodeId,
        options: &DependencyOptions,
    ) -> Result<Vec<GraphNode>> {
        self.reach(node_id, Direction::Incoming, options).await
    }

    /// Fewest-edges path from `from` to `to`, or `None` when unreachable
    /// within the bound.
    pub async fn find_path(
        &self,
        from: NodeId,
        to: NodeId,
        options: &PathOptions,
    ) -> Result<Option<PathResult>> {
        let Some(origin) = self.node(from).await? else {
            return Ok(None);
        };
        if from == to {
            return Ok(Some(PathResult {
                nodes: vec![origin],
                edges: Vec::new(),
                total_weight: 0.0,
                length: 0,
            }));
        }

        let mut parents: HashMap<NodeId, GraphEdge> = HashMap::new();
        let mut visited = HashSet::from([from]);
        let mut queue = VecDeque::from([(from, 0usize)]);

        'search: while let Some((current, depth)) = queue.pop_front() {
            if depth >= options.max_depth {
                continue;
            }
            for edge in self
                .edges(&origin.project_id, current, Direction::Outgoing, &options.edge_types)
                .await?
            {
                let next = edge.target_node_id;
                if !visited.insert(next) {
                    continue;
                }
                if self.node(next).await?.is_none() {
                    continue;
                }
                parents.insert(next, edge);
                if next == to {
                    break 'search;
                }
                queue.push_back((next, depth + 1));
            }
        }

        if !parents.contains_key(&to) {
            return Ok(None);
        }

        let mut edges = Vec::new();
        let mut cursor = to;
        while cursor != from {
            let Some(edge) = parents.remove(&cursor) else {
                return Ok(None);
            };
            cursor = edge.source_node_id;
            edges.push(edge);
        }
        edges.reverse();

        let mut nodes = vec![origin];
        for edge in &edges {
            match self.node(edge.target_node_id).await? {
                Some(node) => nodes.push(node),
                None => return Ok(None),
            }
        }

        Ok(Some(PathResult {
            total_weight: edges.iter().map(GraphEdge::effective_weight).sum(),
            length: edges.len(),
            nodes,
            edges,
        }))
    }

    /// Who is affected by a change to `node_id`, and how much.
    pub async fn analyze_impact(&self, node_id: NodeId) -> Result<Option<ImpactAnalysis>> {
        let Some(target) = self.node(node_id).await? else {
            return Ok(None);
        };
        let options = self.dependency_options();
        let direct = self
            .find_dependents(node_id, &options.clone().with_max_depth(DIRECT_IMPACT_DEPTH))
            .await?;
        let direct_ids: HashSet<NodeId> = direct.iter().map(|n| n.id).collect();
        let indirect: Vec<GraphNode> = self
            .find_dependents(node_id, &options)
            .await?
            .into_iter()
            .filter(|n| !direct_ids.contains(&n.id))
            .collect();

        let affected_files: BTreeSet<String> = direct
            .iter()
            .chain(&indirect)
            .map(|n| n.location.file_path.clone())
            .collect();
        let estimate = target.complexity as f64
            + 0.8 * total_complexity(&direct)
            + 0.3 * total_complexity(&indirect);

        Ok(Some(ImpactAnalysis {
            risk_level: RiskLevel::from_affected(direct.len() + indirect.len()),
            estimated_change_complexity: estimate.round() as u64,
            affected_files: affected_files.into_iter().collect(),
            target,
            directly_affected: direct,
            indirectly_affected: indirect,
        }))
    }

    /// Dependency cycles of at most `max_depth` edges, with severity by
    /// length.
    pub async fn find_circular_dependencies(
        &self,
        project_id: &str,
        max_depth: usize,
    ) -> Result<Vec<CircularDependency>> {
        let cycles = self
            .store
            .find_circular_dependencies(project_id, max_depth)
            .await?;
        let mut found = Vec::with_capacity(cycles.len());
        'cycles: for cycle in cycles {
            let mut nodes = Vec::with_capacity(cycle.len());
            for id in cycle {
                match self.node(id).await? {
                    Some(node) => nodes.push(node),
                    // Not part of the graph this engine reads
                    None => continue 'cycles,
                }
            }
            found.push(CircularDependency {
                length: nodes.len(),
                severity: Severity::from_length(nodes.len()),
                nodes,
            });
        }
        Ok(found)
    }

    /// Functions ranked by `(2 * incoming + outgoing) * ln(complexity + 1)`.
    pub async fn find_bottlenecks(&self, project_id: &str) -> Result<Vec<Bottleneck>> {
        let functions = self
            .store
            .query_nodes(
                project_id,
                &NodeFilter::new()
                    .of_type(NodeType::Function)
                    .at_version(self.version),
            )
            .await?
            .data;

        let mut ranked = Vec::with_capacity(functions.len());
        for node in functions {
            let incoming = self
                .edges(project_id, node.id, Direction::Incoming, &EdgeType::ALL)
                .await?
                .len();
            let outgoing = self
                .edges(project_id, node.id, Direction::Outgoing, &EdgeType::ALL)
                .await?
                .len();
            let centrality = (2 * incoming + outgoing) as f64 * (node.complexity as f64 + 1.0).ln();
            ranked.push(Bottleneck {
                node,
                incoming,
                outgoing,
                centrality,
            });
        }

        ranked.sort_by(|a, b| {
            b.centrality
                .total_cmp(&a.centrality)
                .then_with(|| a.node.id.cmp(&b.node.id))
        });
        ranked.truncate(BOTTLENECK_LIMIT);
        Ok(ranked)
    }

    /// Fuzzy name search, optionally widened to docstrings and purposes.
    pub async fn search_nodes(
        &self,
        project_id: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        if options.limit == 0 {
            return Err(GraphError::invalid("search limit must be at least 1"));
        }
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let node_types = options
            .node_types
            .clone()
            .unwrap_or_else(|| NodeType::ALL.to_vec());
        let mut hits: HashMap<NodeId, SearchHit> = HashMap::new();
        let mut keep = |hit: SearchHit| {
            if hit.score < options.fuzzy_threshold {
                return;
            }
            let better = hits
                .get(&hit.node.id)
                .is_none_or(|existing| hit.score > existing.score);
            if better {
                hits.insert(hit.node.id, hit);
            }
        };

        for node_type in node_types {
            let nodes = self
                .store
                .query_nodes(
                    project_id,
                    &NodeFilter::new().of_type(node_type).at_version(self.version),
                )
                .await?
                .data;
            for node in nodes {
                if options.include_content {
                    if let Some(score) = search::content_score(query, &node) {
                        keep(SearchHit {
                            node: node.clone(),
                            score,
                            matched: MatchKind::Content,
                        });
                    }
                }
                let Some(name) = node.name.as_deref() else {
                    continue;
                };
                let score = search::name_similarity(query, name);
                keep(SearchHit {
                    node,
                    score,
                    matched: MatchKind::Name,
                });
            }
        }

        let mut ranked: Vec<SearchHit> = hits.into_values().collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.node.id.cmp(&b.node.id))
        });
        ranked.truncate(options.limit);
        Ok(ranked)
    }

    pub async fn statistics(&self, project_id: &str) -> Result<GraphStatistics> {
        self.store.get_graph_statistics(project_id).await
    }
}

fn total_complexity(nodes: &[GraphNode]) -> f64 {
    nodes.iter().map(|n| n.complexity as f64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GraphStore, MemoryGraphStore};
    use std::sync::Arc;

    async fn setup() -> (Arc<MemoryGraphStore>, GraphContext) {
        let store = Arc::new(MemoryGraphStore::new());
        let version = store.create_new_version("p", None, None).await.unwrap();
        (store, GraphContext::new("p", version))
    }

    async fn function(store: &MemoryGraphStore, ctx: &GraphContext, name: &str, complexity: u32) -> NodeId {
        let key = node_key("a.ts", 1, name);
        store
            .add_node(
                ctx,
                NodeDraft::new(key, NodeType::Function, Location::new("a.ts", 1, 1))
                    .with_name(name)
                    .with_complexity(complexity),
            )
            .await
            .unwrap()
            .id
    }

    async fn link(store: &MemoryGraphStore, ctx: &GraphContext, from: NodeId, to: NodeId, edge_type: EdgeType) {
        store.add_edge(ctx, EdgeDraft::new(from, to, edge_type)).await.unwrap();
    }

    fn names(nodes: &[GraphNode]) -> Vec<&str> {
        nodes.iter().map(GraphNode::display_name).collect()
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(RiskLevel::from_affected(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_affected(5), RiskLevel::Low);
        assert_eq!(RiskLevel::from_affected(6), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_affected(21), RiskLevel::High);
        assert_eq!(RiskLevel::from_affected(51), RiskLevel::Critical);
        assert_eq!(Severity::from_length(5), Severity::Low);
        assert_eq!(Severity::from_length(6), Severity::Medium);
        assert_eq!(Severity::from_length(11), Severity::High);
    }

    #[tokio::test]
    async fn test_callers_and_callees_are_single_hop() {
        let (store, ctx) = setup().await;
        let a = function(&store, &ctx, "a", 1).await;
        let b = function(&store, &ctx, "b", 1).await;
        let c = function(&store, &ctx, "c", 1).await;
        link(&store, &ctx, a, b, EdgeType::Calls).await;
        link(&store, &ctx, b, c, EdgeType::Calls).await;
        link(&store, &ctx, a, c, EdgeType::Uses).await;

        let engine = QueryEngine::new(store.clone());
        assert_eq!(names(&engine.find_callees(a).await.unwrap()), vec!["b"]);
        assert_eq!(names(&engine.find_callers(c).await.unwrap()), vec!["b"]);
        assert!(engine.find_callers(NodeId(999)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_prefers_fewest_edges() {
        let (store, ctx) = setup().await;
        let a = function(&store, &ctx, "a", 1).await;
        let b = function(&store, &ctx, "b", 1).await;
        let c = function(&store, &ctx, "c", 1).await;
        let d = function(&store, &ctx, "d", 1).await;
        link(&store, &ctx, a, b, EdgeType::Calls).await;
        link(&store, &ctx, b, c, EdgeType::Calls).await;
        link(&store, &ctx, c, d, EdgeType::Calls).await;
        store
            .add_edge(&ctx, EdgeDraft::new(a, d, EdgeType::Uses).with_weight(7.5))
            .await
            .unwrap();

        let engine = QueryEngine::new(store.clone());
        let path = engine.find_path(a, d, &PathOptions::default()).await.unwrap().unwrap();
        assert_eq!(path.length, 1);
        assert_eq!(path.total_weight, 7.5);
        assert_eq!(names(&path.nodes), vec!["a", "d"]);

        let calls_only = PathOptions::default().with_edge_types(&[EdgeType::Calls]);
        let path = engine.find_path(a, d, &calls_only).await.unwrap().unwrap();
        assert_eq!(path.length, 3);
        assert_eq!(path.total_weight, 3.0);

        let short = calls_only.with_max_depth(2);
        assert!(engine.find_path(a, d, &short).await.unwrap().is_none());
        assert!(engine.find_path(d, a, &PathOptions::default()).await.unwrap().is_none());

        let trivial = engine.find_path(b, b, &PathOptions::default()).await.unwrap().unwrap();
        assert_eq!(trivial.length, 0);
    }

    #[tokio::test]
    async fn test_dependents_respect_depth_and_cycles() {
        let (store, ctx) = setup().await;
        let a = function(&store, &ctx, "a", 1).await;
        let b = function(&store, &ctx, "b", 1).await;
        let c = function(&store, &ctx, "c", 1).await;
        link(&store, &ctx, b, a, EdgeType::Calls).await;
        link(&store, &ctx, c, b, EdgeType::Uses).await;
        link(&store, &ctx, a, c, EdgeType::Calls).await;

        let engine = QueryEngine::new(store.clone());
        let one = DependencyOptions::default().with_max_depth(1);
        assert_eq!(names(&engine.find_dependents(a, &one).await.unwrap()), vec!["b"]);
        let all = engine.find_dependents(a, &DependencyOptions::default()).await.unwrap();
        assert_eq!(names(&all), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_bottlenecks_rank_by_centrality() {
        let (store, ctx) = setup().await;
        let hub = function(&store, &ctx, "hub", 4).await;
        let leaf = function(&store, &ctx, "leaf", 1).await;
        let other = function(&store, &ctx, "other", 1).await;
        link(&store, &ctx, leaf, hub, EdgeType::Calls).await;
        link(&store, &ctx, other, hub, EdgeType::Calls).await;

        let engine = QueryEngine::new(store.clone());
        let ranked = engine.find_bottlenecks("p").await.unwrap();
        assert_eq!(ranked[0].node.id, hub);
        assert_eq!(ranked[0].incoming, 2);
        assert!((ranked[0].centrality - 4.0 * 5f64.ln()).abs() < 1e-9);
        assert!((ranked[1].centrality - 2f64.ln()).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_search_merges_name_and_content_hits() {
        let (store, ctx) = setup().await;
        function(&store, &ctx, "parseConfig", 1).await;
        function(&store, &ctx, "render", 1).await;
        store
            .add_node(
                &ctx,
                NodeDraft::new("a.ts:9:load", NodeType::Function, Location::new("a.ts", 9, 9))
                    .with_name("load")
                    .with_docstring("parse config from disk"),
            )
            .await
            .unwrap();

        let engine = QueryEngine::new(store.clone());
        let by_name = engine
            .search_nodes("p", "parseconfig", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].node.display_name(), "parseConfig");
        assert_eq!(by_name[0].score, 1.0);

        let widened = engine
            .search_nodes("p", "parse config", &SearchOptions::default().with_content())
            .await
            .unwrap();
        let found: Vec<&str> = widened.iter().map(|h| h.node.display_name()).collect();
        assert!(found.contains(&"load"));
        assert!(found.contains(&"parseConfig"));

        let err = engine
            .search_nodes("p", "x", &SearchOptions::default().with_limit(0))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_pinned_engine_hides_later_rows() {
        let (store, ctx) = setup().await;
        let a = function(&store, &ctx, "a", 1).await;
        let v2 = store.create_new_version("p", None, None).await.unwrap();
        let later = GraphContext::new("p", v2);
        let b = function(&store, &later, "b", 1).await;
        link(&store, &later, b, a, EdgeType::Calls).await;

        let engine = QueryEngine::new(store.clone());
        let pinned = engine.at_version(ctx.version_id);
        assert_eq!(pinned.pinned_version(), Some(ctx.version_id));
        assert_eq!(engine.pinned_version(), None);
        assert!(pinned.node(b).await.unwrap().is_none());
        assert!(pinned.find_callers(a).await.unwrap().is_empty());
        assert_eq!(names(&engine.find_callers(a).await.unwrap()), vec!["b"]);
    }
}
