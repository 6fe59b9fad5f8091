//! Graph store: durable CRUD, versioning and query primitives.
//!
//! The [`GraphStore`] trait is the only seam through which the builder, the
//! updater and the query engine touch persisted state. Implementations own
//! their concurrency and retry behavior; the engine keeps no shared mutable
//! state of its own.
//!
//! Contract summary:
//! - Lookups return `Ok(None)` on absence.
//! - Duplicate keys, writes against a superseded version, and edges whose
//!   endpoints are missing fail with [`GraphError::Conflict`].
//! - Deleting a node removes its edges first, then the node.
//! - [`GraphStore::log_update_operation`] is best-effort: callers log after
//!   the mutation and ignore (but trace) its failure.

mod memory;
pub mod rollback;

pub use memory::MemoryGraphStore;
pub use rollback::{IdRemap, ReverseMutation, apply_reversal};

use crate::error::{GraphError, Result};
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A node removed from the store together with the edges that cascaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedNode {
    pub node: GraphNode,
    pub edges: Vec<GraphEdge>,
}

/// Storage contract for the code property graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========================================================================
    // Versions
    // ========================================================================

    /// Create a new version for a project.
    ///
    /// Without a parent the version chains to the project's current version.
    /// An explicit parent must be the current version.
    async fn create_new_version(
        &self,
        project_id: &str,
        parent: Option<VersionId>,
        checksum: Option<String>,
    ) -> Result<VersionId>;

    async fn get_current_version(&self, project_id: &str) -> Result<Option<Version>>;

    async fn get_version(&self, version_id: VersionId) -> Result<Option<Version>>;

    /// Most recent versions first.
    async fn get_version_history(&self, project_id: &str, limit: usize) -> Result<Vec<Version>>;

    // ========================================================================
    // Nodes
    // ========================================================================

    async fn add_node(&self, ctx: &GraphContext, draft: NodeDraft) -> Result<GraphNode>;

    /// Patch a node in place and reassign it to `ctx.version_id`.
    async fn update_node(
        &self,
        ctx: &GraphContext,
        node_id: NodeId,
        patch: NodePatch,
    ) -> Result<Option<GraphNode>>;

    /// Remove a node and every edge referencing it.
    async fn delete_node(&self, node_id: NodeId) -> Result<Option<DeletedNode>>;

    async fn get_node(&self, node_id: NodeId) -> Result<Option<GraphNode>>;

    /// Look up by key; `None` for `version_id` means the current version.
    async fn get_node_by_key(
        &self,
        project_id: &str,
        node_key: &str,
        version_id: Option<VersionId>,
    ) -> Result<Option<GraphNode>>;

    async fn query_nodes(
        &self,
        project_id: &str,
        filter: &NodeFilter,
    ) -> Result<QueryResult<GraphNode>>;

    // ========================================================================
    // Edges
    // ========================================================================

    async fn add_edge(&self, ctx: &GraphContext, draft: EdgeDraft) -> Result<GraphEdge>;

    async fn update_edge(
        &self,
        ctx: &GraphContext,
        edge_id: EdgeId,
        patch: EdgePatch,
    ) -> Result<Option<GraphEdge>>;

    async fn delete_edge(&self, edge_id: EdgeId) -> Result<Option<GraphEdge>>;

    async fn get_edge(&self, edge_id: EdgeId) -> Result<Option<GraphEdge>>;

    async fn query_edges(
        &self,
        project_id: &str,
        filter: &EdgeFilter,
    ) -> Result<QueryResult<GraphEdge>>;

    // ========================================================================
    // Graph Queries
    // ========================================================================

    /// Simple cycles over dependency edges with at most `max_depth` edges.
    /// Each cycle is reported once, starting at its smallest node id.
    async fn find_circular_dependencies(
        &self,
        project_id: &str,
        max_depth: usize,
    ) -> Result<Vec<Vec<NodeId>>>;

    async fn get_node_with_connections(
        &self,
        node_id: NodeId,
    ) -> Result<Option<NodeWithConnections>>;

    async fn get_graph_statistics(&self, project_id: &str) -> Result<GraphStatistics>;

    // ========================================================================
    // Audit Log
    // ========================================================================

    async fn log_update_operation(
        &self,
        ctx: &GraphContext,
        op: OperationDraft,
    ) -> Result<OperationId>;

    /// Operations in creation order, optionally restricted to one version.
    async fn list_operations(
        &self,
        project_id: &str,
        version_id: Option<VersionId>,
    ) -> Result<Vec<UpdateOperation>>;
}

/// Thread-safe shared store handle.
pub type SharedStore = Arc<dyn GraphStore>;

/// Create an empty in-memory store behind a shared handle.
pub fn create_memory_store() -> SharedStore {
    Arc::new(MemoryGraphStore::new())
}

/// Every node of a file in the current version, in creation order.
pub async fn nodes_in_file(
    store: &dyn GraphStore,
    project_id: &str,
    file_path: &str,
) -> Result<Vec<GraphNode>> {
    let page = store
        .query_nodes(project_id, &NodeFilter::new().in_file(file_path))
        .await?;
    Ok(page.data)
}

/// Reject empty project ids before they reach a backend.
pub(crate) fn ensure_project_id(project_id: &str) -> Result<()> {
    if project_id.trim().is_empty() {
        return Err(GraphError::invalid("project id must not be empty"));
    }
    Ok(())
}
