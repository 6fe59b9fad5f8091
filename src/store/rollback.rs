//! Rollback layered on the operation log.
//!
//! Each logged operation carries enough data to derive the mutation that
//! undoes it. Reversal is best-effort: restored nodes and edges get fresh ids,
//! which [`IdRemap`] tracks so later reversals in the same run address the
//! restored rows.

use super::{DeletedNode, GraphStore};
use crate::error::{GraphError, Result};
use crate::types::*;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// The mutation that undoes one logged operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReverseMutation {
    DeleteNode(NodeId),
    RestoreNode {
        node: GraphNode,
        edges: Vec<GraphEdge>,
    },
    PatchNode {
        node_id: NodeId,
        patch: NodePatch,
    },
    DeleteEdge(EdgeId),
    RestoreEdge(GraphEdge),
    PatchEdge {
        edge_id: EdgeId,
        patch: EdgePatch,
    },
}

fn rollback_payload<T: DeserializeOwned>(op: &UpdateOperation) -> Result<T> {
    let data = op.rollback_data.clone().ok_or_else(|| {
        GraphError::invalid(format!("operation {} carries no rollback data", op.id))
    })?;
    Ok(serde_json::from_value(data)?)
}

fn node_target(op: &UpdateOperation) -> Result<NodeId> {
    op.node_id
        .ok_or_else(|| GraphError::invalid(format!("operation {} has no node id", op.id)))
}

fn edge_target(op: &UpdateOperation) -> Result<EdgeId> {
    op.edge_id
        .ok_or_else(|| GraphError::invalid(format!("operation {} has no edge id", op.id)))
}

impl UpdateOperation {
    /// Derive the mutation that undoes this operation.
    pub fn reverse(&self) -> Result<ReverseMutation> {
        Ok(match self.operation_type {
            OperationType::AddNode => ReverseMutation::DeleteNode(node_target(self)?),
            OperationType::DeleteNode => {
                let deleted: DeletedNode = rollback_payload(self)?;
                ReverseMutation::RestoreNode {
                    node: deleted.node,
                    edges: deleted.edges,
                }
            }
            OperationType::UpdateNode => ReverseMutation::PatchNode {
                node_id: node_target(self)?,
                patch: rollback_payload(self)?,
            },
            OperationType::AddEdge => ReverseMutation::DeleteEdge(edge_target(self)?),
            OperationType::DeleteEdge => ReverseMutation::RestoreEdge(rollback_payload(self)?),
            OperationType::UpdateEdge => ReverseMutation::PatchEdge {
                edge_id: edge_target(self)?,
                patch: rollback_payload(self)?,
            },
        })
    }
}

/// Old id -> id of the restored row.
#[derive(Debug, Default, Clone)]
pub struct IdRemap {
    nodes: HashMap<NodeId, NodeId>,
    edges: HashMap<EdgeId, EdgeId>,
}

impl IdRemap {
    pub fn node(&self, id: NodeId) -> NodeId {
        self.nodes.get(&id).copied().unwrap_or(id)
    }

    pub fn edge(&self, id: EdgeId) -> EdgeId {
        self.edges.get(&id).copied().unwrap_or(id)
    }
}

async fn restore_edge(
    store: &dyn GraphStore,
    ctx: &GraphContext,
    edge: &GraphEdge,
    remap: &mut IdRemap,
) -> Result<()> {
    let mut draft = edge.to_draft();
    draft.source_node_id = remap.node(edge.source_node_id);
    draft.target_node_id = remap.node(edge.target_node_id);
    match store.add_edge(ctx, draft).await {
        Ok(restored) => {
            remap.edges.insert(edge.id, restored.id);
            Ok(())
        }
        // Endpoint gone or edge already back: nothing left to restore.
        Err(err) if err.is_conflict() => {
            tracing::debug!("Skipping restore of edge {}: {}", edge.id, err);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Apply one reverse mutation, recording id changes in `remap`.
pub async fn apply_reversal(
    store: &dyn GraphStore,
    ctx: &GraphContext,
    mutation: ReverseMutation,
    remap: &mut IdRemap,
) -> Result<()> {
    match mutation {
        ReverseMutation::DeleteNode(id) => {
            store.delete_node(remap.node(id)).await?;
        }
        ReverseMutation::RestoreNode { node, edges } => {
            let restored = store.add_node(ctx, node.to_draft()).await?;
            remap.nodes.insert(node.id, restored.id);
            for edge in &edges {
                restore_edge(store, ctx, edge, remap).await?;
            }
        }
        ReverseMutation::PatchNode { node_id, patch } => {
            store.update_node(ctx, remap.node(node_id), patch).await?;
        }
        ReverseMutation::DeleteEdge(id) => {
            store.delete_edge(remap.edge(id)).await?;
        }
        ReverseMutation::RestoreEdge(edge) => {
            restore_edge(store, ctx, &edge, remap).await?;
        }
        ReverseMutation::PatchEdge { edge_id, patch } => {
            store.update_edge(ctx, remap.edge(edge_id), patch).await?;
        }
    }
    Ok(())
}
