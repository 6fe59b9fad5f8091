//! Incremental updater.
//!
//! Turns a batch of file changes into the smallest set of store mutations it
//! can find, logging each one so it can be reversed later.

pub mod diff;

pub use diff::{AstDiff, MovedNode, diff_extractions};

use crate::builder::{FileExtraction, GraphBuilder, NodeDescriptor, PersistedFile};
use crate::store::{GraphStore, IdRemap, SharedStore, apply_reversal, nodes_in_file};
use crate::types::*;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Edge types derived from a single file's content.
const INTRA_FILE_EDGES: [EdgeType; 3] = [EdgeType::Calls, EdgeType::Uses, EdgeType::Contains];

/// Outcome of reverting a set of logged operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertReport {
    pub version_id: Option<VersionId>,
    pub reverted: usize,
    pub errors: Vec<String>,
}

/// Applies file-level changes to an existing graph.
pub struct IncrementalUpdater {
    builder: Arc<GraphBuilder>,
}

impl IncrementalUpdater {
    pub fn new(builder: Arc<GraphBuilder>) -> Self {
        Self { builder }
    }

    fn store(&self) -> &SharedStore {
        self.builder.store()
    }

    /// Apply a batch of changes under a fresh version.
    ///
    /// Each change is handled on its own: a failing file is recorded in
    /// `errors` and the rest of the batch still goes through.
    pub async fn update_from_file_changes(
        &self,
        project_id: &str,
        changes: &[FileChange],
        context: &UpdateContext,
    ) -> Result<GraphUpdateResult> {
        let started = Instant::now();
        tracing::info!(
            "Applying {} file changes to project {}",
            changes.len(),
            project_id
        );

        let version = self
            .store()
            .create_new_version(project_id, None, None)
            .await
            .context("Failed to create update version")?;
        let ctx = GraphContext::new(project_id, version);
        let mut result = GraphUpdateResult::new(project_id, version);
        let mut pending = Vec::new();

        for change in changes {
            let outcome = match change.change_type {
                ChangeType::Added => {
                    self.apply_added(&ctx, change, context, &mut result, &mut pending)
                        .await
                }
                ChangeType::Deleted => self.apply_deleted(&ctx, &change.path, &mut result).await,
                ChangeType::Renamed => self.apply_renamed(&ctx, change, &mut result).await,
                ChangeType::Modified => {
                    self.apply_modified(&ctx, change, context, &mut result, &mut pending)
                        .await
                }
            };
            match outcome {
                Ok(()) => result.files_processed += 1,
                Err(e) => {
                    tracing::warn!("Failed to apply change to {}: {:#}", change.path, e);
                    result.record_error(change.path.clone(), format!("{e:#}"));
                }
            }
        }

        // One pass for the whole batch
        self.builder.schedule_annotations(&ctx, pending);

        result.success = result.errors.is_empty();
        result.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "Update complete: {} files, +{} ~{} -{} nodes, +{} -{} edges, {} ops, {} errors",
            result.files_processed,
            result.nodes_added,
            result.nodes_updated,
            result.nodes_deleted,
            result.edges_added,
            result.edges_deleted,
            result.operations_logged,
            result.errors.len()
        );
        Ok(result)
    }

    async fn apply_added(
        &self,
        ctx: &GraphContext,
        change: &FileChange,
        context: &UpdateContext,
        result: &mut GraphUpdateResult,
        pending: &mut Vec<NodeDescriptor>,
    ) -> Result<()> {
        let content = load_content(context, &change.path, change.new_content.as_deref()).await?;
        self.add_file(ctx, &change.path, &content, result, pending).await
    }

    /// Persist a whole file through the builder and log what it created.
    /// Functions awaiting a purpose are appended to `pending`.
    async fn add_file(
        &self,
        ctx: &GraphContext,
        path: &str,
        content: &str,
        result: &mut GraphUpdateResult,
        pending: &mut Vec<NodeDescriptor>,
    ) -> Result<()> {
        let mut persisted = self.builder.process_file(ctx, path, content).await?;
        result.absorb(persisted.stats);
        pending.append(&mut persisted.pending);
        self.log_persisted(ctx, path, &persisted, result).await;
        Ok(())
    }

    async fn log_persisted(
        &self,
        ctx: &GraphContext,
        path: &str,
        persisted: &PersistedFile,
        result: &mut GraphUpdateResult,
    ) {
        let created: HashSet<NodeId> = persisted.created.iter().copied().collect();
        for node in persisted.nodes.iter().filter(|n| created.contains(&n.id)) {
            self.log_node_added(ctx, path, node, result).await;
        }
        for rewrite in &persisted.rewrites {
            self.log(
                ctx,
                result,
                OperationDraft {
                    operation_type: OperationType::UpdateNode,
                    node_id: Some(rewrite.node_id),
                    edge_id: None,
                    operation_data: serde_json::to_value(&rewrite.patch).unwrap_or_default(),
                    rollback_data: serde_json::to_value(&rewrite.inverse).ok(),
                    file_path: Some(path.to_string()),
                    change_reason: ChangeReason::NodeModified,
                },
            )
            .await;
        }
    }

    async fn apply_deleted(
        &self,
        ctx: &GraphContext,
        path: &str,
        result: &mut GraphUpdateResult,
    ) -> Result<()> {
        let nodes = nodes_in_file(self.store().as_ref(), &ctx.project_id, path).await?;
        for node in nodes {
            self.delete_node(ctx, path, node.id, result).await?;
        }
        Ok(())
    }

    async fn delete_node(
        &self,
        ctx: &GraphContext,
        path: &str,
        node_id: NodeId,
        result: &mut GraphUpdateResult,
    ) -> Result<()> {
        let Some(deleted) = self.store().delete_node(node_id).await? else {
            return Ok(());
        };
        result.nodes_deleted += 1;
        result.edges_deleted += deleted.edges.len();
        let operation_data = json!({ "nodeKey": deleted.node.node_key });
        self.log(
            ctx,
            result,
            OperationDraft {
                operation_type: OperationType::DeleteNode,
                node_id: Some(node_id),
                edge_id: None,
                operation_data,
                rollback_data: serde_json::to_value(&deleted).ok(),
                file_path: Some(path.to_string()),
                change_reason: ChangeReason::NodeDeleted,
            },
        )
        .await;
        Ok(())
    }

    /// Rewrite keys and locations of every node under the old path. Content
    /// is assumed unchanged.
    async fn apply_renamed(
        &self,
        ctx: &GraphContext,
        change: &FileChange,
        result: &mut GraphUpdateResult,
    ) -> Result<()> {
        let old_path = change
            .old_path
            .as_deref()
            .with_context(|| format!("Rename of {} carries no old path", change.path))?;
        let old_prefix = format!("{old_path}:");

        let nodes = nodes_in_file(self.store().as_ref(), &ctx.project_id, old_path).await?;
        for node in nodes {
            let suffix = node
                .node_key
                .strip_prefix(&old_prefix)
                .unwrap_or(&node.node_key);
            let new_key = format!("{}:{}", change.path, suffix);
            let mut location = node.location.clone();
            location.file_path = change.path.clone();

            let patch = NodePatch::relocate(new_key, location);
            let inverse = patch.inverse(&node);
            let updated = self
                .store()
                .update_node(ctx, node.id, patch.clone())
                .await
                .with_context(|| format!("Failed to relocate {}", node.node_key))?;
            if updated.is_none() {
                continue;
            }
            result.nodes_updated += 1;
            self.log(
                ctx,
                result,
                OperationDraft {
                    operation_type: OperationType::UpdateNode,
                    node_id: Some(node.id),
                    edge_id: None,
                    operation_data: serde_json::to_value(&patch).unwrap_or_default(),
                    rollback_data: serde_json::to_value(&inverse).ok(),
                    file_path: Some(change.path.clone()),
                    change_reason: ChangeReason::FileRenamed,
                },
            )
            .await;
        }
        Ok(())
    }

    async fn apply_modified(
        &self,
        ctx: &GraphContext,
        change: &FileChange,
        context: &UpdateContext,
        result: &mut GraphUpdateResult,
        pending: &mut Vec<NodeDescriptor>,
    ) -> Result<()> {
        let path = change.path.as_str();
        let new_content = load_content(context, path, change.new_content.as_deref()).await?;

        let extractions = change.old_content.as_deref().and_then(|old| {
            let old = self.builder.extract(path, old)?;
            let new = self.builder.extract(path, &new_content)?;
            Some((old, new))
        });

        match extractions {
            Some((old, new)) => self.apply_diff(ctx, &old, &new, result).await,
            None => {
                tracing::debug!("No diffable content for {}, replacing whole file", path);
                self.apply_deleted(ctx, path, result).await?;
                self.add_file(ctx, path, &new_content, result, pending).await
            }
        }
    }

    /// Apply a diff in order: deletions, additions, modifications, moves.
    /// Intra-file edges are reconciled afterwards.
    async fn apply_diff(
        &self,
        ctx: &GraphContext,
        old: &FileExtraction,
        new: &FileExtraction,
        result: &mut GraphUpdateResult,
    ) -> Result<()> {
        let diff = diff_extractions(old, new);
        let path = new.file_path.as_str();
        tracing::debug!(
            "Diff of {}: +{} -{} ~{} moved {} unchanged {}",
            path,
            diff.added.len(),
            diff.deleted.len(),
            diff.modified.len(),
            diff.moved.len(),
            diff.unchanged
        );
        let store = self.store();

        for key in &diff.deleted {
            if let Some(node) = store.get_node_by_key(&ctx.project_id, key, None).await? {
                self.delete_node(ctx, path, node.id, result).await?;
            }
        }

        for key in &diff.added {
            if let Some(extracted) = new.node(key) {
                self.insert_node(ctx, path, extracted.draft.clone(), result).await?;
            }
        }

        for key in &diff.modified {
            let Some(extracted) = new.node(key) else {
                continue;
            };
            match store.get_node_by_key(&ctx.project_id, key, None).await? {
                Some(existing) => {
                    let patch = NodePatch::between(&existing, &extracted.draft);
                    self.patch_node(ctx, path, &existing, patch, ChangeReason::NodeModified, result)
                        .await?;
                }
                None => self.insert_node(ctx, path, extracted.draft.clone(), result).await?,
            }
        }

        for moved in &diff.moved {
            let Some(extracted) = new.node(&moved.new_key) else {
                continue;
            };
            match store.get_node_by_key(&ctx.project_id, &moved.old_key, None).await? {
                Some(existing) => {
                    let patch =
                        NodePatch::relocate(moved.new_key.clone(), extracted.draft.location.clone());
                    self.patch_node(ctx, path, &existing, patch, ChangeReason::NodeMoved, result)
                        .await?;
                }
                None => self.insert_node(ctx, path, extracted.draft.clone(), result).await?,
            }
        }

        self.reconcile_edges(ctx, new, result).await
    }

    async fn insert_node(
        &self,
        ctx: &GraphContext,
        path: &str,
        draft: NodeDraft,
        result: &mut GraphUpdateResult,
    ) -> Result<()> {
        let key = draft.node_key.clone();
        let node = self
            .store()
            .add_node(ctx, draft)
            .await
            .with_context(|| format!("Failed to add node {key}"))?;
        result.nodes_added += 1;
        self.log_node_added(ctx, path, &node, result).await;
        Ok(())
    }

    async fn log_node_added(
        &self,
        ctx: &GraphContext,
        path: &str,
        node: &GraphNode,
        result: &mut GraphUpdateResult,
    ) {
        self.log(
            ctx,
            result,
            OperationDraft {
                operation_type: OperationType::AddNode,
                node_id: Some(node.id),
                edge_id: None,
                operation_data: serde_json::to_value(node).unwrap_or_default(),
                rollback_data: None,
                file_path: Some(path.to_string()),
                change_reason: ChangeReason::NodeAdded,
            },
        )
        .await;
    }

    async fn patch_node(
        &self,
        ctx: &GraphContext,
        path: &str,
        existing: &GraphNode,
        patch: NodePatch,
        reason: ChangeReason,
        result: &mut GraphUpdateResult,
    ) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let inverse = patch.inverse(existing);
        let updated = self
            .store()
            .update_node(ctx, existing.id, patch.clone())
            .await
            .with_context(|| format!("Failed to update node {}", existing.node_key))?;
        if updated.is_none() {
            return Ok(());
        }
        result.nodes_updated += 1;
        self.log(
            ctx,
            result,
            OperationDraft {
                operation_type: OperationType::UpdateNode,
                node_id: Some(existing.id),
                edge_id: None,
                operation_data: serde_json::to_value(&patch).unwrap_or_default(),
                rollback_data: serde_json::to_value(&inverse).ok(),
                file_path: Some(path.to_string()),
                change_reason: reason,
            },
        )
        .await;
        Ok(())
    }

    /// Bring CALLS/USES/CONTAINS edges between nodes of the file in line with
    /// the new extraction.
    async fn reconcile_edges(
        &self,
        ctx: &GraphContext,
        extraction: &FileExtraction,
        result: &mut GraphUpdateResult,
    ) -> Result<()> {
        let path = extraction.file_path.as_str();
        let store = self.store();
        let nodes = nodes_in_file(store.as_ref(), &ctx.project_id, path).await?;
        let ids: HashMap<&str, NodeId> = nodes.iter().map(|n| (n.node_key.as_str(), n.id)).collect();
        let in_file: HashSet<NodeId> = ids.values().copied().collect();

        let mut desired = BTreeSet::new();
        for relation in &extraction.relations {
            match (
                ids.get(relation.source_key.as_str()),
                ids.get(relation.target_key.as_str()),
            ) {
                (Some(&source), Some(&target)) => {
                    desired.insert((source, target, relation.edge_type));
                }
                _ => result.edges_dropped += 1,
            }
        }

        let mut existing = Vec::new();
        for node in &nodes {
            let page = store
                .query_edges(
                    &ctx.project_id,
                    &EdgeFilter::new().from_node(node.id).of_types(&INTRA_FILE_EDGES),
                )
                .await?;
            existing.extend(
                page.data
                    .into_iter()
                    .filter(|e| in_file.contains(&e.target_node_id)),
            );
        }

        let mut present = BTreeSet::new();
        for edge in existing {
            let triple = (edge.source_node_id, edge.target_node_id, edge.edge_type);
            if desired.contains(&triple) {
                present.insert(triple);
                continue;
            }
            if let Some(removed) = store.delete_edge(edge.id).await? {
                result.edges_deleted += 1;
                self.log(
                    ctx,
                    result,
                    OperationDraft {
                        operation_type: OperationType::DeleteEdge,
                        node_id: None,
                        edge_id: Some(removed.id),
                        operation_data: json!({ "edgeId": removed.id }),
                        rollback_data: serde_json::to_value(&removed).ok(),
                        file_path: Some(path.to_string()),
                        change_reason: ChangeReason::EdgeRemoved,
                    },
                )
                .await;
            }
        }

        for (source, target, edge_type) in desired.difference(&present) {
            let edge = store
                .add_edge(ctx, EdgeDraft::new(*source, *target, *edge_type))
                .await
                .with_context(|| format!("Failed to add {edge_type} edge {source} -> {target}"))?;
            result.edges_added += 1;
            self.log(
                ctx,
                result,
                OperationDraft {
                    operation_type: OperationType::AddEdge,
                    node_id: None,
                    edge_id: Some(edge.id),
                    operation_data: serde_json::to_value(&edge).unwrap_or_default(),
                    rollback_data: None,
                    file_path: Some(path.to_string()),
                    change_reason: ChangeReason::EdgeAdded,
                },
            )
            .await;
        }
        Ok(())
    }

    /// Append to the operation log. Failures are traced and otherwise ignored.
    async fn log(&self, ctx: &GraphContext, result: &mut GraphUpdateResult, op: OperationDraft) {
        let operation_type = op.operation_type;
        match self.store().log_update_operation(ctx, op).await {
            Ok(_) => result.operations_logged += 1,
            Err(e) => tracing::warn!("Failed to log {:?} operation: {}", operation_type, e),
        }
    }

    /// Undo `operations` in reverse creation order under `ctx`.
    ///
    /// Best-effort: an operation that cannot be reversed is reported and
    /// skipped. Restored rows get fresh ids; later reversals follow them.
    pub async fn revert_operations(
        &self,
        ctx: &GraphContext,
        operations: &[UpdateOperation],
    ) -> RevertReport {
        let mut ordered: Vec<&UpdateOperation> = operations.iter().collect();
        ordered.sort_by(|a, b| b.id.cmp(&a.id));

        let store: &dyn GraphStore = self.store().as_ref();
        let mut remap = IdRemap::default();
        let mut report = RevertReport {
            version_id: Some(ctx.version_id),
            ..RevertReport::default()
        };

        for op in ordered {
            let outcome = match op.reverse() {
                Ok(mutation) => apply_reversal(store, ctx, mutation, &mut remap).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => report.reverted += 1,
                Err(e) => {
                    tracing::warn!("Failed to revert operation {}: {}", op.id, e);
                    report.errors.push(format!("operation {}: {}", op.id, e));
                }
            }
        }
        report
    }

    /// Undo every operation logged under `version_id` in a new version.
    pub async fn revert_version(&self, project_id: &str, version_id: VersionId) -> Result<RevertReport> {
        let operations = self
            .store()
            .list_operations(project_id, Some(version_id))
            .await
            .context("Failed to load operations")?;
        let version = self
            .store()
            .create_new_version(project_id, None, None)
            .await
            .context("Failed to create revert version")?;
        tracing::info!(
            "Reverting {} operations of version {} in version {}",
            operations.len(),
            version_id,
            version
        );
        let ctx = GraphContext::new(project_id, version);
        Ok(self.revert_operations(&ctx, &operations).await)
    }
}

/// Inline content, or the file under the context root.
async fn load_content(context: &UpdateContext, path: &str, inline: Option<&str>) -> Result<String> {
    if let Some(content) = inline {
        return Ok(content.to_string());
    }
    let full = context.root_path.join(path);
    tokio::fs::read_to_string(&full)
        .await
        .with_context(|| format!("Failed to read {}", full.display()))
}
