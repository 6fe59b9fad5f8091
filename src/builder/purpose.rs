//! Best-effort natural-language purpose annotation for functions.

use crate::store::SharedStore;
use crate::types::*;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// What a summarizer gets to see of a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    pub node_id: NodeId,
    pub node_key: String,
    pub name: String,
    pub file_path: String,
    pub language: String,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub source: String,
}

/// Produces a one-line purpose for a function.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn purpose(&self, node: &NodeDescriptor) -> anyhow::Result<String>;
}

/// Wraps a summarizer so at most as many calls as `permits` allows are in
/// flight at once, across every pass sharing the semaphore.
pub struct LimitedSummarizer {
    inner: Arc<dyn Summarizer>,
    permits: Arc<Semaphore>,
}

impl LimitedSummarizer {
    pub fn new(inner: Arc<dyn Summarizer>, permits: Arc<Semaphore>) -> Self {
        Self { inner, permits }
    }
}

#[async_trait]
impl Summarizer for LimitedSummarizer {
    async fn purpose(&self, node: &NodeDescriptor) -> anyhow::Result<String> {
        let _permit = self.permits.acquire().await?;
        self.inner.purpose(node).await
    }
}

/// Outcome of one annotation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationReport {
    pub annotated: usize,
    pub failed: usize,
    /// Empty purposes are not written
    pub skipped: usize,
}

/// Annotate `items` in batches, pausing between batches. Failures are
/// counted and traced, never propagated.
pub async fn annotate_purposes(
    store: SharedStore,
    ctx: GraphContext,
    summarizer: Arc<dyn Summarizer>,
    items: Vec<NodeDescriptor>,
    batch_size: usize,
    delay: Duration,
) -> AnnotationReport {
    let mut report = AnnotationReport::default();
    let batches: Vec<&[NodeDescriptor]> = items.chunks(batch_size.max(1)).collect();

    for (i, batch) in batches.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let results = join_all(batch.iter().map(|item| summarizer.purpose(item))).await;
        for (item, result) in batch.iter().zip(results) {
            let purpose = match result {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    tracing::warn!("Summarizer failed for {}: {:#}", item.node_key, e);
                    report.failed += 1;
                    continue;
                }
            };
            if purpose.is_empty() {
                report.skipped += 1;
                continue;
            }

            let patch = NodePatch {
                purpose: Some(Some(purpose)),
                ..NodePatch::default()
            };
            match store.update_node(&ctx, item.node_id, patch).await {
                Ok(Some(_)) => report.annotated += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!("Failed to store purpose for {}: {}", item.node_key, e);
                    report.failed += 1;
                }
            }
        }
    }

    tracing::debug!(
        "Purpose pass: {} annotated, {} failed, {} skipped",
        report.annotated,
        report.failed,
        report.skipped
    );
    report
}
