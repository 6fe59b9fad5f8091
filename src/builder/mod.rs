//! Graph builder: turns source files into nodes and edges of a version.

pub mod extract;
pub mod purpose;

pub use extract::{ExtractedNode, FileExtraction, Relation, content_hash, extract_file};
pub use purpose::{AnnotationReport, LimitedSummarizer, NodeDescriptor, Summarizer, annotate_purposes};

use crate::config::EngineConfig;
use crate::discovery::{FileDiscovery, relative_path};
use crate::parsing::{SourceParser, TreeSitterParser};
use crate::store::SharedStore;
use crate::types::*;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// An existing node rewritten in place during a persist.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRewrite {
    pub node_id: NodeId,
    pub patch: NodePatch,
    /// Restores the values the patch replaced
    pub inverse: NodePatch,
}

/// Nodes of one file as stored, plus what it took to store them.
#[derive(Debug, Clone, Default)]
pub struct PersistedFile {
    pub stats: FileBuildStats,
    /// Stored node per key, in extraction order
    pub nodes: Vec<GraphNode>,
    /// Ids of nodes inserted by this persist
    pub created: Vec<NodeId>,
    pub rewrites: Vec<NodeRewrite>,
    /// Stored functions still lacking a purpose
    pub pending: Vec<NodeDescriptor>,
}

impl PersistedFile {
    pub fn ids_by_key(&self) -> HashMap<String, NodeId> {
        self.nodes
            .iter()
            .map(|n| (n.node_key.clone(), n.id))
            .collect()
    }
}

/// Builds graph content from source files.
pub struct GraphBuilder {
    store: SharedStore,
    parser: Arc<dyn SourceParser>,
    summarizer: Option<Arc<dyn Summarizer>>,
    config: EngineConfig,
    annotations: Mutex<JoinSet<AnnotationReport>>,
    /// Reports of passes reaped before anyone waited on them
    finished: Mutex<Vec<AnnotationReport>>,
    /// Shared by every pass so concurrent passes stay within the batch size
    summary_permits: Arc<Semaphore>,
}

impl GraphBuilder {
    pub fn new(store: SharedStore) -> Self {
        let config = EngineConfig::default();
        Self {
            store,
            parser: Arc::new(TreeSitterParser),
            summarizer: None,
            summary_permits: Arc::new(Semaphore::new(config.purpose_batch_size.max(1))),
            config,
            annotations: Mutex::new(JoinSet::new()),
            finished: Mutex::new(Vec::new()),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn SourceParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.summary_permits = Arc::new(Semaphore::new(config.purpose_batch_size.max(1)));
        self.config = config;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Extract one file. `None` for unsupported or unparsable content.
    pub fn extract(&self, relative_path: &str, content: &str) -> Option<FileExtraction> {
        extract_file(self.parser.as_ref(), relative_path, content)
    }

    /// Extract and persist one file into `ctx`. Functions that need a purpose
    /// come back in `pending`; the caller decides when to schedule them.
    pub async fn process_file(
        &self,
        ctx: &GraphContext,
        relative_path: &str,
        content: &str,
    ) -> Result<PersistedFile> {
        let Some(extraction) = self.extract(relative_path, content) else {
            tracing::debug!("No significant nodes extracted from {}", relative_path);
            return Ok(PersistedFile::default());
        };
        self.persist(ctx, &extraction).await
    }

    /// Store an extraction: nodes first, then edges between stored nodes.
    ///
    /// A key that already exists is updated in place. Relations whose
    /// endpoints did not make it into the store are dropped and counted.
    pub async fn persist(&self, ctx: &GraphContext, extraction: &FileExtraction) -> Result<PersistedFile> {
        let mut persisted = PersistedFile::default();

        for extracted in &extraction.nodes {
            let draft = extracted.draft.clone();
            match self.store.add_node(ctx, draft).await {
                Ok(node) => {
                    persisted.stats.nodes_added += 1;
                    persisted.created.push(node.id);
                    persisted.nodes.push(node);
                }
                Err(err) if err.is_conflict() => {
                    let key = &extracted.draft.node_key;
                    let existing = self
                        .store
                        .get_node_by_key(&ctx.project_id, key, None)
                        .await?
                        .ok_or(err)
                        .with_context(|| format!("Failed to add node {key}"))?;
                    let patch = NodePatch::between(&existing, &extracted.draft);
                    let inverse = patch.inverse(&existing);
                    if let Some(node) = self.store.update_node(ctx, existing.id, patch.clone()).await? {
                        persisted.stats.nodes_updated += 1;
                        persisted.rewrites.push(NodeRewrite {
                            node_id: node.id,
                            patch,
                            inverse,
                        });
                        persisted.nodes.push(node);
                    }
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("Failed to add node {}", extracted.draft.node_key));
                }
            }
        }

        let ids = persisted.ids_by_key();
        for relation in &extraction.relations {
            let (Some(&source), Some(&target)) = (
                ids.get(relation.source_key.as_str()),
                ids.get(relation.target_key.as_str()),
            ) else {
                tracing::debug!(
                    "Dropping {} edge {} -> {}: endpoint not stored",
                    relation.edge_type,
                    relation.source_key,
                    relation.target_key
                );
                persisted.stats.edges_dropped += 1;
                continue;
            };

            match self
                .store
                .add_edge(ctx, EdgeDraft::new(source, target, relation.edge_type))
                .await
            {
                Ok(_) => persisted.stats.edges_added += 1,
                // Already present from an earlier build
                Err(err) if err.is_conflict() => {}
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("Failed to add edge {} -> {}", relation.source_key, relation.target_key)
                    });
                }
            }
        }

        persisted.pending = descriptors(extraction, &persisted);
        Ok(persisted)
    }

    /// Build every supported file under the project root into a new version.
    pub async fn build_graph_from_project(&self, build: &BuildContext) -> Result<GraphUpdateResult> {
        let started = Instant::now();
        tracing::info!(
            "Starting build of project {} from {}",
            build.project_id,
            build.root_path.display()
        );

        let version = self
            .store
            .create_new_version(&build.project_id, None, build.checksum.clone())
            .await
            .context("Failed to create build version")?;
        let ctx = GraphContext::new(build.project_id.clone(), version);
        let mut result = GraphUpdateResult::new(&build.project_id, version);

        let mut discovery = FileDiscovery::new().with_max_file_size(self.config.max_file_size);
        for pattern in &build.include_patterns {
            discovery = discovery.with_include(pattern);
        }
        for pattern in &build.exclude_patterns {
            discovery = discovery.with_exclude(pattern);
        }
        let root = build.root_path.clone();
        let files = discovery
            .discover(&root)
            .with_context(|| format!("Failed to enumerate {}", root.display()))?;
        tracing::info!("Discovered {} files", files.len());

        // Read and extract concurrently, persist in discovery order
        let extractions = stream::iter(files)
            .map(|path| {
                let parser = Arc::clone(&self.parser);
                let root = root.clone();
                async move {
                    let rel = relative_path(&root, &path);
                    let outcome = read_and_extract(parser, path, rel.clone()).await;
                    (rel, outcome)
                }
            })
            .buffered(self.config.max_concurrent_files.max(1));
        futures::pin_mut!(extractions);

        let mut pending = Vec::new();
        while let Some((rel, outcome)) = extractions.next().await {
            let extraction = match outcome {
                Ok(Some(extraction)) => extraction,
                Ok(None) => {
                    tracing::debug!("Skipping {}: nothing to extract", rel);
                    result.files_processed += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Failed to extract {}: {:#}", rel, e);
                    result.record_error(rel, format!("{e:#}"));
                    continue;
                }
            };

            match self.persist(&ctx, &extraction).await {
                Ok(persisted) => {
                    result.files_processed += 1;
                    result.absorb(persisted.stats);
                    pending.extend(persisted.pending);
                }
                Err(e) => {
                    tracing::warn!("Failed to persist {}: {:#}", rel, e);
                    result.record_error(rel, format!("{e:#}"));
                }
            }
        }

        self.schedule_annotations(&ctx, pending);

        result.success = result.errors.is_empty();
        result.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "Build complete: {} files, {} nodes added, {} updated, {} edges added, {} dropped, {} errors",
            result.files_processed,
            result.nodes_added,
            result.nodes_updated,
            result.edges_added,
            result.edges_dropped,
            result.errors.len()
        );
        Ok(result)
    }

    /// Await every annotation pass queued so far, including those that
    /// already finished.
    pub async fn wait_for_annotations(&self) -> Vec<AnnotationReport> {
        let mut running = std::mem::take(&mut *self.annotations.lock());
        let mut reports = std::mem::take(&mut *self.finished.lock());
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => tracing::warn!("Annotation task failed: {}", e),
            }
        }
        reports
    }

    /// Annotation passes spawned and not yet reaped.
    pub fn pending_annotations(&self) -> usize {
        self.annotations.lock().len()
    }

    /// Queue one background annotation pass over `items`.
    ///
    /// Finished passes are reaped here, so a long-lived builder holds on to
    /// their reports only.
    pub fn schedule_annotations(&self, ctx: &GraphContext, items: Vec<NodeDescriptor>) {
        let Some(summarizer) = self.summarizer.clone() else {
            return;
        };
        if !self.config.annotate_purposes || items.is_empty() {
            return;
        }
        let summarizer: Arc<dyn Summarizer> = Arc::new(LimitedSummarizer::new(
            summarizer,
            Arc::clone(&self.summary_permits),
        ));

        let mut running = self.annotations.lock();
        while let Some(joined) = running.try_join_next() {
            match joined {
                Ok(report) => self.finished.lock().push(report),
                Err(e) => tracing::warn!("Annotation task failed: {}", e),
            }
        }
        tracing::debug!("Scheduling purpose annotation for {} functions", items.len());
        running.spawn(annotate_purposes(
            Arc::clone(&self.store),
            ctx.clone(),
            summarizer,
            items,
            self.config.purpose_batch_size,
            Duration::from_millis(self.config.purpose_batch_delay_ms),
        ));
    }
}

async fn read_and_extract(
    parser: Arc<dyn SourceParser>,
    path: PathBuf,
    relative_path: String,
) -> Result<Option<FileExtraction>> {
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    tokio::task::spawn_blocking(move || extract_file(parser.as_ref(), &relative_path, &content))
        .await
        .context("Extraction task panicked")
}

/// Functions of a persisted file that still lack a purpose.
fn descriptors(extraction: &FileExtraction, persisted: &PersistedFile) -> Vec<NodeDescriptor> {
    persisted
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Function && n.purpose.is_none())
        .map(|n| NodeDescriptor {
            node_id: n.id,
            node_key: n.node_key.clone(),
            name: n.display_name().to_string(),
            file_path: n.location.file_path.clone(),
            language: n.language.clone(),
            signature: n.signature.clone(),
            docstring: n.docstring.clone(),
            source: extraction
                .node(&n.node_key)
                .map(|e| e.source.clone())
                .unwrap_or_default(),
        })
        .collect()
}
