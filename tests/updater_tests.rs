//! Incremental updates end to end: build, change, diff, revert.

use async_trait::async_trait;
use omni_cpg::store::nodes_in_file;
use omni_cpg::*;
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const MATH_TS: &str = "\
export function add(a: number, b: number): number {
    return a + b;
}

export function twice(x: number): number {
    return add(x, x);
}
";

struct Fixture {
    _temp: tempfile::TempDir,
    store: SharedStore,
    updater: IncrementalUpdater,
    context: UpdateContext,
}

async fn fixture() -> Fixture {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(temp.path().join("src")).expect("mkdir");
    fs::write(temp.path().join("src/math.ts"), MATH_TS).expect("write");

    let store = create_memory_store();
    let builder = Arc::new(GraphBuilder::new(store.clone()));
    builder
        .build_graph_from_project(&BuildContext::new("calc", temp.path()))
        .await
        .expect("initial build");

    Fixture {
        context: UpdateContext::new(temp.path()),
        _temp: temp,
        store,
        updater: IncrementalUpdater::new(builder),
    }
}

impl Fixture {
    async fn apply(&self, changes: Vec<FileChange>) -> GraphUpdateResult {
        self.updater
            .update_from_file_changes("calc", &changes, &self.context)
            .await
            .expect("update batch")
    }

    async fn snapshot(&self, path: &str) -> Vec<(String, String)> {
        let mut nodes: Vec<(String, String)> = nodes_in_file(self.store.as_ref(), "calc", path)
            .await
            .expect("nodes")
            .into_iter()
            .map(|n| (n.node_key, n.hash))
            .collect();
        nodes.sort();
        nodes
    }

    async fn ids(&self, path: &str) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = nodes_in_file(self.store.as_ref(), "calc", path)
            .await
            .expect("nodes")
            .into_iter()
            .map(|n| n.id)
            .collect();
        ids.sort();
        ids
    }
}

#[tokio::test]
async fn test_rename_keeps_rows_and_edges() {
    let f = fixture().await;
    let ids_before = f.ids("src/math.ts").await;
    let edges_before = f.store.get_graph_statistics("calc").await.expect("stats").total_edges;

    let result = f
        .apply(vec![FileChange::renamed("src/math.ts", "lib/math.ts")])
        .await;
    assert!(result.success);
    assert_eq!(result.nodes_added, 0);
    assert_eq!(result.nodes_deleted, 0);
    assert_eq!(result.nodes_updated, ids_before.len());

    assert!(f.ids("src/math.ts").await.is_empty());
    assert_eq!(f.ids("lib/math.ts").await, ids_before);
    let twice = f
        .store
        .get_node_by_key("calc", "lib/math.ts:5:twice", None)
        .await
        .expect("lookup")
        .expect("renamed key");
    assert_eq!(twice.location.file_path, "lib/math.ts");
    assert_eq!(
        f.store.get_graph_statistics("calc").await.expect("stats").total_edges,
        edges_before
    );
}

#[tokio::test]
async fn test_modified_file_is_read_from_disk_when_content_is_omitted() {
    let f = fixture().await;
    let new = MATH_TS.replace("a + b", "b + a");
    fs::write(f.context.root_path.join("src/math.ts"), &new).expect("rewrite");

    let result = f
        .apply(vec![FileChange::modified("src/math.ts", Some(MATH_TS.into()), None)])
        .await;
    assert!(result.success);
    assert_eq!(result.nodes_updated, 1);
    assert_eq!(result.nodes_added + result.nodes_deleted, 0);

    let ops = f
        .store
        .list_operations("calc", result.version_id)
        .await
        .expect("ops");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation_type, OperationType::UpdateNode);
    assert_eq!(ops[0].change_reason, ChangeReason::NodeModified);
    let rollback: NodePatch =
        serde_json::from_value(ops[0].rollback_data.clone().expect("rollback")).expect("patch");
    assert!(rollback.hash.is_some());
}

#[tokio::test]
async fn test_batch_reports_partial_failure_and_keeps_successes() {
    let f = fixture().await;
    let result = f
        .apply(vec![
            FileChange::renamed("src/math.ts", "src/arith.ts"),
            FileChange::added("src/missing.ts", None),
            FileChange::added("src/extra.ts", Some("export function extra() {}\n".into())),
        ])
        .await;

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].file_path, "src/missing.ts");
    assert_eq!(result.files_processed, 2);

    let current = f
        .store
        .get_current_version("calc")
        .await
        .expect("version")
        .expect("current");
    assert_eq!(Some(current.id), result.version_id);
    assert_eq!(f.ids("src/extra.ts").await.len(), 1);
    assert_eq!(f.ids("src/arith.ts").await.len(), 2);
}

#[tokio::test]
async fn test_reverting_a_rewrite_restores_the_file() {
    let f = fixture().await;
    let before = f.snapshot("src/math.ts").await;

    let rewritten = "\
export function twice(x: number): number {
    return x * 2;
}

export function half(x: number): number {
    return x / 2;
}
";
    let result = f
        .apply(vec![FileChange::modified(
            "src/math.ts",
            Some(MATH_TS.into()),
            Some(rewritten.into()),
        )])
        .await;
    assert!(result.success);
    assert_ne!(f.snapshot("src/math.ts").await, before);

    let report = f
        .updater
        .revert_version("calc", result.version_id.expect("version"))
        .await
        .expect("revert");
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(f.snapshot("src/math.ts").await, before);

    // The CALLS edge twice -> add comes back with the restored node
    let twice = f
        .store
        .get_node_by_key("calc", "src/math.ts:5:twice", None)
        .await
        .expect("lookup")
        .expect("restored");
    let engine = QueryEngine::new(f.store.clone());
    let callees = engine.find_callees(twice.id).await.expect("callees");
    assert_eq!(callees.len(), 1);
    assert_eq!(callees[0].display_name(), "add");
}

#[tokio::test]
async fn test_deleting_then_reverting_restores_edges() {
    let f = fixture().await;
    let before = f.snapshot("src/math.ts").await;

    let result = f.apply(vec![FileChange::deleted("src/math.ts")]).await;
    assert_eq!(result.nodes_deleted, 2);
    assert_eq!(result.edges_deleted, 1);
    assert!(f.snapshot("src/math.ts").await.is_empty());

    let report = f
        .updater
        .revert_version("calc", result.version_id.expect("version"))
        .await
        .expect("revert");
    assert_eq!(report.reverted, 2);
    assert_eq!(f.snapshot("src/math.ts").await, before);
    assert_eq!(
        f.store.get_graph_statistics("calc").await.expect("stats").total_edges,
        1
    );
}

/// Tracks how many summaries run at once.
#[derive(Default)]
struct CountingSummarizer {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay_ms: u64,
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    async fn purpose(&self, node: &NodeDescriptor) -> anyhow::Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("Returns {}", node.name))
    }
}

fn annotating_updater(summarizer: Arc<CountingSummarizer>) -> (Arc<GraphBuilder>, IncrementalUpdater) {
    let builder = Arc::new(
        GraphBuilder::new(create_memory_store())
            .with_config(EngineConfig::default().with_purpose_batching(5, 0))
            .with_summarizer(summarizer),
    );
    let updater = IncrementalUpdater::new(builder.clone());
    (builder, updater)
}

fn added_file(i: usize) -> FileChange {
    FileChange::added(
        format!("src/f{i}.ts"),
        Some(format!("export function f{i}(): number {{\n    return {i};\n}}\n")),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_added_files_share_one_bounded_annotation_pass() {
    let summarizer = Arc::new(CountingSummarizer {
        delay_ms: 20,
        ..CountingSummarizer::default()
    });
    let (builder, updater) = annotating_updater(summarizer.clone());
    let changes: Vec<FileChange> = (0..20).map(added_file).collect();

    let result = updater
        .update_from_file_changes("calc", &changes, &UpdateContext::new(std::env::temp_dir()))
        .await
        .expect("update batch");
    assert!(result.success);
    assert_eq!(builder.pending_annotations(), 1);

    let reports = builder.wait_for_annotations().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].annotated, 20);
    let peak = summarizer.peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 5, "peak concurrency {peak}");
}

#[tokio::test]
async fn test_finished_annotation_passes_are_reaped() {
    let summarizer = Arc::new(CountingSummarizer::default());
    let (builder, updater) = annotating_updater(summarizer);
    let context = UpdateContext::new(std::env::temp_dir());

    for i in 0..5 {
        updater
            .update_from_file_changes("calc", &[added_file(i)], &context)
            .await
            .expect("update batch");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // Earlier passes were reaped when the next one was scheduled
    assert_eq!(builder.pending_annotations(), 1);

    let reports = builder.wait_for_annotations().await;
    assert_eq!(reports.len(), 5);
    assert_eq!(reports.iter().map(|r| r.annotated).sum::<usize>(), 5);
}
