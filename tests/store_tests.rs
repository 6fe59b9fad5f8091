//! Store contract tests against the in-memory backend.

use omni_cpg::store::nodes_in_file;
use omni_cpg::*;
use std::sync::Arc;

async fn fresh() -> (Arc<MemoryGraphStore>, GraphContext) {
    let store = Arc::new(MemoryGraphStore::new());
    let version = store
        .create_new_version("proj", None, Some("abc123".into()))
        .await
        .expect("create version");
    (store, GraphContext::new("proj", version))
}

fn function(file: &str, line: usize, name: &str) -> NodeDraft {
    NodeDraft::new(
        node_key(file, line, name),
        NodeType::Function,
        Location::new(file, line, line + 2),
    )
    .with_name(name)
    .with_language("typescript")
}

#[tokio::test]
async fn test_versions_form_a_linear_chain() {
    let (store, ctx) = fresh().await;
    let second = store
        .create_new_version("proj", Some(ctx.version_id), None)
        .await
        .expect("child of current");

    let current = store
        .get_current_version("proj")
        .await
        .expect("lookup")
        .expect("current version");
    assert_eq!(current.id, second);
    assert_eq!(current.version_number, 2);
    assert_eq!(current.parent_version_id, Some(ctx.version_id));

    let history = store.get_version_history("proj", 10).await.expect("history");
    let ids: Vec<VersionId> = history.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![second, ctx.version_id]);
    assert_eq!(history[1].checksum.as_deref(), Some("abc123"));

    // The superseded version is neither a parent nor a write target
    let err = store
        .create_new_version("proj", Some(ctx.version_id), None)
        .await
        .expect_err("stale parent");
    assert!(err.is_conflict());
    let err = store
        .add_node(&ctx, function("a.ts", 1, "late"))
        .await
        .expect_err("stale write");
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_lookups_of_missing_rows_are_none() {
    let (store, _ctx) = fresh().await;
    assert!(store.get_node(NodeId(404)).await.expect("get").is_none());
    assert!(store.get_edge(EdgeId(404)).await.expect("get").is_none());
    assert!(store.get_version(VersionId(404)).await.expect("get").is_none());
    assert!(
        store
            .get_node_by_key("proj", "nope:1:x", None)
            .await
            .expect("get")
            .is_none()
    );
    assert!(store.get_current_version("other").await.expect("get").is_none());
}

#[tokio::test]
async fn test_edges_never_outlive_their_endpoints() {
    let (store, ctx) = fresh().await;
    let a = store.add_node(&ctx, function("a.ts", 1, "a")).await.expect("a");
    let b = store.add_node(&ctx, function("a.ts", 5, "b")).await.expect("b");
    let c = store.add_node(&ctx, function("b.ts", 1, "c")).await.expect("c");

    let ab = store
        .add_edge(&ctx, EdgeDraft::new(a.id, b.id, EdgeType::Calls))
        .await
        .expect("a -> b");
    let cb = store
        .add_edge(&ctx, EdgeDraft::new(c.id, b.id, EdgeType::Uses))
        .await
        .expect("c -> b");
    let ac = store
        .add_edge(&ctx, EdgeDraft::new(a.id, c.id, EdgeType::Calls))
        .await
        .expect("a -> c");

    let deleted = store.delete_node(b.id).await.expect("delete").expect("b existed");
    let mut cascaded: Vec<EdgeId> = deleted.edges.iter().map(|e| e.id).collect();
    cascaded.sort();
    assert_eq!(cascaded, vec![ab.id, cb.id]);

    for id in [ab.id, cb.id] {
        assert!(store.get_edge(id).await.expect("get").is_none());
    }
    assert!(store.get_edge(ac.id).await.expect("get").is_some());

    let all = store
        .query_edges("proj", &EdgeFilter::new())
        .await
        .expect("query");
    for edge in &all.data {
        assert!(store.get_node(edge.source_node_id).await.expect("get").is_some());
        assert!(store.get_node(edge.target_node_id).await.expect("get").is_some());
    }

    // Dangling endpoints are rejected outright
    let err = store
        .add_edge(&ctx, EdgeDraft::new(a.id, b.id, EdgeType::Calls))
        .await
        .expect_err("b is gone");
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_duplicate_edges_conflict() {
    let (store, ctx) = fresh().await;
    let a = store.add_node(&ctx, function("a.ts", 1, "a")).await.expect("a");
    let b = store.add_node(&ctx, function("a.ts", 5, "b")).await.expect("b");
    store
        .add_edge(&ctx, EdgeDraft::new(a.id, b.id, EdgeType::Calls))
        .await
        .expect("first");
    let err = store
        .add_edge(&ctx, EdgeDraft::new(a.id, b.id, EdgeType::Calls))
        .await
        .expect_err("second");
    assert!(err.is_conflict());
    store
        .add_edge(&ctx, EdgeDraft::new(a.id, b.id, EdgeType::Uses))
        .await
        .expect("other type is fine");
}

#[tokio::test]
async fn test_updates_move_rows_to_the_writing_version() {
    let (store, ctx) = fresh().await;
    let node = store.add_node(&ctx, function("a.ts", 1, "a")).await.expect("add");

    let v2 = store.create_new_version("proj", None, None).await.expect("v2");
    let later = GraphContext::new("proj", v2);
    let patch = NodePatch {
        docstring: Some(Some("Adds things".into())),
        ..NodePatch::default()
    };
    let updated = store
        .update_node(&later, node.id, patch)
        .await
        .expect("update")
        .expect("exists");
    assert_eq!(updated.id, node.id);
    assert_eq!(updated.version_id, v2);
    assert_eq!(updated.docstring.as_deref(), Some("Adds things"));

    // A read pinned before the write no longer sees the row
    let pinned = store
        .get_node_by_key("proj", "a.ts:1:a", Some(ctx.version_id))
        .await
        .expect("pinned read");
    assert!(pinned.is_none());
    let current = store
        .get_node_by_key("proj", "a.ts:1:a", None)
        .await
        .expect("current read");
    assert!(current.is_some());

    assert!(
        store
            .update_node(&later, NodeId(999), NodePatch::default())
            .await
            .expect("missing")
            .is_none()
    );
}

#[tokio::test]
async fn test_query_nodes_filters_and_paginates() {
    let (store, ctx) = fresh().await;
    for (line, name) in ["parseConfig", "parseArgs", "render", "Reader"].iter().enumerate() {
        store
            .add_node(&ctx, function("a.ts", line * 10 + 1, name))
            .await
            .expect("add");
    }
    store
        .add_node(
            &ctx,
            NodeDraft::new("b.ts:1:Parser", NodeType::Class, Location::new("b.ts", 1, 9)).with_name("Parser"),
        )
        .await
        .expect("class");

    let fuzzy = store
        .query_nodes("proj", &NodeFilter::new().matching("PARSE"))
        .await
        .expect("fuzzy");
    assert_eq!(fuzzy.total_count, 3);

    let functions = store
        .query_nodes(
            "proj",
            &NodeFilter::new().of_type(NodeType::Function).paginate(2, 1),
        )
        .await
        .expect("page");
    assert_eq!(functions.total_count, 4);
    assert_eq!(functions.data.len(), 2);
    assert!(functions.has_more);
    assert_eq!(functions.data[0].display_name(), "parseArgs");

    let exact = store
        .query_nodes("proj", &NodeFilter::new().named("render"))
        .await
        .expect("exact");
    assert_eq!(exact.data.len(), 1);

    let in_b = nodes_in_file(store.as_ref(), "proj", "b.ts").await.expect("file");
    assert_eq!(in_b.len(), 1);
}

#[tokio::test]
async fn test_cycles_are_reported_once_with_bounded_length() {
    let (store, ctx) = fresh().await;
    let mut ids = Vec::new();
    for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
        ids.push(store.add_node(&ctx, function("a.ts", i * 10 + 1, name)).await.expect("add").id);
    }
    let link = |from: usize, to: usize| EdgeDraft::new(ids[from], ids[to], EdgeType::Calls);
    for draft in [link(0, 1), link(1, 0), link(1, 2), link(2, 3), link(3, 1)] {
        store.add_edge(&ctx, draft).await.expect("edge");
    }

    let cycles = store
        .find_circular_dependencies("proj", 10)
        .await
        .expect("cycles");
    assert_eq!(cycles, vec![vec![ids[0], ids[1]], vec![ids[1], ids[2], ids[3]]]);

    let short = store
        .find_circular_dependencies("proj", 2)
        .await
        .expect("cycles");
    assert_eq!(short, vec![vec![ids[0], ids[1]]]);
}

#[tokio::test]
async fn test_statistics_summarize_the_project() {
    let (store, ctx) = fresh().await;
    let a = store
        .add_node(&ctx, function("a.ts", 1, "a").with_complexity(3))
        .await
        .expect("a");
    let b = store
        .add_node(&ctx, function("b.ts", 1, "b").with_complexity(1))
        .await
        .expect("b");
    store
        .add_edge(&ctx, EdgeDraft::new(a.id, b.id, EdgeType::Calls))
        .await
        .expect("edge");

    let stats = store.get_graph_statistics("proj").await.expect("stats");
    assert_eq!(stats.total_nodes, 2);
    assert_eq!(stats.total_edges, 1);
    assert_eq!(stats.file_count, 2);
    assert_eq!(stats.nodes_by_type.get("FUNCTION"), Some(&2));
    assert_eq!(stats.edges_by_type.get("CALLS"), Some(&1));
    assert_eq!(stats.languages.get("typescript"), Some(&2));
    assert!((stats.average_complexity - 2.0).abs() < f64::EPSILON);
    assert_eq!(stats.version_count, 1);
    assert_eq!(stats.current_version, Some(1));
}
