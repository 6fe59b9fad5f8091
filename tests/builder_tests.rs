//! Whole-project builds over temporary workspaces.

use async_trait::async_trait;
use omni_cpg::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const LIB_RS: &str = r#"use std::collections::HashMap;

pub struct Cache {
    items: HashMap<String, u32>,
}

impl Cache {
    pub fn get(&self, key: &str) -> Option<u32> {
        self.lookup(key)
    }

    fn lookup(&self, key: &str) -> Option<u32> {
        if key.is_empty() {
            None
        } else {
            self.items.get(key).copied()
        }
    }
}
"#;

const SERVICE_TS: &str = r#"import { readFile } from "fs";

/** Loads and parses documents. */
export class Service {
    load(path: string): string {
        return this.parse(readFile(path));
    }

    parse(raw: string): string {
        return raw.trim();
    }
}
"#;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write file");
}

fn workspace() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "src/lib.rs", LIB_RS);
    write(temp.path(), "web/service.ts", SERVICE_TS);
    write(temp.path(), "README.md", "# not code\n");
    write(temp.path(), "node_modules/dep/index.ts", "function vendored() {}\n");
    temp
}

async fn node(store: &SharedStore, key: &str) -> GraphNode {
    store
        .get_node_by_key("demo", key, None)
        .await
        .expect("lookup")
        .unwrap_or_else(|| panic!("missing node {key}"))
}

async fn has_edge(store: &SharedStore, from: &GraphNode, to: &GraphNode, edge_type: EdgeType) -> bool {
    store
        .query_edges(
            "demo",
            &EdgeFilter::new().from_node(from.id).to_node(to.id).of_types(&[edge_type]),
        )
        .await
        .expect("edges")
        .total_count
        == 1
}

#[tokio::test]
async fn test_builds_every_supported_file() {
    let temp = workspace();
    let store = create_memory_store();
    let builder = GraphBuilder::new(store.clone());

    let result = builder
        .build_graph_from_project(&BuildContext::new("demo", temp.path()))
        .await
        .expect("build");
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.files_processed, 2);
    assert_eq!(result.version_id, store.get_current_version("demo").await.unwrap().map(|v| v.id));

    let vendored = store
        .query_nodes("demo", &NodeFilter::new().named("vendored"))
        .await
        .expect("query");
    assert_eq!(vendored.total_count, 0);

    // Rust
    let import = node(&store, "src/lib.rs:1:std::collections::HashMap").await;
    assert_eq!(import.node_type, NodeType::Import);
    let strukt = node(&store, "src/lib.rs:3:Cache").await;
    let imp = node(&store, "src/lib.rs:7:Cache").await;
    let get = node(&store, "src/lib.rs:8:get").await;
    let lookup = node(&store, "src/lib.rs:12:lookup").await;
    assert_eq!(lookup.complexity, 2);
    assert_eq!(lookup.language, "rust");
    assert!(has_edge(&store, &get, &lookup, EdgeType::Calls).await);
    assert!(has_edge(&store, &imp, &get, EdgeType::Contains).await);
    assert!(has_edge(&store, &imp, &lookup, EdgeType::Contains).await);
    assert!(!has_edge(&store, &strukt, &get, EdgeType::Contains).await);
    assert!(has_edge(&store, &strukt, &import, EdgeType::Uses).await);

    // TypeScript
    let fs_import = node(&store, "web/service.ts:1:fs").await;
    let service = node(&store, "web/service.ts:4:Service").await;
    let load = node(&store, "web/service.ts:5:load").await;
    let parse = node(&store, "web/service.ts:9:parse").await;
    assert_eq!(service.docstring.as_deref(), Some("Loads and parses documents."));
    assert!(has_edge(&store, &load, &parse, EdgeType::Calls).await);
    assert!(has_edge(&store, &load, &fs_import, EdgeType::Uses).await);
    assert!(has_edge(&store, &service, &load, EdgeType::Contains).await);
    assert_eq!(load.dependencies, Some(vec!["readFile".to_string()]));
}

#[tokio::test]
async fn test_exclude_patterns_skip_files() {
    let temp = workspace();
    let store = create_memory_store();
    let builder = GraphBuilder::new(store.clone());
    let result = builder
        .build_graph_from_project(&BuildContext::new("demo", temp.path()).with_exclude("web/**"))
        .await
        .expect("build");
    assert_eq!(result.files_processed, 1);

    let stats = store.get_graph_statistics("demo").await.expect("stats");
    assert_eq!(stats.languages.keys().collect::<Vec<_>>(), vec!["rust"]);
}

#[tokio::test]
async fn test_rebuilding_updates_rows_in_place() {
    let temp = workspace();
    let store = create_memory_store();
    let builder = GraphBuilder::new(store.clone());
    let context = BuildContext::new("demo", temp.path());

    builder.build_graph_from_project(&context).await.expect("first build");
    let before = node(&store, "src/lib.rs:8:get").await;

    let second = builder.build_graph_from_project(&context).await.expect("second build");
    assert!(second.success);
    assert_eq!(second.nodes_added, 0);
    assert!(second.nodes_updated > 0);
    assert_eq!(second.edges_added, 0);

    let after = node(&store, "src/lib.rs:8:get").await;
    assert_eq!(after.id, before.id);
    assert_eq!(Some(after.version_id), second.version_id);
}

#[tokio::test]
async fn test_unsupported_content_yields_no_nodes() {
    let store = create_memory_store();
    let builder = GraphBuilder::new(store.clone());
    let version = store.create_new_version("demo", None, None).await.expect("version");
    let ctx = GraphContext::new("demo", version);

    let persisted = builder
        .process_file(&ctx, "notes/readme.py", "def f():\n    pass\n")
        .await
        .expect("process");
    assert!(persisted.nodes.is_empty());
    assert_eq!(persisted.stats, FileBuildStats::default());
}

struct FixedSummarizer;

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn purpose(&self, node: &NodeDescriptor) -> anyhow::Result<String> {
        if node.name == "lookup" {
            anyhow::bail!("rate limited");
        }
        Ok(format!("Handles {}", node.name))
    }
}

#[tokio::test]
async fn test_purposes_are_annotated_in_the_background() {
    let temp = workspace();
    let store = create_memory_store();
    let config = EngineConfig::default().with_purpose_batching(2, 0);
    let builder = GraphBuilder::new(store.clone())
        .with_config(config)
        .with_summarizer(Arc::new(FixedSummarizer));

    let result = builder
        .build_graph_from_project(&BuildContext::new("demo", temp.path()))
        .await
        .expect("build");
    assert!(result.success);

    let reports = builder.wait_for_annotations().await;
    let annotated: usize = reports.iter().map(|r| r.annotated).sum();
    let failed: usize = reports.iter().map(|r| r.failed).sum();
    assert_eq!((annotated, failed), (3, 1));

    let get = node(&store, "src/lib.rs:8:get").await;
    assert_eq!(get.purpose.as_deref(), Some("Handles get"));
    let lookup = node(&store, "src/lib.rs:12:lookup").await;
    assert!(lookup.purpose.is_none());
}
