//! Benchmarks for graph construction, incremental updates and queries.
//!
//! ## Parsing
//! - Raw tree-sitter parse vs full node/relation extraction
//!
//! ## Building
//! - Whole-project build throughput (nodes/sec)
//!
//! ## Incremental Updates
//! - Diffing two extractions of the same file
//! - Applying a single-file modification
//!
//! ## Queries
//! - Callers, dependents, impact analysis, bottlenecks, fuzzy search

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use omni_cpg::builder::extract_file;
use omni_cpg::parsing::TreeSitterParser;
use omni_cpg::{
    BuildContext, DependencyOptions, FileChange, GraphBuilder, GraphStore, IncrementalUpdater,
    NodeFilter, QueryEngine, SharedStore, UpdateContext, create_memory_store, diff_extractions,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tree_sitter::Parser;

// ============================================================================
// Fixture Generation
// ============================================================================

/// Generate a Rust source file. Returns (code, estimated_nodes).
fn generate_rust_file(num_functions: usize, num_structs: usize, lines_per_fn: usize) -> (String, usize) {
    let mut code = String::with_capacity(num_functions * lines_per_fn * 50);
    code.push_str("use std::collections::HashMap;\n\n");

    for i in 0..num_structs {
        code.push_str(&format!(
            r#"/// Struct documentation for BenchStruct{i}
pub struct BenchStruct{i} {{
    pub items_{i}: HashMap<String, u64>,
}}

impl BenchStruct{i} {{
    pub fn len(&self) -> usize {{
        self.items_{i}.len()
    }}

    pub fn is_empty(&self) -> bool {{
        self.len() == 0
    }}
}}

"#
        ));
    }

    for i in 0..num_functions {
        code.push_str(&format!(
            "/// Function documentation for bench_function_{i}\npub fn bench_function_{i}(input: i32) -> i32 {{\n"
        ));
        for j in 0..lines_per_fn {
            if j == 0 {
                code.push_str("    let mut result = input;\n");
            } else if j == lines_per_fn - 1 {
                code.push_str("    result\n");
            } else if j % 7 == 0 {
                code.push_str(&format!("    if result > {j} {{ result -= 1; }}\n"));
            } else {
                code.push_str(&format!("    result = result.wrapping_add({});\n", j % 100));
            }
        }
        code.push_str("}\n\n");
    }

    // Hub function: many outgoing CALLS edges
    code.push_str("pub fn integration() -> i32 {\n    let mut sum = 0;\n");
    for i in 0..num_functions.min(10) {
        code.push_str(&format!("    sum += bench_function_{i}(sum);\n"));
    }
    code.push_str("    sum\n}\n");

    // import + structs + impls + two methods each + functions + hub
    let nodes = 1 + num_structs * 4 + num_functions + 1;
    (code, nodes)
}

fn create_test_repo(num_files: usize, functions_per_file: usize) -> (TempDir, usize) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let src = temp.path().join("src");
    fs::create_dir_all(&src).expect("Failed to create src");

    let mut total_nodes = 0;
    for i in 0..num_files {
        let (code, nodes) = generate_rust_file(functions_per_file, functions_per_file / 5, 10);
        total_nodes += nodes;
        fs::write(src.join(format!("module_{i}.rs")), code).expect("Failed to write module");
    }
    (temp, total_nodes)
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

async fn build(temp: &TempDir) -> SharedStore {
    let store = create_memory_store();
    GraphBuilder::new(store.clone())
        .build_graph_from_project(&BuildContext::new("bench", temp.path()))
        .await
        .expect("Failed to build graph");
    store
}

// ============================================================================
// Parsing Benchmarks
// ============================================================================

fn bench_single_file_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing/single_file");

    let file_configs = [(10, 5, 10, "small"), (50, 20, 15, "medium"), (200, 80, 25, "large")];

    for (funcs, structs, lines, label) in file_configs {
        let (code, _) = generate_rust_file(funcs, structs, lines);
        group.throughput(Throughput::Bytes(code.len() as u64));

        // Baseline: raw tree-sitter parsing only
        group.bench_with_input(BenchmarkId::new("tree_sitter_parse", label), &code, |b, code| {
            let mut parser = Parser::new();
            parser
                .set_language(&tree_sitter_rust::LANGUAGE.into())
                .expect("Failed to load grammar");
            b.iter(|| {
                let tree = parser.parse(code, None).expect("parse");
                black_box(tree.root_node().child_count())
            });
        });

        group.bench_with_input(BenchmarkId::new("extract", label), &code, |b, code| {
            b.iter(|| {
                let extraction = extract_file(&TreeSitterParser, "src/bench.rs", code).expect("extract");
                black_box((extraction.nodes.len(), extraction.relations.len()))
            });
        });
    }

    group.finish();
}

// ============================================================================
// Build Benchmarks
// ============================================================================

fn bench_full_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("building/full_repo");
    group.sample_size(10);
    let rt = runtime();

    for (files, functions, label) in [(5, 20, "tiny"), (20, 40, "small"), (50, 60, "medium")] {
        let (temp, total_nodes) = create_test_repo(files, functions);
        group.throughput(Throughput::Elements(total_nodes as u64));
        group.bench_with_input(BenchmarkId::new("build", label), &temp, |b, temp| {
            b.to_async(&rt).iter(|| async {
                let store = build(temp).await;
                black_box(store.get_graph_statistics("bench").await.expect("stats").total_nodes)
            });
        });
    }

    group.finish();
}

// ============================================================================
// Incremental Update Benchmarks
// ============================================================================

fn bench_incremental_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("updating/incremental");

    let (old, _) = generate_rust_file(50, 10, 10);
    // Same file with a function body edited and lines inserted at the top
    let new = format!("// header\n\n{}", old.replace("wrapping_add(3)", "wrapping_add(4)"));
    let old_extraction = extract_file(&TreeSitterParser, "src/bench.rs", &old).expect("extract");
    let new_extraction = extract_file(&TreeSitterParser, "src/bench.rs", &new).expect("extract");

    group.bench_function("diff_extractions", |b| {
        b.iter(|| {
            let diff = diff_extractions(&old_extraction, &new_extraction);
            black_box(diff.moved.len() + diff.modified.len())
        });
    });

    let rt = runtime();
    let (temp, _) = create_test_repo(10, 30);
    let path = "src/module_3.rs";
    let original = fs::read_to_string(temp.path().join(path)).expect("read fixture");
    let edited = original.replace("wrapping_add(2)", "wrapping_add(5)");
    let store = rt.block_on(build(&temp));
    let updater = IncrementalUpdater::new(Arc::new(GraphBuilder::new(store)));
    let context = UpdateContext::new(temp.path());

    // Alternates so every iteration applies a real change
    let mut flip = false;
    group.bench_function("modify_single_file", |b| {
        b.to_async(&rt).iter(|| {
            flip = !flip;
            let (from, to) = if flip {
                (original.clone(), edited.clone())
            } else {
                (edited.clone(), original.clone())
            };
            let updater = &updater;
            let context = &context;
            async move {
                let change = FileChange::modified(path, Some(from), Some(to));
                let result = updater
                    .update_from_file_changes("bench", &[change], context)
                    .await
                    .expect("update");
                black_box(result.nodes_updated)
            }
        });
    });

    group.finish();
}

// ============================================================================
// Query Benchmarks
// ============================================================================

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    group.sample_size(30);
    let rt = runtime();

    let (temp, _) = create_test_repo(20, 40);
    let store = rt.block_on(build(&temp));
    let engine = QueryEngine::new(store.clone());
    let target = rt
        .block_on(store.query_nodes("bench", &NodeFilter::new().named("bench_function_0")))
        .expect("query")
        .data
        .into_iter()
        .next()
        .expect("bench_function_0 exists");

    group.bench_function("find_callers", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(engine.find_callers(target.id).await.expect("callers").len()) });
    });

    group.bench_function("find_dependents", |b| {
        let options = DependencyOptions::default();
        b.to_async(&rt).iter(|| async {
            black_box(engine.find_dependents(target.id, &options).await.expect("dependents").len())
        });
    });

    group.bench_function("analyze_impact", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(engine.analyze_impact(target.id).await.expect("impact")) });
    });

    group.bench_function("find_bottlenecks", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(engine.find_bottlenecks("bench").await.expect("bottlenecks").len()) });
    });

    group.bench_function("search_nodes", |b| {
        let options = engine.search_options();
        b.to_async(&rt).iter(|| async {
            black_box(
                engine
                    .search_nodes("bench", "bench_functon", &options)
                    .await
                    .expect("search")
                    .len(),
            )
        });
    });

    group.finish();
}

criterion_group!(parsing, bench_single_file_parsing);
criterion_group!(building, bench_full_build);
criterion_group!(updating, bench_incremental_update);
criterion_group!(queries, bench_queries);
criterion_main!(parsing, building, updating, queries);
