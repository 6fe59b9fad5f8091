//! omni-cpg - build a code property graph for a workspace and query it
//!
//! # Usage
//!
//! ```bash
//! # Build and print graph statistics
//! omni-cpg --workspace /path/to/repo build
//!
//! # Fuzzy search over node names (and docstrings with --content)
//! omni-cpg search parseConfig --content
//!
//! # Callers, paths, impact, cycles, bottlenecks
//! omni-cpg calls handle_request --direction callers
//! omni-cpg path handle_request write_response
//! omni-cpg impact handle_request
//! omni-cpg cycles --max-depth 8
//! omni-cpg bottlenecks
//! ```
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use omni_cpg::{
    BuildContext, EngineConfig, GraphBuilder, GraphNode, GraphStore, NodeFilter, QueryEngine,
    SharedStore, create_memory_store,
};
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "omni-cpg")]
#[command(version)]
#[command(about = "Versioned code property graph: build a workspace and query it")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace directory to analyze
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// JSON engine configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Extra include globs
    #[arg(long, global = true)]
    include: Vec<String>,

    /// Extra exclude globs
    #[arg(long, global = true)]
    exclude: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the graph and print statistics
    Build,

    /// Fuzzy search over node names
    Search {
        query: String,

        /// Maximum results to return
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Also match docstrings and purposes
        #[arg(long)]
        content: bool,
    },

    /// Callers or callees of every function with this name
    Calls {
        name: String,

        #[arg(short, long, value_enum, default_value = "callers")]
        direction: CallDirection,
    },

    /// Fewest-edges path between the first nodes named `from` and `to`
    Path { from: String, to: String },

    /// Impact analysis for every node with this name
    Impact { name: String },

    /// Dependency cycles
    Cycles {
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Functions ranked by centrality
    Bottlenecks,
}

#[derive(Clone, Copy, ValueEnum)]
enum CallDirection {
    Callers,
    Callees,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs to stderr to keep stdout clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            let err = json!({ "error": format!("{e:#}") });
            eprintln!("{}", serde_json::to_string_pretty(&err)?);
            std::process::exit(1);
        }
    }
}

fn project_id(workspace: &std::path::Path) -> String {
    workspace
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workspace")
        .to_string()
}

async fn run(cli: &Cli) -> Result<serde_json::Value> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?.with_env_overrides(),
        None => EngineConfig::from_env(),
    };

    let workspace = cli.workspace.canonicalize().unwrap_or_else(|_| cli.workspace.clone());
    let project = project_id(&workspace);

    let mut build = BuildContext::new(project.clone(), workspace.clone());
    for pattern in &cli.include {
        build = build.with_include(pattern);
    }
    for pattern in &cli.exclude {
        build = build.with_exclude(pattern);
    }

    let store = create_memory_store();
    let builder = GraphBuilder::new(store.clone()).with_config(config.clone());
    let result = builder
        .build_graph_from_project(&build)
        .await
        .with_context(|| format!("Failed to build {}", workspace.display()))?;
    let engine = QueryEngine::new(store.clone()).with_config(config.clone());

    Ok(match &cli.command {
        Commands::Build => {
            let stats = engine.statistics(&project).await?;
            json!({ "build": result, "statistics": stats })
        }
        Commands::Search {
            query,
            limit,
            content,
        } => {
            let mut options = engine.search_options();
            if let Some(limit) = limit {
                options = options.with_limit(*limit);
            }
            if *content {
                options = options.with_content();
            }
            let hits = engine.search_nodes(&project, query, &options).await?;
            json!({ "query": query, "results": hits })
        }
        Commands::Calls { name, direction } => {
            let mut results = Vec::new();
            for node in named(&store, &project, name).await? {
                let related = match direction {
                    CallDirection::Callers => engine.find_callers(node.id).await?,
                    CallDirection::Callees => engine.find_callees(node.id).await?,
                };
                results.push(json!({ "node": node.node_key, "related": related }));
            }
            json!({ "name": name, "results": results })
        }
        Commands::Path { from, to } => {
            let source = first_named(&store, &project, from).await?;
            let target = first_named(&store, &project, to).await?;
            let path = engine
                .find_path(source.id, target.id, &engine.path_options())
                .await?;
            json!({ "from": from, "to": to, "path": path })
        }
        Commands::Impact { name } => {
            let mut results = Vec::new();
            for node in named(&store, &project, name).await? {
                if let Some(impact) = engine.analyze_impact(node.id).await? {
                    results.push(impact);
                }
            }
            json!({ "name": name, "results": results })
        }
        Commands::Cycles { max_depth } => {
            let depth = max_depth.unwrap_or(config.cycle_depth);
            let cycles = engine.find_circular_dependencies(&project, depth).await?;
            json!({ "maxDepth": depth, "cycles": cycles })
        }
        Commands::Bottlenecks => {
            let ranked = engine.find_bottlenecks(&project).await?;
            json!({ "bottlenecks": ranked })
        }
    })
}

async fn named(store: &SharedStore, project: &str, name: &str) -> Result<Vec<GraphNode>> {
    let nodes = store
        .query_nodes(project, &NodeFilter::new().named(name))
        .await?
        .data;
    if nodes.is_empty() {
        bail!("No node named '{}'", name);
    }
    Ok(nodes)
}

async fn first_named(store: &SharedStore, project: &str, name: &str) -> Result<GraphNode> {
    let mut nodes = named(store, project, name).await?;
    Ok(nodes.swap_remove(0))
}
