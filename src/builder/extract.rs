//! Two-pass extraction of one file into node drafts and key-level relations.
//!
//! Pass 1 collects significant nodes, import bindings and call sites. Pass 2
//! resolves USES, CALLS and CONTAINS relations between nodes of the same file
//! by node key, so the result can be persisted or diffed without touching the
//! store.

use crate::parsing::{SignificantNode, SourceParser, analyze_tree, analyzer_for_language, detect_language};
use crate::types::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

/// A node draft plus the source text it was cut from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedNode {
    pub draft: NodeDraft,
    pub source: String,
}

/// A relationship between two node keys of one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Relation {
    pub source_key: String,
    pub target_key: String,
    pub edge_type: EdgeType,
}

/// Everything extracted from one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileExtraction {
    pub file_path: String,
    pub language: String,
    /// In source order
    pub nodes: Vec<ExtractedNode>,
    pub relations: Vec<Relation>,
}

impl FileExtraction {
    pub fn node(&self, key: &str) -> Option<&ExtractedNode> {
        self.nodes.iter().find(|n| n.draft.node_key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.draft.node_key.as_str())
    }
}

/// Content hash of a node's source text: xxh3-64 as 16 hex digits.
pub fn content_hash(text: &str) -> String {
    format!("{:016x}", xxh3_64(text.as_bytes()))
}

/// Extract a file given its project-relative path.
///
/// Returns `None` when the language is unsupported or the content does not
/// parse.
pub fn extract_file(
    parser: &dyn SourceParser,
    relative_path: &str,
    content: &str,
) -> Option<FileExtraction> {
    let language = detect_language(Path::new(relative_path))?;
    let analyzer = analyzer_for_language(language)?;
    let tree = parser.parse(content, language)?;
    let significant = analyze_tree(analyzer, &tree, content);
    Some(resolve(relative_path, language, significant))
}

fn resolve(relative_path: &str, language: &str, significant: Vec<SignificantNode>) -> FileExtraction {
    // Pass 1 output, keyed
    let mut keyed: Vec<(String, SignificantNode)> = Vec::with_capacity(significant.len());
    let mut seen = HashSet::new();
    for node in significant {
        let key = node_key(relative_path, node.start_line, &node.name);
        if seen.insert(key.clone()) {
            keyed.push((key, node));
        } else {
            tracing::debug!("Duplicate node key {} in {}", key, relative_path);
        }
    }

    let mut bindings: HashMap<&str, &str> = HashMap::new();
    let mut functions: HashMap<&str, Vec<&str>> = HashMap::new();
    for (key, node) in &keyed {
        for binding in &node.bindings {
            bindings.entry(binding.as_str()).or_insert(key.as_str());
        }
        if node.node_type == NodeType::Function {
            functions.entry(node.name.as_str()).or_default().push(key.as_str());
        }
    }

    // Pass 2
    let mut relations: BTreeSet<Relation> = BTreeSet::new();
    let mut dependencies: HashMap<&str, Vec<String>> = HashMap::new();
    for (key, node) in &keyed {
        if node.node_type.is_binding() {
            continue;
        }

        let mut used: BTreeSet<&str> = BTreeSet::new();
        for reference in &node.references {
            if *reference == node.name {
                continue;
            }
            if let Some(import_key) = bindings.get(reference.as_str()) {
                used.insert(reference.as_str());
                relations.insert(Relation {
                    source_key: key.clone(),
                    target_key: import_key.to_string(),
                    edge_type: EdgeType::Uses,
                });
            }
        }
        if !used.is_empty() {
            dependencies.insert(key.as_str(), used.into_iter().map(str::to_string).collect());
        }

        for call in &node.calls {
            for target in functions.get(call.as_str()).into_iter().flatten() {
                relations.insert(Relation {
                    source_key: key.clone(),
                    target_key: target.to_string(),
                    edge_type: EdgeType::Calls,
                });
            }
        }

        if node.node_type == NodeType::Class {
            for (inner_key, inner) in &keyed {
                if inner.node_type == NodeType::Function && node.encloses(inner) {
                    relations.insert(Relation {
                        source_key: key.clone(),
                        target_key: inner_key.clone(),
                        edge_type: EdgeType::Contains,
                    });
                }
            }
        }
    }

    let nodes = keyed
        .iter()
        .map(|(key, node)| ExtractedNode {
            draft: to_draft(key, relative_path, language, node, dependencies.get(key.as_str())),
            source: node.text.clone(),
        })
        .collect();

    FileExtraction {
        file_path: relative_path.to_string(),
        language: language.to_string(),
        nodes,
        relations: relations.into_iter().collect(),
    }
}

fn to_draft(
    key: &str,
    relative_path: &str,
    language: &str,
    node: &SignificantNode,
    dependencies: Option<&Vec<String>>,
) -> NodeDraft {
    let location = Location::new(relative_path, node.start_line, node.end_line)
        .with_columns(node.start_col, node.end_col);
    NodeDraft {
        node_key: key.to_string(),
        node_type: node.node_type,
        location,
        name: Some(node.name.clone()),
        signature: node.signature.clone(),
        language: language.to_string(),
        visibility: node.visibility,
        is_async: node.is_async,
        is_static: node.is_static,
        is_abstract: node.is_abstract,
        complexity: node.complexity,
        parameters: node.parameters.clone(),
        return_type: node.return_type.clone(),
        docstring: node.docstring.clone(),
        purpose: None,
        hash: content_hash(&node.text),
        dependencies: dependencies.cloned(),
        exports: (!node.exports.is_empty()).then(|| node.exports.clone()),
    }
}
