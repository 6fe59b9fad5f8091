//! Parsing module for extracting significant nodes from source code.
//!
//! Uses tree-sitter for incremental, error-tolerant parsing. Each supported
//! language contributes a [`LanguageAnalyzer`] that decides which syntax nodes
//! are significant and how to read their attributes; the walk itself is
//! shared.

pub mod rust;
pub mod typescript;

use crate::types::{NodeType, Visibility};
use std::path::Path;
use tree_sitter::{Language, Node, Parser, Tree};

/// Produces parse trees for the builder.
///
/// `None` means the language is unsupported or the parse failed; callers treat
/// that as a file with no significant nodes.
pub trait SourceParser: Send + Sync {
    fn parse(&self, content: &str, language: &str) -> Option<Tree>;
}

/// Default parser backed by the bundled tree-sitter grammars.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterParser;

impl SourceParser for TreeSitterParser {
    fn parse(&self, content: &str, language: &str) -> Option<Tree> {
        let analyzer = analyzer_for_language(language)?;
        // Parser instance is created per-use so the parser stays Sync
        let mut parser = Parser::new();
        parser.set_language(&analyzer.grammar()).ok()?;
        parser.parse(content, None)
    }
}

/// A syntax node worth representing in the graph, with everything the walk
/// attributed to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SignificantNode {
    pub node_type: NodeType,
    pub name: String,
    /// 1-based
    pub start_line: usize,
    pub end_line: usize,
    pub start_col: usize,
    pub end_col: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    /// Source text of the node, the input of its content hash
    pub text: String,
    pub signature: Option<String>,
    pub visibility: Option<Visibility>,
    pub is_async: Option<bool>,
    pub is_static: Option<bool>,
    pub is_abstract: Option<bool>,
    pub parameters: Option<Vec<String>>,
    pub return_type: Option<String>,
    pub docstring: Option<String>,
    pub complexity: u32,
    /// Local names introduced by an import
    pub bindings: Vec<String>,
    pub exports: Vec<String>,
    /// Call-site identifiers whose innermost significant node is this one
    pub calls: Vec<String>,
    /// Identifiers referenced from within this node
    pub references: Vec<String>,
}

impl SignificantNode {
    pub fn new(node_type: NodeType, name: impl Into<String>, node: Node, bytes: &[u8]) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            node_type,
            name: name.into(),
            start_line: start.row + 1,
            end_line: end.row + 1,
            start_col: start.column + 1,
            end_col: end.column + 1,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            text: text_of(bytes, node).unwrap_or_default().to_string(),
            signature: None,
            visibility: None,
            is_async: None,
            is_static: None,
            is_abstract: None,
            parameters: None,
            return_type: None,
            docstring: None,
            complexity: 1,
            bindings: Vec::new(),
            exports: Vec::new(),
            calls: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Whether `other` lies within this node's byte range.
    pub fn encloses(&self, other: &SignificantNode) -> bool {
        self.start_byte <= other.start_byte
            && other.end_byte <= self.end_byte
            && (self.start_byte, self.end_byte) != (other.start_byte, other.end_byte)
    }
}

/// Per-language extraction rules.
pub trait LanguageAnalyzer: Send + Sync {
    /// Language id used by the lookup table.
    fn language_id(&self) -> &'static str;

    /// Get the tree-sitter language.
    fn grammar(&self) -> Language;

    /// File extensions this analyzer handles.
    fn extensions(&self) -> &[&str];

    /// Build a significant node for `node`, or `None` if it is not one.
    /// `enclosing` is the type of the innermost significant ancestor.
    fn classify(
        &self,
        node: Node,
        bytes: &[u8],
        enclosing: Option<NodeType>,
    ) -> Option<SignificantNode>;

    /// Whether `node` adds a decision point.
    fn is_branch(&self, node: Node, bytes: &[u8]) -> bool;

    /// Name of the function invoked, if `node` is a call site.
    fn call_name(&self, node: Node, bytes: &[u8]) -> Option<String>;

    /// Identifier referenced by `node`, if it is a reference.
    fn reference_name(&self, node: Node, bytes: &[u8]) -> Option<String>;

    /// Extract significant nodes in source order.
    fn analyze(&self, tree: &Tree, source: &str) -> Vec<SignificantNode>
    where
        Self: Sized,
    {
        analyze_tree(self, tree, source)
    }
}

/// Walk `tree` once, collecting significant nodes.
///
/// Decision points count toward every enclosing significant node; call sites
/// and references go to the innermost one only.
pub fn analyze_tree(
    analyzer: &dyn LanguageAnalyzer,
    tree: &Tree,
    source: &str,
) -> Vec<SignificantNode> {
    let bytes = source.as_bytes();
    let mut nodes = Vec::new();
    // (depth, index into `nodes`) of every enclosing significant node
    let mut stack: Vec<(usize, usize)> = Vec::new();
    let mut cursor = tree.walk();
    let mut depth = 0;

    // Pre-order walk on the cursor; nesting depth is bounded by the heap only
    loop {
        while stack.last().is_some_and(|&(d, _)| d >= depth) {
            stack.pop();
        }
        visit(analyzer, cursor.node(), bytes, depth, &mut stack, &mut nodes);

        if cursor.goto_first_child() {
            depth += 1;
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return nodes;
            }
            depth -= 1;
        }
    }
}

fn visit(
    analyzer: &dyn LanguageAnalyzer,
    node: Node,
    bytes: &[u8],
    depth: usize,
    stack: &mut Vec<(usize, usize)>,
    out: &mut Vec<SignificantNode>,
) {
    let enclosing = stack.last().map(|&(_, i)| out[i].node_type);
    if let Some(significant) = analyzer.classify(node, bytes, enclosing) {
        out.push(significant);
        stack.push((depth, out.len() - 1));
    }

    if analyzer.is_branch(node, bytes) {
        for &(_, i) in stack.iter() {
            out[i].complexity += 1;
        }
    }

    if let Some(&(_, inner)) = stack.last() {
        if !out[inner].node_type.is_binding() {
            if let Some(callee) = analyzer.call_name(node, bytes) {
                push_unique(&mut out[inner].calls, callee);
            }
            if let Some(ident) = analyzer.reference_name(node, bytes) {
                push_unique(&mut out[inner].references, ident);
            }
        }
    }
}

// ============================================================================
// Language Lookup
// ============================================================================

static ANALYZERS: &[&dyn LanguageAnalyzer] = &[
    &rust::RustAnalyzer,
    &typescript::TypeScriptAnalyzer::TYPESCRIPT,
    &typescript::TypeScriptAnalyzer::TSX,
];

/// Get the analyzer registered for a language id.
pub fn analyzer_for_language(language: &str) -> Option<&'static dyn LanguageAnalyzer> {
    ANALYZERS
        .iter()
        .copied()
        .find(|a| a.language_id() == language)
}

/// Language id of a file based on its extension.
pub fn detect_language(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    ANALYZERS
        .iter()
        .find(|a| a.extensions().contains(&ext.as_str()))
        .map(|a| a.language_id())
}

// ============================================================================
// Helper Functions
// ============================================================================

pub(crate) fn text_of<'a>(bytes: &'a [u8], node: Node) -> Option<&'a str> {
    std::str::from_utf8(bytes.get(node.start_byte()..node.end_byte())?).ok()
}

/// Extract the last identifier from a node's text.
pub(crate) fn last_ident_of(bytes: &[u8], node: Node) -> Option<String> {
    let text = text_of(bytes, node)?;
    text.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .rfind(|part| !part.is_empty())
        .map(str::to_string)
}

/// Text of a named field, trimmed.
pub(crate) fn field_text(bytes: &[u8], node: Node, field: &str) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|n| text_of(bytes, n))
        .map(|s| s.trim().to_string())
}

/// Declaration text up to the start of its body, with whitespace collapsed.
pub(crate) fn header_text(bytes: &[u8], node: Node, body_field: &str) -> Option<String> {
    let end = node
        .child_by_field_name(body_field)
        .map(|b| b.start_byte())
        .unwrap_or(node.end_byte());
    let raw = std::str::from_utf8(bytes.get(node.start_byte()..end)?).ok()?;
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches(|c| c == ';' || c == '{').trim_end();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub(crate) fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}
