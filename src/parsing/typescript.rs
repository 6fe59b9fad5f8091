//! TypeScript/TSX language analyzer using tree-sitter.

use super::{LanguageAnalyzer, SignificantNode, field_text, header_text, last_ident_of, text_of};
use crate::types::{NodeType, Visibility};
use tree_sitter::{Language, Node};

/// TypeScript/TSX source code analyzer.
#[derive(Debug, Clone, Copy)]
pub struct TypeScriptAnalyzer {
    tsx: bool,
}

impl TypeScriptAnalyzer {
    pub const TYPESCRIPT: Self = Self { tsx: false };
    pub const TSX: Self = Self { tsx: true };
}

impl LanguageAnalyzer for TypeScriptAnalyzer {
    fn language_id(&self) -> &'static str {
        if self.tsx { "tsx" } else { "typescript" }
    }

    fn grammar(&self) -> Language {
        if self.tsx {
            tree_sitter_typescript::LANGUAGE_TSX.into()
        } else {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
        }
    }

    fn extensions(&self) -> &[&str] {
        if self.tsx { &["tsx"] } else { &["ts", "mts", "cts"] }
    }

    fn classify(
        &self,
        node: Node,
        bytes: &[u8],
        enclosing: Option<NodeType>,
    ) -> Option<SignificantNode> {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                let mut item = declaration(node, bytes, NodeType::Function)?;
                fill_callable(&mut item, node, bytes);
                item.signature = header_text(bytes, node, "body");
                Some(item)
            }
            "method_definition" | "abstract_method_signature" => {
                let mut item = declaration(node, bytes, NodeType::Function)?;
                fill_callable(&mut item, node, bytes);
                item.signature = header_text(bytes, node, "body");
                item.is_static = Some(has_child(node, "static"));
                item.is_abstract = Some(node.kind() == "abstract_method_signature");
                item.visibility = Some(accessibility(bytes, node));
                Some(item)
            }
            "class_declaration" | "abstract_class_declaration" => {
                let mut item = declaration(node, bytes, NodeType::Class)?;
                item.signature = header_text(bytes, node, "body");
                item.is_abstract = Some(node.kind() == "abstract_class_declaration");
                Some(item)
            }
            "interface_declaration" => declaration(node, bytes, NodeType::Interface),
            "type_alias_declaration" => declaration(node, bytes, NodeType::Type),
            "enum_declaration" => declaration(node, bytes, NodeType::Enum),
            "variable_declarator" => variable(node, bytes, enclosing),
            "import_statement" => import_node(node, bytes),
            "export_statement" => export_clause_node(node, bytes),
            _ => None,
        }
    }

    fn is_branch(&self, node: Node, _bytes: &[u8]) -> bool {
        match node.kind() {
            "if_statement" | "for_statement" | "for_in_statement" | "while_statement"
            | "do_statement" | "switch_case" | "catch_clause" | "ternary_expression" => true,
            "binary_expression" => node
                .child_by_field_name("operator")
                .is_some_and(|op| matches!(op.kind(), "&&" | "||" | "??")),
            _ => false,
        }
    }

    fn call_name(&self, node: Node, bytes: &[u8]) -> Option<String> {
        if node.kind() != "call_expression" {
            return None;
        }
        let callee = node.child_by_field_name("function")?;
        extract_callee_name(bytes, callee)
    }

    fn reference_name(&self, node: Node, bytes: &[u8]) -> Option<String> {
        match node.kind() {
            "identifier" | "type_identifier" => text_of(bytes, node).map(str::to_string),
            _ => None,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn strip_quotes(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

fn has_child(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == kind)
}

fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|c| c.kind() == kind)
}

/// The statement a declaration hangs off: the export wrapper if there is one.
fn statement_of(node: Node) -> Node {
    match node.parent() {
        Some(parent) if parent.kind() == "export_statement" => parent,
        _ => node,
    }
}

fn is_exported(node: Node) -> bool {
    node.parent()
        .is_some_and(|p| p.kind() == "export_statement")
}

/// JSDoc block immediately preceding the statement.
fn extract_jsdoc(bytes: &[u8], statement: Node) -> Option<String> {
    let comment = statement.prev_sibling().filter(|s| s.kind() == "comment")?;
    let text = text_of(bytes, comment)?;
    let body = text.strip_prefix("/**")?.strip_suffix("*/")?;
    let lines: Vec<&str> = body
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty())
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn declaration(node: Node, bytes: &[u8], node_type: NodeType) -> Option<SignificantNode> {
    let name = field_text(bytes, node, "name")?;
    let mut item = SignificantNode::new(node_type, name, node, bytes);
    item.docstring = extract_jsdoc(bytes, statement_of(node));
    if is_exported(node) {
        item.visibility = Some(Visibility::Public);
    }
    Some(item)
}

fn fill_callable(item: &mut SignificantNode, node: Node, bytes: &[u8]) {
    let mut params = Vec::new();
    if let Some(params_node) = node.child_by_field_name("parameters") {
        let mut cursor = params_node.walk();
        for child in params_node.named_children(&mut cursor) {
            if matches!(child.kind(), "required_parameter" | "optional_parameter") {
                if let Some(text) = text_of(bytes, child) {
                    params.push(text.trim().to_string());
                }
            }
        }
    }
    item.parameters = Some(params);
    item.return_type = field_text(bytes, node, "return_type")
        .map(|t| t.trim_start_matches(':').trim().to_string());
    item.is_async = Some(has_child(node, "async"));
}

fn accessibility(bytes: &[u8], node: Node) -> Visibility {
    match child_of_kind(node, "accessibility_modifier").and_then(|m| text_of(bytes, m)) {
        Some("private") => Visibility::Private,
        Some("protected") => Visibility::Protected,
        _ => Visibility::Public,
    }
}

fn variable(node: Node, bytes: &[u8], enclosing: Option<NodeType>) -> Option<SignificantNode> {
    let name_node = node.child_by_field_name("name")?;
    // Destructuring patterns do not name a single node
    if name_node.kind() != "identifier" {
        return None;
    }
    let name = text_of(bytes, name_node)?.to_string();
    let declaration = node.parent()?;
    let statement = statement_of(declaration);
    let value = node.child_by_field_name("value");

    if let Some(function) = value.filter(|v| {
        matches!(
            v.kind(),
            "arrow_function" | "function_expression" | "function" | "generator_function"
        )
    }) {
        let mut item = SignificantNode::new(NodeType::Function, name.clone(), node, bytes);
        fill_callable(&mut item, function, bytes);
        item.signature = header_text(bytes, function, "body").map(|h| format!("{name} = {h}"));
        item.docstring = extract_jsdoc(bytes, statement);
        if is_exported(declaration) {
            item.visibility = Some(Visibility::Public);
        }
        return Some(item);
    }

    let top_level = enclosing.is_none()
        && statement
            .parent()
            .is_some_and(|p| p.kind() == "program");
    if !top_level {
        return None;
    }
    let mut item = SignificantNode::new(NodeType::Variable, name, node, bytes);
    item.return_type = field_text(bytes, node, "type")
        .map(|t| t.trim_start_matches(':').trim().to_string());
    item.docstring = extract_jsdoc(bytes, statement);
    item.is_static = Some(text_of(bytes, declaration).is_some_and(|t| t.starts_with("const")));
    if is_exported(declaration) {
        item.visibility = Some(Visibility::Public);
    }
    Some(item)
}

fn import_node(node: Node, bytes: &[u8]) -> Option<SignificantNode> {
    let source = field_text(bytes, node, "source").map(|s| strip_quotes(&s))?;
    let mut item = SignificantNode::new(NodeType::Import, source, node, bytes);

    if let Some(clause) = child_of_kind(node, "import_clause") {
        let mut cursor = clause.walk();
        for part in clause.named_children(&mut cursor) {
            match part.kind() {
                // import Default from '...'
                "identifier" => {
                    if let Some(name) = text_of(bytes, part) {
                        item.bindings.push(name.to_string());
                    }
                }
                // import * as ns from '...'
                "namespace_import" => {
                    if let Some(name) = child_of_kind(part, "identifier").and_then(|n| text_of(bytes, n)) {
                        item.bindings.push(name.to_string());
                    }
                }
                "named_imports" => item.bindings.extend(specifier_names(part, bytes, "import_specifier")),
                _ => {}
            }
        }
    }
    Some(item)
}

/// `export { a, b as c }` and `export { x } from '...'`
fn export_clause_node(node: Node, bytes: &[u8]) -> Option<SignificantNode> {
    if node.child_by_field_name("declaration").is_some() {
        return None;
    }
    let clause = child_of_kind(node, "export_clause")?;
    let exports = specifier_names(clause, bytes, "export_specifier");
    let name = field_text(bytes, node, "source")
        .map(|s| strip_quotes(&s))
        .unwrap_or_else(|| exports.join(", "));
    let mut item = SignificantNode::new(NodeType::Export, name, node, bytes);
    item.visibility = Some(Visibility::Public);
    item.exports = exports;
    Some(item)
}

/// Local (alias-aware) names of the specifiers in an import or export list.
fn specifier_names(list: Node, bytes: &[u8], kind: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = list.walk();
    for spec in list.named_children(&mut cursor) {
        if spec.kind() != kind {
            continue;
        }
        if let Some(name) = field_text(bytes, spec, "alias").or_else(|| field_text(bytes, spec, "name")) {
            names.push(name);
        }
    }
    names
}

fn string_literal_value(bytes: &[u8], node: Node) -> Option<String> {
    let text = text_of(bytes, node)?;
    let quote = text.chars().next()?;
    if matches!(quote, '"' | '\'' | '`') && text.len() >= 2 && text.ends_with(quote) {
        return Some(strip_quotes(text));
    }
    None
}

fn extract_callee_name(bytes: &[u8], node: Node) -> Option<String> {
    match node.kind() {
        "identifier" | "property_identifier" => text_of(bytes, node).map(str::to_string),
        "member_expression" => {
            if let Some(property) = node.child_by_field_name("property") {
                if let Some(name) = text_of(bytes, property) {
                    return Some(name.to_string());
                }
            }
            last_ident_of(bytes, node)
        }
        "subscript_expression" => {
            if let Some(index) = node.child_by_field_name("index") {
                if let Some(name) = string_literal_value(bytes, index) {
                    return Some(name);
                }
            }
            last_ident_of(bytes, node)
        }
        "optional_chain" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if let Some(name) = extract_callee_name(bytes, child) {
                    return Some(name);
                }
            }
            last_ident_of(bytes, node)
        }
        _ => last_ident_of(bytes, node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::{SourceParser, TreeSitterParser};

    fn analyze(source: &str, language: &str) -> Vec<SignificantNode> {
        let tree = TreeSitterParser.parse(source, language).unwrap();
        let analyzer = if language == "tsx" {
            TypeScriptAnalyzer::TSX
        } else {
            TypeScriptAnalyzer::TYPESCRIPT
        };
        analyzer.analyze(&tree, source)
    }

    fn find<'a>(nodes: &'a [SignificantNode], name: &str) -> &'a SignificantNode {
        nodes
            .iter()
            .find(|n| n.name == name)
            .unwrap_or_else(|| panic!("no node named {name}"))
    }

    #[test]
    fn test_extract_declarations() {
        let source = r#"
import React, { useState as useLocal } from 'react';
import * as path from "path";

/** Adds two numbers. */
export function add(a: number, b?: number): number {
    return a + (b ?? 0);
}

export abstract class Shape {
    abstract area(): number;

    static create(kind: string): Shape {
        return kind === 'circle' ? new Circle() : new Square();
    }

    private async load() {
        await fetch('/shapes');
    }
}

interface Point { x: number; y: number }
type Id = string;
enum Color { Red, Green }

const handler = async (event: Event): Promise<void> => {
    console.log(event);
};

export const LIMIT = 10;
let counter = 0;

export { add as sum, handler };
"#;
        let nodes = analyze(source, "typescript");

        let react = find(&nodes, "react");
        assert_eq!(react.node_type, NodeType::Import);
        assert_eq!(react.bindings, vec!["React".to_string(), "useLocal".to_string()]);
        assert_eq!(find(&nodes, "path").bindings, vec!["path".to_string()]);

        let add = find(&nodes, "add");
        assert_eq!(add.node_type, NodeType::Function);
        assert_eq!(add.docstring.as_deref(), Some("Adds two numbers."));
        assert_eq!(add.visibility, Some(Visibility::Public));
        assert_eq!(
            add.parameters,
            Some(vec!["a: number".to_string(), "b?: number".to_string()])
        );
        assert_eq!(add.return_type.as_deref(), Some("number"));
        // ??
        assert_eq!(add.complexity, 2);

        let shape = find(&nodes, "Shape");
        assert_eq!(shape.node_type, NodeType::Class);
        assert_eq!(shape.is_abstract, Some(true));

        assert_eq!(find(&nodes, "area").is_abstract, Some(true));
        let create = find(&nodes, "create");
        assert_eq!(create.is_static, Some(true));
        assert_eq!(create.complexity, 2);
        let load = find(&nodes, "load");
        assert_eq!(load.is_async, Some(true));
        assert_eq!(load.visibility, Some(Visibility::Private));
        assert_eq!(load.calls, vec!["fetch".to_string()]);

        assert_eq!(find(&nodes, "Point").node_type, NodeType::Interface);
        assert_eq!(find(&nodes, "Id").node_type, NodeType::Type);
        assert_eq!(find(&nodes, "Color").node_type, NodeType::Enum);

        let handler = find(&nodes, "handler");
        assert_eq!(handler.node_type, NodeType::Function);
        assert_eq!(handler.is_async, Some(true));
        assert_eq!(handler.calls, vec!["log".to_string()]);

        let limit = find(&nodes, "LIMIT");
        assert_eq!(limit.node_type, NodeType::Variable);
        assert_eq!(limit.visibility, Some(Visibility::Public));
        assert_eq!(find(&nodes, "counter").node_type, NodeType::Variable);

        let export = nodes
            .iter()
            .find(|n| n.node_type == NodeType::Export)
            .unwrap();
        assert_eq!(export.exports, vec!["sum".to_string(), "handler".to_string()]);
    }

    #[test]
    fn test_local_variables_are_not_significant() {
        let source = r#"
function outer() {
    const inner = 1;
    for (let i = 0; i < 3; i++) {
        if (i > inner) { helper(i); }
    }
}
"#;
        let nodes = analyze(source, "typescript");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].complexity, 3);
        assert_eq!(nodes[0].calls, vec!["helper".to_string()]);
    }

    #[test]
    fn test_tsx_component() {
        let source = r#"
export function Button({ label }: { label: string }) {
    return <button onClick={() => track(label)}>{label}</button>;
}
"#;
        let nodes = analyze(source, "tsx");
        let button = find(&nodes, "Button");
        assert_eq!(button.node_type, NodeType::Function);
        assert_eq!(button.calls, vec!["track".to_string()]);
    }
}
