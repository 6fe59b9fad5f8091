//! Rust language analyzer using tree-sitter.

use super::{LanguageAnalyzer, SignificantNode, field_text, header_text, last_ident_of, text_of};
use crate::types::{NodeType, Visibility};
use tree_sitter::{Language, Node};

/// Rust source code analyzer.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustAnalyzer;

impl LanguageAnalyzer for RustAnalyzer {
    fn language_id(&self) -> &'static str {
        "rust"
    }

    fn grammar(&self) -> Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn extensions(&self) -> &[&str] {
        &["rs"]
    }

    fn classify(
        &self,
        node: Node,
        bytes: &[u8],
        enclosing: Option<NodeType>,
    ) -> Option<SignificantNode> {
        match node.kind() {
            "function_item" | "function_signature_item" => {
                Some(function_node(node, bytes, enclosing))
            }
            "struct_item" => named_item(node, bytes, NodeType::Class),
            "impl_item" => {
                let name = impl_type_ident(bytes, node)?;
                let mut item = SignificantNode::new(NodeType::Class, name, node, bytes);
                item.signature = header_text(bytes, node, "body");
                item.docstring = extract_doc_comments(bytes, node);
                Some(item)
            }
            "enum_item" => named_item(node, bytes, NodeType::Enum),
            "trait_item" => named_item(node, bytes, NodeType::Interface),
            "type_item" => named_item(node, bytes, NodeType::Type),
            "mod_item" if node.child_by_field_name("body").is_some() => {
                named_item(node, bytes, NodeType::Module)
            }
            "const_item" => {
                let mut item = named_item(node, bytes, NodeType::Variable)?;
                item.is_static = Some(false);
                item.return_type = field_text(bytes, node, "type");
                Some(item)
            }
            "static_item" => {
                let mut item = named_item(node, bytes, NodeType::Variable)?;
                item.is_static = Some(true);
                item.return_type = field_text(bytes, node, "type");
                Some(item)
            }
            "use_declaration" => use_node(node, bytes),
            _ => None,
        }
    }

    fn is_branch(&self, node: Node, _bytes: &[u8]) -> bool {
        match node.kind() {
            "if_expression" | "while_expression" | "for_expression" | "loop_expression"
            | "match_arm" | "try_expression" => true,
            "binary_expression" => node
                .child_by_field_name("operator")
                .is_some_and(|op| matches!(op.kind(), "&&" | "||")),
            _ => false,
        }
    }

    fn call_name(&self, node: Node, bytes: &[u8]) -> Option<String> {
        if node.kind() != "call_expression" {
            return None;
        }
        let mut fun = node.child_by_field_name("function")?;
        // foo::<T>() names `foo`, not `T`
        while fun.kind() == "generic_function" {
            fun = fun.child_by_field_name("function")?;
        }
        last_ident_of(bytes, fun)
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

fn named_item(node: Node, bytes: &[u8], node_type: NodeType) -> Option<SignificantNode> {
    let name_node = node.child_by_field_name("name")?;
    let name = last_ident_of(bytes, name_node)?;
    let mut item = SignificantNode::new(node_type, name, node, bytes);
    item.visibility = Some(extract_visibility(bytes, node));
    item.docstring = extract_doc_comments(bytes, node);
    Some(item)
}

fn function_node(node: Node, bytes: &[u8], enclosing: Option<NodeType>) -> SignificantNode {
    let name = node
        .child_by_field_name("name")
        .and_then(|n| last_ident_of(bytes, n))
        .unwrap_or_else(|| "<anonymous>".to_string());
    let mut item = SignificantNode::new(NodeType::Function, name, node, bytes);
    item.visibility = Some(extract_visibility(bytes, node));
    item.docstring = extract_doc_comments(bytes, node);
    item.signature = header_text(bytes, node, "body");
    item.return_type = field_text(bytes, node, "return_type");

    let mut params = Vec::new();
    let mut has_receiver = false;
    if let Some(params_node) = node.child_by_field_name("parameters") {
        let mut cursor = params_node.walk();
        for child in params_node.children(&mut cursor) {
            match child.kind() {
                "parameter" => {
                    if let Some(text) = text_of(bytes, child) {
                        params.push(text.trim().to_string());
                    }
                }
                "self_parameter" => {
                    has_receiver = true;
                    if let Some(text) = text_of(bytes, child) {
                        params.push(text.trim().to_string());
                    }
                }
                _ => {}
            }
        }
    }
    item.parameters = Some(params);

    let mut cursor = node.walk();
    let is_async = node.children(&mut cursor).any(|child| {
        child.kind() == "async"
            || (child.kind() == "function_modifiers"
                && text_of(bytes, child).is_some_and(|t| t.split_whitespace().any(|w| w == "async")))
    });
    item.is_async = Some(is_async);

    // Associated functions without a receiver are the closest Rust has to statics
    if matches!(enclosing, Some(NodeType::Class) | Some(NodeType::Interface)) {
        item.is_static = Some(!has_receiver);
    }
    item.is_abstract = Some(node.kind() == "function_signature_item");
    item
}

fn use_node(node: Node, bytes: &[u8]) -> Option<SignificantNode> {
    let argument = node.child_by_field_name("argument")?;
    let path = text_of(bytes, argument)?
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let visibility = extract_visibility(bytes, node);
    let node_type = if visibility == Visibility::Public {
        NodeType::Export
    } else {
        NodeType::Import
    };

    let mut item = SignificantNode::new(node_type, path, node, bytes);
    item.visibility = Some(visibility);
    let mut bindings = Vec::new();
    collect_use_bindings(argument, bytes, &mut bindings);
    if node_type == NodeType::Export {
        item.exports = bindings.clone();
    }
    item.bindings = bindings;
    Some(item)
}

/// Local names a use tree brings into scope. Globs bind nothing by name.
fn collect_use_bindings(node: Node, bytes: &[u8], bindings: &mut Vec<String>) {
    match node.kind() {
        "identifier" | "scoped_identifier" | "crate" | "super" | "self" => {
            if let Some(name) = last_ident_of(bytes, node) {
                bindings.push(name);
            }
        }
        "use_as_clause" => {
            if let Some(alias) = node
                .child_by_field_name("alias")
                .and_then(|a| text_of(bytes, a))
            {
                bindings.push(alias.to_string());
            }
        }
        "scoped_use_list" => {
            if let Some(list) = node.child_by_field_name("list") {
                collect_use_bindings(list, bytes, bindings);
            }
        }
        "use_list" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_use_bindings(child, bytes, bindings);
            }
        }
        _ => {}
    }
}

/// Extract the type identifier for an impl item.
fn impl_type_ident(bytes: &[u8], impl_node: Node) -> Option<String> {
    let ty = impl_node.child_by_field_name("type")?;
    let text = text_of(bytes, ty)?;
    // First identifier of the type, e.g. "Foo" from "Foo<T>"
    text.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extract doc comments from preceding siblings.
fn extract_doc_comments(bytes: &[u8], node: Node) -> Option<String> {
    let mut doc_lines = Vec::new();
    let mut cur = node.prev_sibling();

    while let Some(sib) = cur {
        match sib.kind() {
            "line_comment" => {
                let Some(text) = text_of(bytes, sib) else {
                    break;
                };
                let Some(doc) = text.strip_prefix("///") else {
                    break;
                };
                doc_lines.push(doc.trim().to_string());
                cur = sib.prev_sibling();
            }
            // Skip attributes, keep looking
            "attribute_item" => cur = sib.prev_sibling(),
            _ => break,
        }
    }

    doc_lines.reverse();
    (!doc_lines.is_empty()).then(|| doc_lines.join("\n"))
}

/// Extract visibility from node children.
fn extract_visibility(bytes: &[u8], node: Node) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "visibility_modifier" {
            continue;
        }
        let vis: String = text_of(bytes, child)
            .unwrap_or_default()
            .split_whitespace()
            .collect();
        return match vis.as_str() {
            "pub" => Visibility::Public,
            "pub(crate)" => Visibility::Crate,
            _ => Visibility::Restricted,
        };
    }
    Visibility::Private
}
