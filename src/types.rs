//! Core types for the Code Property Graph.
//!
//! This module defines the data model shared by every layer:
//! - Versions (the per-project checkpoint chain)
//! - Graph nodes and edges
//! - The update-operation audit log
//! - Filters, pages and batch results exchanged with callers
//!
//! Every public shape is serde-serializable with camelCase fields so it can
//! cross a JSON boundary unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a graph node.
    NodeId
);
id_type!(
    /// Unique identifier for a graph edge.
    EdgeId
);
id_type!(
    /// Unique identifier for a version checkpoint.
    VersionId
);
id_type!(
    /// Unique identifier for an audit-log entry.
    OperationId
);

/// Explicit write target threaded through every mutation.
///
/// A version is write-eligible only while it is the project's current
/// version; stores reject writes against superseded versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphContext {
    pub project_id: String,
    pub version_id: VersionId,
}

impl GraphContext {
    pub fn new(project_id: impl Into<String>, version_id: VersionId) -> Self {
        Self {
            project_id: project_id.into(),
            version_id,
        }
    }
}

// ============================================================================
// Versions
// ============================================================================

/// A checkpoint in a project's graph history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: VersionId,
    pub project_id: String,
    pub version_number: u64,
    pub parent_version_id: Option<VersionId>,
    pub checksum: Option<String>,
    pub operations_count: u64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Nodes
// ============================================================================

/// Kind of structural element a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Function,
    Class,
    Variable,
    Module,
    Interface,
    Type,
    Import,
    Export,
    Enum,
}

impl NodeType {
    pub const ALL: [NodeType; 9] = [
        Self::Function,
        Self::Class,
        Self::Variable,
        Self::Module,
        Self::Interface,
        Self::Type,
        Self::Import,
        Self::Export,
        Self::Enum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "FUNCTION",
            Self::Class => "CLASS",
            Self::Variable => "VARIABLE",
            Self::Module => "MODULE",
            Self::Interface => "INTERFACE",
            Self::Type => "TYPE",
            Self::Import => "IMPORT",
            Self::Export => "EXPORT",
            Self::Enum => "ENUM",
        }
    }

    /// Import-like nodes carry bindings rather than behavior.
    pub fn is_binding(&self) -> bool {
        matches!(self, Self::Import | Self::Export)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility of a node as declared in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    /// pub(crate)
    Crate,
    /// pub(super), pub(in path)
    Restricted,
    Protected,
    Private,
}

/// Source range of a node. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_col: usize,
    pub end_col: usize,
}

impl Location {
    pub fn new(file_path: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Self {
            file_path: file_path.into(),
            start_line,
            end_line,
            start_col: 1,
            end_col: 1,
        }
    }

    pub fn with_columns(mut self, start_col: usize, end_col: usize) -> Self {
        self.start_col = start_col;
        self.end_col = end_col;
        self
    }
}

/// Deterministic node identity: relative path, start line and name.
pub fn node_key(relative_path: &str, start_line: usize, name: &str) -> String {
    format!("{relative_path}:{start_line}:{name}")
}

/// A structural code element stored in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: NodeId,
    pub project_id: String,
    pub version_id: VersionId,
    pub node_key: String,
    pub node_type: NodeType,
    pub location: Location,
    pub name: Option<String>,
    pub signature: Option<String>,
    pub language: String,
    pub visibility: Option<Visibility>,
    pub is_async: Option<bool>,
    pub is_static: Option<bool>,
    pub is_abstract: Option<bool>,
    pub complexity: u32,
    pub parameters: Option<Vec<String>>,
    pub return_type: Option<String>,
    pub docstring: Option<String>,
    pub purpose: Option<String>,
    pub hash: String,
    pub dependencies: Option<Vec<String>>,
    pub exports: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphNode {
    pub fn from_draft(
        id: NodeId,
        ctx: &GraphContext,
        draft: NodeDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            project_id: ctx.project_id.clone(),
            version_id: ctx.version_id,
            node_key: draft.node_key,
            node_type: draft.node_type,
            location: draft.location,
            name: draft.name,
            signature: draft.signature,
            language: draft.language,
            visibility: draft.visibility,
            is_async: draft.is_async,
            is_static: draft.is_static,
            is_abstract: draft.is_abstract,
            complexity: draft.complexity,
            parameters: draft.parameters,
            return_type: draft.return_type,
            docstring: draft.docstring,
            purpose: draft.purpose,
            hash: draft.hash,
            dependencies: draft.dependencies,
            exports: draft.exports,
            created_at: now,
            updated_at: now,
        }
    }

    /// The writable attributes of this node, e.g. to re-create it.
    pub fn to_draft(&self) -> NodeDraft {
        NodeDraft {
            node_key: self.node_key.clone(),
            node_type: self.node_type,
            location: self.location.clone(),
            name: self.name.clone(),
            signature: self.signature.clone(),
            language: self.language.clone(),
            visibility: self.visibility,
            is_async: self.is_async,
            is_static: self.is_static,
            is_abstract: self.is_abstract,
            complexity: self.complexity,
            parameters: self.parameters.clone(),
            return_type: self.return_type.clone(),
            docstring: self.docstring.clone(),
            purpose: self.purpose.clone(),
            hash: self.hash.clone(),
            dependencies: self.dependencies.clone(),
            exports: self.exports.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.node_key)
    }
}

/// Attributes of a node about to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDraft {
    pub node_key: String,
    pub node_type: NodeType,
    pub location: Location,
    pub name: Option<String>,
    pub signature: Option<String>,
    pub language: String,
    pub visibility: Option<Visibility>,
    pub is_async: Option<bool>,
    pub is_static: Option<bool>,
    pub is_abstract: Option<bool>,
    pub complexity: u32,
    pub parameters: Option<Vec<String>>,
    pub return_type: Option<String>,
    pub docstring: Option<String>,
    pub purpose: Option<String>,
    pub hash: String,
    pub dependencies: Option<Vec<String>>,
    pub exports: Option<Vec<String>>,
}

impl NodeDraft {
    /// Minimal draft, mostly useful for tests and synthetic graphs.
    pub fn new(node_key: impl Into<String>, node_type: NodeType, location: Location) -> Self {
        Self {
            node_key: node_key.into(),
            node_type,
            location,
            name: None,
            signature: None,
            language: "unknown".to_string(),
            visibility: None,
            is_async: None,
            is_static: None,
            is_abstract: None,
            complexity: 1,
            parameters: None,
            return_type: None,
            docstring: None,
            purpose: None,
            hash: String::new(),
            dependencies: None,
            exports: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_complexity(mut self, complexity: u32) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }
}

/// Deserialize a present field as `Some(value)` so an explicit `null` in a
/// patch means "clear", while an absent field stays `None` through `default`.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// In-place change to a node. `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub name: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub signature: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub visibility: Option<Option<Visibility>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub is_async: Option<Option<bool>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub is_static: Option<Option<bool>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub is_abstract: Option<Option<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub parameters: Option<Option<Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub return_type: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub docstring: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub purpose: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub dependencies: Option<Option<Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub exports: Option<Option<Vec<String>>>,
}

macro_rules! diff_field {
    ($patch:ident, $node:ident, $draft:ident, $field:ident) => {
        if $node.$field != $draft.$field {
            $patch.$field = Some($draft.$field.clone());
        }
    };
}

macro_rules! apply_field {
    ($patch:ident, $node:ident, $field:ident) => {
        if let Some(value) = &$patch.$field {
            $node.$field = value.clone();
        }
    };
}

macro_rules! capture_field {
    ($patch:ident, $inverse:ident, $node:ident, $field:ident) => {
        if $patch.$field.is_some() {
            $inverse.$field = Some($node.$field.clone());
        }
    };
}

impl NodePatch {
    /// Patch touching only the fields in which `draft` differs from `node`.
    /// `purpose` is never part of a diff: it is owned by the summarizer.
    pub fn between(node: &GraphNode, draft: &NodeDraft) -> Self {
        let mut patch = Self::default();
        diff_field!(patch, node, draft, node_key);
        diff_field!(patch, node, draft, node_type);
        diff_field!(patch, node, draft, location);
        diff_field!(patch, node, draft, name);
        diff_field!(patch, node, draft, signature);
        diff_field!(patch, node, draft, language);
        diff_field!(patch, node, draft, visibility);
        diff_field!(patch, node, draft, is_async);
        diff_field!(patch, node, draft, is_static);
        diff_field!(patch, node, draft, is_abstract);
        diff_field!(patch, node, draft, complexity);
        diff_field!(patch, node, draft, parameters);
        diff_field!(patch, node, draft, return_type);
        diff_field!(patch, node, draft, docstring);
        diff_field!(patch, node, draft, hash);
        diff_field!(patch, node, draft, dependencies);
        diff_field!(patch, node, draft, exports);
        patch
    }

    /// Patch that relocates a node without touching anything else.
    pub fn relocate(node_key: String, location: Location) -> Self {
        Self {
            node_key: Some(node_key),
            location: Some(location),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write every field set in this patch onto `node`.
    pub fn apply_to(&self, node: &mut GraphNode) {
        apply_field!(self, node, node_key);
        apply_field!(self, node, node_type);
        apply_field!(self, node, location);
        apply_field!(self, node, name);
        apply_field!(self, node, signature);
        apply_field!(self, node, language);
        apply_field!(self, node, visibility);
        apply_field!(self, node, is_async);
        apply_field!(self, node, is_static);
        apply_field!(self, node, is_abstract);
        apply_field!(self, node, complexity);
        apply_field!(self, node, parameters);
        apply_field!(self, node, return_type);
        apply_field!(self, node, docstring);
        apply_field!(self, node, purpose);
        apply_field!(self, node, hash);
        apply_field!(self, node, dependencies);
        apply_field!(self, node, exports);
    }

    /// The patch that restores `node`'s current values for every field this
    /// patch would change.
    pub fn inverse(&self, node: &GraphNode) -> Self {
        let mut inverse = Self::default();
        capture_field!(self, inverse, node, node_key);
        capture_field!(self, inverse, node, node_type);
        capture_field!(self, inverse, node, location);
        capture_field!(self, inverse, node, name);
        capture_field!(self, inverse, node, signature);
        capture_field!(self, inverse, node, language);
        capture_field!(self, inverse, node, visibility);
        capture_field!(self, inverse, node, is_async);
        capture_field!(self, inverse, node, is_static);
        capture_field!(self, inverse, node, is_abstract);
        capture_field!(self, inverse, node, complexity);
        capture_field!(self, inverse, node, parameters);
        capture_field!(self, inverse, node, return_type);
        capture_field!(self, inverse, node, docstring);
        capture_field!(self, inverse, node, purpose);
        capture_field!(self, inverse, node, hash);
        capture_field!(self, inverse, node, dependencies);
        capture_field!(self, inverse, node, exports);
        inverse
    }
}

// ============================================================================
// Edges
// ============================================================================

/// Relationship kinds between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    Calls,
    Imports,
    Extends,
    Implements,
    Contains,
    Uses,
    DataFlow,
    ControlFlow,
}

impl EdgeType {
    pub const ALL: [EdgeType; 8] = [
        Self::Calls,
        Self::Imports,
        Self::Extends,
        Self::Implements,
        Self::Contains,
        Self::Uses,
        Self::DataFlow,
        Self::ControlFlow,
    ];

    /// Edge types that express "source depends on target".
    pub const DEPENDENCY: [EdgeType; 5] = [
        Self::Calls,
        Self::Imports,
        Self::Uses,
        Self::Extends,
        Self::Implements,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calls => "CALLS",
            Self::Imports => "IMPORTS",
            Self::Extends => "EXTENDS",
            Self::Implements => "IMPLEMENTS",
            Self::Contains => "CONTAINS",
            Self::Uses => "USES",
            Self::DataFlow => "DATA_FLOW",
            Self::ControlFlow => "CONTROL_FLOW",
        }
    }

    pub fn is_dependency(&self) -> bool {
        Self::DEPENDENCY.contains(self)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relationship stored in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: EdgeId,
    pub project_id: String,
    pub version_id: VersionId,
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub edge_type: EdgeType,
    pub weight: Option<f64>,
    pub call_type: Option<String>,
    pub is_conditional: Option<bool>,
    pub is_loop_dependent: Option<bool>,
    pub is_async_context: Option<bool>,
    pub properties: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl GraphEdge {
    /// Weight used by path costs; absent weights count as 1.
    pub fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }

    pub fn to_draft(&self) -> EdgeDraft {
        EdgeDraft {
            source_node_id: self.source_node_id,
            target_node_id: self.target_node_id,
            edge_type: self.edge_type,
            weight: self.weight,
            call_type: self.call_type.clone(),
            is_conditional: self.is_conditional,
            is_loop_dependent: self.is_loop_dependent,
            is_async_context: self.is_async_context,
            properties: self.properties.clone(),
        }
    }
}

/// Attributes of an edge about to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDraft {
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub edge_type: EdgeType,
    pub weight: Option<f64>,
    pub call_type: Option<String>,
    pub is_conditional: Option<bool>,
    pub is_loop_dependent: Option<bool>,
    pub is_async_context: Option<bool>,
    pub properties: Option<serde_json::Value>,
}

impl EdgeDraft {
    pub fn new(source: NodeId, target: NodeId, edge_type: EdgeType) -> Self {
        Self {
            source_node_id: source,
            target_node_id: target,
            edge_type,
            weight: None,
            call_type: None,
            is_conditional: None,
            is_loop_dependent: None,
            is_async_context: None,
            properties: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// In-place change to an edge's attributes. Endpoints and type are fixed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgePatch {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub weight: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub call_type: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub is_conditional: Option<Option<bool>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub is_loop_dependent: Option<Option<bool>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub is_async_context: Option<Option<bool>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub properties: Option<Option<serde_json::Value>>,
}

impl EdgePatch {
    pub fn apply_to(&self, edge: &mut GraphEdge) {
        apply_field!(self, edge, weight);
        apply_field!(self, edge, call_type);
        apply_field!(self, edge, is_conditional);
        apply_field!(self, edge, is_loop_dependent);
        apply_field!(self, edge, is_async_context);
        apply_field!(self, edge, properties);
    }

    pub fn inverse(&self, edge: &GraphEdge) -> Self {
        let mut inverse = Self::default();
        capture_field!(self, inverse, edge, weight);
        capture_field!(self, inverse, edge, call_type);
        capture_field!(self, inverse, edge, is_conditional);
        capture_field!(self, inverse, edge, is_loop_dependent);
        capture_field!(self, inverse, edge, is_async_context);
        capture_field!(self, inverse, edge, properties);
        inverse
    }
}

// ============================================================================
// Audit Log
// ============================================================================

/// Mutation recorded by an audit-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    AddNode,
    UpdateNode,
    DeleteNode,
    AddEdge,
    UpdateEdge,
    DeleteEdge,
}

/// Why a mutation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    NodeAdded,
    NodeDeleted,
    NodeModified,
    NodeMoved,
    FileRenamed,
    EdgeAdded,
    EdgeRemoved,
}

impl ChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeAdded => "node_added",
            Self::NodeDeleted => "node_deleted",
            Self::NodeModified => "node_modified",
            Self::NodeMoved => "node_moved",
            Self::FileRenamed => "file_renamed",
            Self::EdgeAdded => "edge_added",
            Self::EdgeRemoved => "edge_removed",
        }
    }
}

/// An entry of the append-only operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOperation {
    pub id: OperationId,
    pub project_id: String,
    pub version_id: VersionId,
    pub operation_type: OperationType,
    pub node_id: Option<NodeId>,
    pub edge_id: Option<EdgeId>,
    pub operation_data: serde_json::Value,
    pub rollback_data: Option<serde_json::Value>,
    pub file_path: Option<String>,
    pub change_reason: ChangeReason,
    pub created_at: DateTime<Utc>,
}

/// An audit-log entry before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDraft {
    pub operation_type: OperationType,
    pub node_id: Option<NodeId>,
    pub edge_id: Option<EdgeId>,
    pub operation_data: serde_json::Value,
    pub rollback_data: Option<serde_json::Value>,
    pub file_path: Option<String>,
    pub change_reason: ChangeReason,
}

// ============================================================================
// Query Shapes
// ============================================================================

/// Filter for node queries. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeFilter {
    pub node_type: Option<NodeType>,
    /// Exact name match
    pub name: Option<String>,
    /// Exact file path match
    pub file_path: Option<String>,
    /// Case-insensitive substring of the name
    pub fuzzy_pattern: Option<String>,
    /// Pin reads to a version
    pub version_id: Option<VersionId>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn in_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn matching(mut self, pattern: impl Into<String>) -> Self {
        self.fuzzy_pattern = Some(pattern.into());
        self
    }

    pub fn at_version(mut self, version_id: Option<VersionId>) -> Self {
        self.version_id = version_id;
        self
    }

    pub fn paginate(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

/// Filter for edge queries. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeFilter {
    pub source_node_id: Option<NodeId>,
    pub target_node_id: Option<NodeId>,
    pub edge_types: Option<Vec<EdgeType>>,
    pub version_id: Option<VersionId>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl EdgeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_node(mut self, node: NodeId) -> Self {
        self.source_node_id = Some(node);
        self
    }

    pub fn to_node(mut self, node: NodeId) -> Self {
        self.target_node_id = Some(node);
        self
    }

    pub fn of_types(mut self, edge_types: &[EdgeType]) -> Self {
        self.edge_types = Some(edge_types.to_vec());
        self
    }

    pub fn at_version(mut self, version_id: Option<VersionId>) -> Self {
        self.version_id = version_id;
        self
    }

    pub fn matches_type(&self, edge_type: EdgeType) -> bool {
        self.edge_types
            .as_ref()
            .is_none_or(|types| types.contains(&edge_type))
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult<T> {
    pub data: Vec<T>,
    pub total_count: usize,
    pub has_more: bool,
    pub time_ms: u64,
}

/// A node with every edge touching it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeWithConnections {
    pub node: GraphNode,
    pub incoming: Vec<GraphEdge>,
    pub outgoing: Vec<GraphEdge>,
}

/// Aggregate statistics about one project's graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStatistics {
    pub project_id: String,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
    pub file_count: usize,
    pub languages: BTreeMap<String, usize>,
    pub average_complexity: f64,
    pub version_count: usize,
    pub current_version: Option<u64>,
    pub operation_count: usize,
}

// ============================================================================
// Batch Shapes
// ============================================================================

/// Kind of change reported for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// A single file change fed to the incremental updater.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// Path relative to the project root.
    pub path: String,
    pub change_type: ChangeType,
    pub old_path: Option<String>,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
}

impl FileChange {
    pub fn added(path: impl Into<String>, content: Option<String>) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Added,
            old_path: None,
            old_content: None,
            new_content: content,
        }
    }

    pub fn modified(
        path: impl Into<String>,
        old_content: Option<String>,
        new_content: Option<String>,
    ) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Modified,
            old_path: None,
            old_content,
            new_content,
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Deleted,
            old_path: None,
            old_content: None,
            new_content: None,
        }
    }

    pub fn renamed(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self {
            path: new_path.into(),
            change_type: ChangeType::Renamed,
            old_path: Some(old_path.into()),
            old_content: None,
            new_content: None,
        }
    }
}

/// Failure recorded for one file of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileError {
    pub file_path: String,
    pub message: String,
}

/// Counts for a single processed file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileBuildStats {
    pub nodes_added: usize,
    pub nodes_updated: usize,
    pub edges_added: usize,
    pub edges_dropped: usize,
}

/// Outcome of a whole-project build or an incremental update batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUpdateResult {
    pub success: bool,
    pub project_id: String,
    pub version_id: Option<VersionId>,
    pub files_processed: usize,
    pub nodes_added: usize,
    pub nodes_updated: usize,
    pub nodes_deleted: usize,
    pub edges_added: usize,
    pub edges_deleted: usize,
    pub edges_dropped: usize,
    pub operations_logged: usize,
    pub errors: Vec<FileError>,
    pub duration_ms: u64,
}

impl GraphUpdateResult {
    pub fn new(project_id: impl Into<String>, version_id: VersionId) -> Self {
        Self {
            project_id: project_id.into(),
            version_id: Some(version_id),
            ..Self::default()
        }
    }

    pub fn record_error(&mut self, file_path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FileError {
            file_path: file_path.into(),
            message: message.into(),
        });
    }

    pub fn absorb(&mut self, stats: FileBuildStats) {
        self.nodes_added += stats.nodes_added;
        self.nodes_updated += stats.nodes_updated;
        self.edges_added += stats.edges_added;
        self.edges_dropped += stats.edges_dropped;
    }
}

/// Input to a whole-project build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildContext {
    pub project_id: String,
    pub root_path: PathBuf,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub checksum: Option<String>,
}

impl BuildContext {
    pub fn new(project_id: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Self {
            project_id: project_id.into(),
            root_path: root_path.into(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            checksum: None,
        }
    }

    pub fn with_include(mut self, pattern: &str) -> Self {
        self.include_patterns.push(pattern.to_string());
        self
    }

    pub fn with_exclude(mut self, pattern: &str) -> Self {
        self.exclude_patterns.push(pattern.to_string());
        self
    }
}

/// Input to an incremental update batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContext {
    /// Root used to read files whose content is not supplied inline.
    pub root_path: PathBuf,
}

impl UpdateContext {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
        }
    }
}
