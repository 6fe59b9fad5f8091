//! AST diff between two extractions of the same file.

use crate::builder::FileExtraction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A node whose content is unchanged but whose key moved, typically because
/// lines above it were inserted or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovedNode {
    pub old_key: String,
    pub new_key: String,
}

/// Classification of a file's significant nodes between two versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstDiff {
    /// New keys with no counterpart
    pub added: Vec<String>,
    /// Old keys with no counterpart
    pub deleted: Vec<String>,
    /// Keys present on both sides whose hash changed
    pub modified: Vec<String>,
    pub moved: Vec<MovedNode>,
    pub unchanged: usize,
}

impl AstDiff {
    /// No mutation needed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.deleted.is_empty()
            && self.modified.is_empty()
            && self.moved.is_empty()
    }
}

/// Classify nodes of `old` and `new`.
///
/// Key matches take priority: a key present on both sides is modified or
/// unchanged, never moved. Each remaining new node, in scan order, claims the
/// first unclaimed remaining old node with the same hash as a move; otherwise
/// it is added. Old nodes left unclaimed are deleted.
pub fn diff_extractions(old: &FileExtraction, new: &FileExtraction) -> AstDiff {
    let mut diff = AstDiff::default();

    let old_hashes: HashMap<&str, &str> = old
        .nodes
        .iter()
        .map(|n| (n.draft.node_key.as_str(), n.draft.hash.as_str()))
        .collect();
    let new_keys: HashSet<&str> = new.keys().collect();

    let mut unmatched_new = Vec::new();
    for node in &new.nodes {
        let key = node.draft.node_key.as_str();
        match old_hashes.get(key) {
            Some(&hash) if hash == node.draft.hash => diff.unchanged += 1,
            Some(_) => diff.modified.push(key.to_string()),
            None => unmatched_new.push(node),
        }
    }

    let unmatched_old: Vec<_> = old
        .nodes
        .iter()
        .filter(|n| !new_keys.contains(n.draft.node_key.as_str()))
        .collect();
    let mut claimed = vec![false; unmatched_old.len()];

    for node in unmatched_new {
        let candidate = unmatched_old
            .iter()
            .enumerate()
            .find(|(i, old)| !claimed[*i] && old.draft.hash == node.draft.hash);
        match candidate {
            Some((i, old)) => {
                claimed[i] = true;
                diff.moved.push(MovedNode {
                    old_key: old.draft.node_key.clone(),
                    new_key: node.draft.node_key.clone(),
                });
            }
            None => diff.added.push(node.draft.node_key.clone()),
        }
    }

    diff.deleted = unmatched_old
        .iter()
        .zip(&claimed)
        .filter(|(_, claimed)| !**claimed)
        .map(|(old, _)| old.draft.node_key.clone())
        .collect();

    diff
}
