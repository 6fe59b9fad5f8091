//! Similarity scoring for node search.

use crate::types::GraphNode;
use std::collections::BTreeSet;

/// Edit-distance similarity of two names, case-insensitive, in `[0, 1]`.
pub fn name_similarity(query: &str, name: &str) -> f64 {
    let query = query.to_lowercase();
    let name = name.to_lowercase();
    let max_len = query.chars().count().max(name.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = strsim::levenshtein(&query, &name);
    1.0 - distance as f64 / max_len as f64
}

/// Lowercased alphanumeric tokens. camelCase and snake_case names split into
/// their parts.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in text.chars() {
        if !ch.is_alphanumeric() {
            flush(&mut current, &mut tokens);
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower {
            flush(&mut current, &mut tokens);
        }
        prev_lower = ch.is_lowercase() || ch.is_numeric();
        current.extend(ch.to_lowercase());
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn flush(current: &mut String, tokens: &mut BTreeSet<String>) {
    if !current.is_empty() {
        tokens.insert(std::mem::take(current));
    }
}

/// |a ∩ b| / |a ∪ b|; zero when both are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Best token-set score over the name, docstring and purpose fields that
/// contain `query`. `None` when no field contains it.
pub fn content_score(query: &str, node: &GraphNode) -> Option<f64> {
    let needle = query.to_lowercase();
    let query_tokens = tokenize(query);
    [node.name.as_deref(), node.docstring.as_deref(), node.purpose.as_deref()]
        .into_iter()
        .flatten()
        .filter(|field| field.to_lowercase().contains(&needle))
        .map(|field| jaccard(&query_tokens, &tokenize(field)))
        .reduce(f64::max)
}
