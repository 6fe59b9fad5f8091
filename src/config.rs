//! Engine configuration.
//!
//! Defaults match the values the engine was tuned with. A config can be read
//! from a JSON file and then overlaid with `OMNI_CPG_*` environment
//! variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "OMNI_CPG_";

/// Tunables shared by the builder, the updater and the query engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Files read and extracted at once during a project build
    pub max_concurrent_files: usize,
    /// Files larger than this are skipped by discovery
    pub max_file_size: u64,
    /// Run the purpose annotation pass after builds
    pub annotate_purposes: bool,
    pub purpose_batch_size: usize,
    /// Pause between annotation batches
    pub purpose_batch_delay_ms: u64,
    pub default_search_limit: usize,
    pub fuzzy_threshold: f64,
    pub dependency_depth: usize,
    pub path_depth: usize,
    pub cycle_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: 8,
            max_file_size: 2 * 1024 * 1024,
            annotate_purposes: true,
            purpose_batch_size: 5,
            purpose_batch_delay_ms: 200,
            default_search_limit: 20,
            fuzzy_threshold: 0.3,
            dependency_depth: 5,
            path_depth: 10,
            cycle_depth: 10,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Self {
        self.overlay(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps a full variable name to its value.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        override_from(&lookup, "MAX_CONCURRENT_FILES", &mut self.max_concurrent_files);
        override_from(&lookup, "MAX_FILE_SIZE", &mut self.max_file_size);
        override_from(&lookup, "ANNOTATE_PURPOSES", &mut self.annotate_purposes);
        override_from(&lookup, "PURPOSE_BATCH_SIZE", &mut self.purpose_batch_size);
        override_from(&lookup, "PURPOSE_BATCH_DELAY_MS", &mut self.purpose_batch_delay_ms);
        override_from(&lookup, "DEFAULT_SEARCH_LIMIT", &mut self.default_search_limit);
        override_from(&lookup, "FUZZY_THRESHOLD", &mut self.fuzzy_threshold);
        override_from(&lookup, "DEPENDENCY_DEPTH", &mut self.dependency_depth);
        override_from(&lookup, "PATH_DEPTH", &mut self.path_depth);
        override_from(&lookup, "CYCLE_DEPTH", &mut self.cycle_depth);
        self
    }

    pub fn with_max_concurrent_files(mut self, n: usize) -> Self {
        self.max_concurrent_files = n.max(1);
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_purpose_annotation(mut self, enabled: bool) -> Self {
        self.annotate_purposes = enabled;
        self
    }

    pub fn with_purpose_batching(mut self, batch_size: usize, delay_ms: u64) -> Self {
        self.purpose_batch_size = batch_size.max(1);
        self.purpose_batch_delay_ms = delay_ms;
        self
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn with_default_search_limit(mut self, limit: usize) -> Self {
        self.default_search_limit = limit;
        self
    }
}

fn override_from<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let name = format!("{ENV_PREFIX}{key}");
    let Some(raw) = lookup(&name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!("Ignoring {}: cannot parse {:?}", name, raw),
    }
}
