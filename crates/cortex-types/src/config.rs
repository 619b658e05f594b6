//! Layered configuration (spec §6.4, expanded in SPEC_FULL.md §9.5).
//!
//! Loaded from TOML with `deny_unknown_fields` — per design note "dynamic
//! option maps → explicit configuration structs; unknown fields are
//! validation errors" — then overridden by a small set of environment
//! variables, mirroring the explicit → env → default priority chain used by
//! the teacher codebase's workspace-path resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HybridWeights {
    pub semantic: f64,
    pub keyword: f64,
    pub graph: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            semantic: 0.5,
            keyword: 0.3,
            graph: 0.2,
        }
    }
}

impl HybridWeights {
    const EPSILON: f64 = 1e-6;

    /// Renormalizes so the three weights sum to 1.0, per spec §4.9: "must
    /// sum to 1.0 ± ε, otherwise renormalize."
    #[must_use]
    pub fn normalized(self) -> Self {
        let sum = self.semantic + self.keyword + self.graph;
        if (sum - 1.0).abs() <= Self::EPSILON || sum <= Self::EPSILON {
            return self;
        }
        Self {
            semantic: self.semantic / sum,
            keyword: self.keyword / sum,
            graph: self.graph / sum,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

fn default_true() -> bool {
    true
}

fn default_vector_dimensions() -> usize {
    768
}

fn default_batch_size() -> usize {
    100
}

fn default_timeline_depth() -> usize {
    100
}

fn default_lineage_depth() -> usize {
    10
}

fn default_retention_days() -> u32 {
    365
}

fn default_min_confidence() -> f64 {
    0.5
}

/// Every key enumerated in spec §6.4. Fields absent from a configuration
/// file fall back to the documented default; fields present but unknown to
/// this struct are a load-time error, never silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    pub db_path: PathBuf,
    pub diagnostics_db_path: PathBuf,
    #[serde(default = "default_true")]
    pub enable_vector_search: bool,
    #[serde(default = "default_vector_dimensions")]
    pub vector_dimensions: usize,
    pub embedding_provider: Option<String>,
    pub llm_provider: Option<String>,
    pub llm_api_key: Option<String>,
    pub graph_endpoint: Option<String>,
    pub vector_endpoint: Option<String>,
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
    #[serde(default = "default_true")]
    pub enable_auto_merge: bool,
    #[serde(default = "default_timeline_depth")]
    pub max_timeline_depth: usize,
    #[serde(default)]
    pub bm25: Bm25Params,
    #[serde(default)]
    pub hybrid_weights: HybridWeights,
    #[serde(default = "default_lineage_depth")]
    pub max_lineage_depth: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("cortex.db"),
            diagnostics_db_path: PathBuf::from("cortex-diagnostics.db"),
            enable_vector_search: true,
            vector_dimensions: default_vector_dimensions(),
            embedding_provider: None,
            llm_provider: None,
            llm_api_key: None,
            graph_endpoint: None,
            vector_endpoint: None,
            default_batch_size: default_batch_size(),
            enable_auto_merge: true,
            max_timeline_depth: default_timeline_depth(),
            bm25: Bm25Params::default(),
            hybrid_weights: HybridWeights::default(),
            max_lineage_depth: default_lineage_depth(),
            retention_days: default_retention_days(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl Configuration {
    /// Loads from a TOML file, then applies `CORTEX_*` environment overrides
    /// for the handful of secrets/paths that should never live in a
    /// checked-in file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Configuration = toml::from_str(&text)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("CORTEX_LLM_API_KEY") {
            self.llm_api_key = Some(key);
        }
        if let Ok(path) = std::env::var("CORTEX_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hybrid_weights_sum_to_one() {
        let w = HybridWeights::default();
        assert!((w.semantic + w.keyword + w.graph - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hybrid_weights_renormalize_when_off_by_more_than_epsilon() {
        let w = HybridWeights {
            semantic: 1.0,
            keyword: 1.0,
            graph: 0.0,
        }
        .normalized();
        assert!((w.semantic + w.keyword + w.graph - 1.0).abs() < 1e-9);
        assert_eq!(w.semantic, 0.5);
        assert_eq!(w.keyword, 0.5);
    }

    #[test]
    fn load_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cortex.toml");
        std::fs::write(&path, "not_a_real_key = 1\n").unwrap();
        assert!(Configuration::load(&path).is_err());
    }

    #[test]
    fn load_applies_documented_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cortex.toml");
        std::fs::write(&path, "").unwrap();
        let config = Configuration::load(&path).unwrap();
        assert_eq!(config.max_lineage_depth, 10);
        assert_eq!(config.retention_days, 365);
        assert_eq!(config.min_confidence, 0.5);
    }
}
