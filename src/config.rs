//! Run configuration loaded from `.casedup.toml`.
//!
//! Every threshold the pipeline applies lives here so that a catalog owner can
//! tune them per export without touching code. CLI flags override the file.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub thresholds: Thresholds,
    pub neighbors: NeighborConfig,
    pub embedding: EmbeddingConfig,
    pub step_metric: StepMetric,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// Pairs below this similarity are never materialized.
    pub similarity_floor: f64,
    /// `similarity >= semantic_duplicate` labels a pair `semantic_duplicate`.
    pub semantic_duplicate: f64,
    /// `step_overlap >= step_overlap` sets `shares_most_steps`.
    pub step_overlap: f64,
    /// Minimum string ratio for two steps to count as matched.
    pub step_match: f64,
    /// Similarity at which a pair enters the high-priority work list.
    pub high_priority: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            similarity_floor: 0.80,
            semantic_duplicate: 0.90,
            step_overlap: 0.80,
            step_match: 0.85,
            high_priority: 0.95,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    #[default]
    Auto,
    Brute,
    Lsh,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct NeighborConfig {
    /// Neighbors per case, not counting the case itself.
    pub k: usize,
    pub index: IndexKind,
    /// `auto` switches to LSH above this many cases.
    pub brute_force_limit: usize,
    pub lsh_bands: usize,
    pub lsh_rows: usize,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            k: 20,
            index: IndexKind::Auto,
            brute_force_limit: 5000,
            lsh_bands: 16,
            lsh_rows: 8,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Sentence-transformer model run through ONNX Runtime.
    Onnx,
    /// Feature-hashed word n-grams, no model files needed.
    Hashing,
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        if cfg!(feature = "onnx") {
            EmbeddingBackend::Onnx
        } else {
            EmbeddingBackend::Hashing
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub dimension: usize,
    /// Directory holding `model.onnx` and `tokenizer.json`.
    pub model_dir: PathBuf,
    /// Tokens per text; longer inputs are truncated.
    pub max_length: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            dimension: 384,
            model_dir: PathBuf::from("models/all-MiniLM-L6-v2"),
            max_length: 256,
            batch_size: 32,
        }
    }
}

/// String ratio used to match individual steps.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepMetric {
    /// Ratcliff/Obershelp matching blocks, `2 * M / T`.
    #[default]
    Gestalt,
    Levenshtein,
    JaroWinkler,
}

/// Threshold overrides coming from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub semantic_duplicate: Option<f64>,
    pub similarity_floor: Option<f64>,
    pub step_overlap: Option<f64>,
    pub neighbors: Option<usize>,
}

impl Config {
    /// Load config from `path`. A missing file is only tolerated when
    /// `required` is false, in which case defaults are returned.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        if !path.exists() && !required {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self, ConfigError> {
        if let Some(v) = overrides.semantic_duplicate {
            self.thresholds.semantic_duplicate = v;
        }
        if let Some(v) = overrides.similarity_floor {
            self.thresholds.similarity_floor = v;
        }
        if let Some(v) = overrides.step_overlap {
            self.thresholds.step_overlap = v;
        }
        if let Some(v) = overrides.neighbors {
            self.neighbors.k = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("similarity_floor", t.similarity_floor),
            ("semantic_duplicate", t.semantic_duplicate),
            ("step_overlap", t.step_overlap),
            ("step_match", t.step_match),
            ("high_priority", t.high_priority),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.neighbors.k == 0 {
            return Err(ConfigError::Zero("neighbors.k"));
        }
        if self.neighbors.lsh_bands == 0 {
            return Err(ConfigError::Zero("neighbors.lsh_bands"));
        }
        if self.neighbors.lsh_rows == 0 || self.neighbors.lsh_rows > 64 {
            return Err(ConfigError::Zero("neighbors.lsh_rows (1..=64)"));
        }
        for (name, value) in [
            ("embedding.dimension", self.embedding.dimension),
            ("embedding.max_length", self.embedding.max_length),
            ("embedding.batch_size", self.embedding.batch_size),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        Ok(())
    }
}
