//! Pipeline configuration.
//!
//! Maps the extraction mode to concrete chunking values: token budget,
//! overlap, compression level and the chunk confidence threshold used by the
//! chunk skipper. Explicit values in a loaded config override the mode
//! defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Accuracy vs. inference-cost trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Large chunks, large overlap, minimal cleanup, low skip threshold.
    Conservative,
    /// Large chunks, moderate overlap, aggressive-but-safe compression.
    CostOptimized,
    /// Medium chunks, small overlap, no compression.
    #[default]
    Default,
}

/// How much text cleanup the optimizer applies to a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    None,
    /// Whitespace cleanup only.
    Minimal,
    /// Boilerplate stripping with biomarker-line protection.
    Aggressive,
}

/// Values derived from an [`ExtractionMode`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModeProfile {
    pub chunk_token_budget: usize,
    pub chunk_overlap_tokens: usize,
    pub compression: CompressionLevel,
    /// Chunks below this biomarker confidence may be skipped when
    /// administrative patterns dominate.
    pub chunk_confidence_threshold: f32,
}

impl ExtractionMode {
    pub fn profile(self) -> ModeProfile {
        match self {
            ExtractionMode::Conservative => ModeProfile {
                chunk_token_budget: 2000,
                chunk_overlap_tokens: 200,
                compression: CompressionLevel::Minimal,
                chunk_confidence_threshold: 0.10,
            },
            ExtractionMode::CostOptimized => ModeProfile {
                chunk_token_budget: 2000,
                chunk_overlap_tokens: 100,
                compression: CompressionLevel::Aggressive,
                chunk_confidence_threshold: 0.30,
            },
            ExtractionMode::Default => ModeProfile {
                chunk_token_budget: 1000,
                chunk_overlap_tokens: 50,
                compression: CompressionLevel::None,
                chunk_confidence_threshold: 0.30,
            },
        }
    }
}

/// Inference service connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    /// Per-call timeout. Runs are background work, so this is generous.
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "medgemma:latest".into(),
            timeout_secs: 600,
        }
    }
}

/// Recognized pipeline options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: ExtractionMode,
    /// Falls back to the mode default when absent.
    pub chunk_token_budget: Option<usize>,
    pub chunk_overlap_tokens: Option<usize>,
    pub min_confidence: f32,
    /// Administrative hits a chunk may carry before it becomes skippable.
    pub admin_pattern_threshold: usize,
    pub cache_confidence_threshold: f32,
    /// Hard cap on the fraction of tokens compression may remove.
    pub max_compression_ratio: f32,
    pub inference: InferenceConfig,
    /// Pattern store location. `None` uses [`crate::config::pattern_cache_path`].
    pub pattern_cache_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Default,
            chunk_token_budget: None,
            chunk_overlap_tokens: None,
            min_confidence: 0.6,
            admin_pattern_threshold: 3,
            cache_confidence_threshold: 0.8,
            max_compression_ratio: 0.30,
            inference: InferenceConfig::default(),
            pattern_cache_path: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ═══════════════════════════════════════════════════════════
// Derivation
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    pub fn for_mode(mode: ExtractionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn profile(&self) -> ModeProfile {
        self.mode.profile()
    }

    /// Effective per-chunk token budget.
    pub fn chunk_budget(&self) -> usize {
        self.chunk_token_budget
            .unwrap_or(self.profile().chunk_token_budget)
    }

    /// Effective overlap, clamped to half the budget so a chunk always has
    /// room for new content.
    pub fn chunk_overlap(&self) -> usize {
        let overlap = self
            .chunk_overlap_tokens
            .unwrap_or(self.profile().chunk_overlap_tokens);
        overlap.min(self.chunk_budget() / 2)
    }

    pub fn pattern_cache_path(&self) -> PathBuf {
        self.pattern_cache_path
            .clone()
            .unwrap_or_else(crate::config::pattern_cache_path)
    }

    /// Reject values the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("min_confidence", self.min_confidence),
            ("cache_confidence_threshold", self.cache_confidence_threshold),
            ("max_compression_ratio", self.max_compression_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be within 0..=1, got {value}"
                )));
            }
        }
        if self.chunk_budget() == 0 {
            return Err(ConfigError::Invalid(
                "chunk_token_budget must be positive".into(),
            ));
        }
        if self.inference.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "inference.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Load and validate a JSON pipeline config. Missing fields take defaults.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
    let config: PipelineConfig = serde_json::from_str(&raw)?;
    config.validate()?;
    tracing::info!(
        path = %path.display(),
        mode = ?config.mode,
        budget = config.chunk_budget(),
        "Pipeline config loaded"
    );
    Ok(config)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
