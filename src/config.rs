//! Engine configuration loaded from TOML.

use crate::knowledge::KnowledgeConfig;
use crate::learning::{LearningConfig, LearningError};

use serde::{Deserialize, Serialize};

use std::path::Path;

/// Root configuration: one `[learning]` and one `[knowledge]` table.
///
/// Missing tables and fields fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub learning: LearningConfig,
    pub knowledge: KnowledgeConfig,
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, LearningError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, LearningError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LearningError> {
        let learning = &self.learning;
        let knowledge = &self.knowledge;

        if !(0.0..=1.0).contains(&learning.low_threshold)
            || !(0.0..=1.0).contains(&learning.high_threshold)
            || learning.low_threshold >= learning.high_threshold
        {
            return Err(LearningError::InvalidConfig(format!(
                "thresholds must satisfy 0 <= low < high <= 1 (got {} and {})",
                learning.low_threshold, learning.high_threshold
            )));
        }
        if !(0.0..=1.0).contains(&learning.performance_smoothing) {
            return Err(LearningError::InvalidConfig(
                "performance_smoothing must be within [0, 1]".into(),
            ));
        }
        if learning.strategies.is_empty() {
            return Err(LearningError::InvalidConfig(
                "at least one solver strategy is required".into(),
            ));
        }
        if learning.advantage_window == 0 {
            return Err(LearningError::InvalidConfig(
                "advantage_window must be > 0".into(),
            ));
        }
        if learning.call_timeout_ms == 0 {
            return Err(LearningError::InvalidConfig("call_timeout_ms must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&knowledge.similarity_threshold) {
            return Err(LearningError::InvalidConfig(
                "similarity_threshold must be within [0, 1]".into(),
            ));
        }
        if knowledge.max_history_size == 0 || knowledge.cleanup_threshold == 0 {
            return Err(LearningError::InvalidConfig(
                "max_history_size and cleanup_threshold must be > 0".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
