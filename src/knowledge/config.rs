//! Knowledge pipeline configuration.

use serde::{Deserialize, Serialize};

/// Configuration for fact resolution, invalidation and retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct KnowledgeConfig {
    /// Normalised edit-distance similarity at or above which two facts of the
    /// same type are merged.
    pub similarity_threshold: f64,
    /// Maximum contradictions reported by a single search.
    pub max_contradictions: usize,
    /// Confidence-fact gap beyond which a pair is flagged as numerically
    /// divergent.
    pub confidence_divergence: f64,
    /// Window, in days, counted as "recent" by the invalidation summary.
    pub recent_expiry_days: i64,
    /// Facts kept by the knowledge agent after cleanup.
    pub max_history_size: usize,
    /// History length above which the knowledge agent cleans up.
    pub cleanup_threshold: usize,
    /// Recent cycles examined by the similarity and trend analyses.
    pub analysis_window: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            max_contradictions: 100,
            confidence_divergence: 0.5,
            recent_expiry_days: 7,
            max_history_size: 1000,
            cleanup_threshold: 1200,
            analysis_window: 10,
        }
    }
}
