//! Self-play learning loop.
//!
//! A challenger proposes tasks, several solver strategies answer them, and
//! the disagreement between their confidences drives both the curriculum and
//! the challenger's reward. Completed cycles feed the temporal knowledge
//! pipeline in [`crate::knowledge`].

mod advantage;
pub mod analysis;
pub mod collaborators;
mod config;
mod curriculum;
mod engine;
mod orchestrator;
pub mod quality;
mod store;
mod types;

#[cfg(test)]
mod testing;

pub use advantage::{AdvantageOptimizer, group_advantages};
pub use analysis::{AnalysisOutcome, AnalysisResults, CurriculumSnapshot};
pub use collaborators::{
    ChallengeGenerator, KeywordSafetyPolicy, SafetyPolicy, SafetyVerdict, SolutionDraft,
    TemplateBackend,
};
pub use config::LearningConfig;
pub use curriculum::{CurriculumController, DifficultyChange, DomainPerformance};
pub use engine::spawn_cycle_loop;
pub use orchestrator::{LearningOrchestrator, Statistics};
pub use store::CycleStore;
pub use types::*;

use thiserror::Error;

/// Learning system errors.
#[derive(Debug, Error)]
pub enum LearningError {
    #[error("{stage} generation failed: {message}")]
    Generation { stage: &'static str, message: String },

    #[error("safety review failed: {0}")]
    Safety(String),

    #[error("{stage} timed out after {timeout_ms}ms")]
    Timeout { stage: &'static str, timeout_ms: u64 },

    #[error("cycle integrity violated: {0}")]
    Integrity(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("learning database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
