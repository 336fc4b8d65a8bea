//! Self-play curriculum engine.
//!
//! [`learning`] runs challenger/solver cycles and adapts difficulty from
//! solver disagreement; [`knowledge`] turns each completed cycle into
//! timestamped facts with merge and expiry tracking.

pub mod config;
pub mod knowledge;
pub mod learning;

pub use config::EngineConfig;
pub use knowledge::TemporalKnowledgePipeline;
pub use learning::{LearningCycle, LearningError, LearningOrchestrator, spawn_cycle_loop};
