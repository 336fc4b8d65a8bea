//! Temporal knowledge pipeline.
//!
//! Turns completed learning cycles into timestamped atomic facts, merges
//! duplicates, expires superseded knowledge and keeps a bounded working
//! memory for curriculum queries.

mod agent;
mod base;
mod config;
mod facts;
mod invalidation;
mod pipeline;
mod resolution;
pub mod types;

pub use agent::{
    ArchiveStats, CleanupReport, CycleSummary, MemoryStats, QualityTrend, QualityTrendReport,
    SimilarChallenge, TemporalKnowledgeAgent,
};
pub use base::{EvolvingKnowledgeBase, TimelineBucket};
pub use config::KnowledgeConfig;
pub use facts::{AtomicFactsEngine, CHALLENGE_SOURCE, OUTCOME_SOURCE, SOLUTION_SOURCE};
pub use invalidation::{InvalidationSummary, Replacement, TemporalInvalidationEngine};
pub use pipeline::{DigestReport, TemporalKnowledgePipeline};
pub use resolution::{EntityResolutionEngine, MergeEvent, fact_similarity, string_similarity};
pub use types::{Contradiction, ContradictionKind, ExpiredFact, Fact, FactKey, FactValue};
