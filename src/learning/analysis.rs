//! Post-cycle analyses.
//!
//! Every analysis is an independent read over the latest cycle, the shared
//! knowledge pipeline and a curriculum snapshot. They run concurrently on a
//! `JoinSet`; an error or a panic in one becomes a [`AnalysisOutcome::Failed`]
//! entry under its name and never reaches its siblings.

use crate::knowledge::TemporalKnowledgePipeline;
use crate::learning::curriculum::{DifficultyChange, DomainPerformance};
use crate::learning::{Difficulty, Domain, EvolutionDirection, LearningCycle, LearningError};

use futures::FutureExt as _;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tokio::task::JoinSet;

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

pub const SIMILAR_CHALLENGES: &str = "similar_challenges";
pub const QUALITY_TREND: &str = "quality_trend";
pub const LEARNING_CONTINUITY: &str = "learning_continuity";
pub const KNOWLEDGE_EVOLUTION: &str = "knowledge_evolution";
pub const INVALIDATION_SUMMARY: &str = "invalidation_summary";
pub const CURRICULUM_EVOLUTION: &str = "curriculum_evolution";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Completed(Value),
    Failed { error: String },
}

impl AnalysisOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }
}

pub type AnalysisResults = BTreeMap<String, AnalysisOutcome>;

/// Curriculum state copied out of the orchestrator for the analyses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurriculumSnapshot {
    /// Difficulty of the next cycle's domain.
    pub current_difficulty: Difficulty,
    pub global_difficulty: Difficulty,
    pub changes: Vec<DifficultyChange>,
    pub evolution_direction: EvolutionDirection,
    pub domain_performance: BTreeMap<Domain, DomainPerformance>,
}

/// Everything an analysis may read.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub knowledge: Arc<RwLock<TemporalKnowledgePipeline>>,
    pub last_cycle: Option<LearningCycle>,
    pub curriculum: CurriculumSnapshot,
}

type AnalysisFuture = Pin<Box<dyn Future<Output = Result<Value, LearningError>> + Send>>;

fn boxed<F>(analysis: F) -> AnalysisFuture
where
    F: Future<Output = Result<Value, LearningError>> + Send + 'static,
{
    Box::pin(analysis)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run every analysis concurrently and collect the results by name.
pub async fn run_analyses(context: AnalysisContext) -> AnalysisResults {
    let context = Arc::new(context);
    let analyses = vec![
        (SIMILAR_CHALLENGES, boxed(similar_challenges(context.clone()))),
        (QUALITY_TREND, boxed(quality_trend(context.clone()))),
        (LEARNING_CONTINUITY, boxed(learning_continuity(context.clone()))),
        (KNOWLEDGE_EVOLUTION, boxed(knowledge_evolution(context.clone()))),
        (INVALIDATION_SUMMARY, boxed(invalidation_summary(context.clone()))),
        (CURRICULUM_EVOLUTION, boxed(curriculum_evolution(context))),
    ];
    run_isolated(analyses).await
}

/// Spawn each named future and gather outcomes, mapping errors, panics and
/// lost tasks to failure markers.
pub(crate) async fn run_isolated(analyses: Vec<(&'static str, AnalysisFuture)>) -> AnalysisResults {
    let expected: BTreeSet<&'static str> = analyses.iter().map(|(name, _)| *name).collect();
    let mut set = JoinSet::new();
    for (name, analysis) in analyses {
        set.spawn(async move { (name, AssertUnwindSafe(analysis).catch_unwind().await) });
    }

    let mut results = AnalysisResults::new();
    while let Some(joined) = set.join_next().await {
        let (name, outcome) = match joined {
            Ok(named) => named,
            Err(error) => {
                tracing::warn!(%error, "analysis task did not complete");
                continue;
            }
        };
        let outcome = match outcome {
            Ok(Ok(value)) => AnalysisOutcome::Completed(value),
            Ok(Err(error)) => {
                tracing::warn!(analysis = name, %error, "analysis failed");
                AnalysisOutcome::Failed {
                    error: error.to_string(),
                }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!(analysis = name, panic = %message, "analysis panicked");
                AnalysisOutcome::Failed {
                    error: format!("analysis panicked: {message}"),
                }
            }
        };
        results.insert(name.to_string(), outcome);
    }

    for name in expected {
        results
            .entry(name.to_string())
            .or_insert_with(|| AnalysisOutcome::Failed {
                error: "analysis task was cancelled".into(),
            });
    }
    results
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".into()
    }
}

// ---------------------------------------------------------------------------
// Analyses
// ---------------------------------------------------------------------------

fn require_cycle(context: &AnalysisContext) -> Result<&LearningCycle, LearningError> {
    context
        .last_cycle
        .as_ref()
        .ok_or_else(|| LearningError::Analysis("no completed cycle to analyse".into()))
}

async fn similar_challenges(context: Arc<AnalysisContext>) -> Result<Value, LearningError> {
    let cycle = require_cycle(&context)?;
    let pipeline = context.knowledge.read().await;
    let window = pipeline.config().analysis_window;
    let matches = pipeline.agent().similar_challenges(&cycle.challenge, window);
    Ok(json!({
        "challenge_id": cycle.challenge.id,
        "window": window,
        "matches": serde_json::to_value(matches)?,
    }))
}

async fn quality_trend(context: Arc<AnalysisContext>) -> Result<Value, LearningError> {
    let cycle = require_cycle(&context)?;
    let pipeline = context.knowledge.read().await;
    let window = pipeline.config().analysis_window;
    let report = pipeline.agent().quality_trend(cycle.challenge.domain, window);
    Ok(serde_json::to_value(report)?)
}

async fn learning_continuity(context: Arc<AnalysisContext>) -> Result<Value, LearningError> {
    let cycle = require_cycle(&context)?;
    let pipeline = context.knowledge.read().await;
    let agent = pipeline.agent();
    let recent = agent.recent_cycles(pipeline.config().analysis_window);
    let score = agent.learning_continuity(&cycle.challenge, &recent);
    let related = recent
        .iter()
        .filter(|summary| {
            summary.domain == cycle.challenge.domain && summary.challenge_id != cycle.challenge.id
        })
        .count();
    Ok(json!({
        "challenge_id": cycle.challenge.id,
        "score": score,
        "related_learnings": related,
    }))
}

async fn knowledge_evolution(context: Arc<AnalysisContext>) -> Result<Value, LearningError> {
    let cycle = require_cycle(&context)?;
    let domain = cycle.challenge.domain.to_string();
    let pipeline = context.knowledge.read().await;
    let timeline = pipeline.timeline(Some(&domain));
    let total_facts: usize = timeline.iter().map(|bucket| bucket.fact_count).sum();
    Ok(json!({
        "domain": domain,
        "total_facts": total_facts,
        "timeline": serde_json::to_value(timeline)?,
    }))
}

async fn invalidation_summary(context: Arc<AnalysisContext>) -> Result<Value, LearningError> {
    let pipeline = context.knowledge.read().await;
    Ok(serde_json::to_value(pipeline.invalidation_summary())?)
}

async fn curriculum_evolution(context: Arc<AnalysisContext>) -> Result<Value, LearningError> {
    let curriculum = &context.curriculum;
    let trend = match (curriculum.changes.first(), curriculum.changes.last()) {
        (Some(first), Some(last)) if last.level > first.level => "rising",
        (Some(first), Some(last)) if last.level < first.level => "falling",
        _ => "flat",
    };
    Ok(json!({
        "current_difficulty": curriculum.current_difficulty,
        "global_difficulty": curriculum.global_difficulty,
        "difficulty_changes": curriculum.changes.len(),
        "difficulty_trend": trend,
        "evolution_direction": curriculum.evolution_direction,
        "domain_performance": serde_json::to_value(&curriculum.domain_performance)?,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
