//! Temporal knowledge agent: bounded fact memory plus cycle-level queries.
//!
//! The agent keeps its own bounded copy of recent facts. Once the history
//! grows past `cleanup_threshold` it is sorted newest first and cut back to
//! `max_history_size`; whatever falls off is counted into [`ArchiveStats`].
//! A separate ring of [`CycleSummary`] records backs the similarity, trend
//! and continuity queries used to steer the curriculum.

use crate::knowledge::KnowledgeConfig;
use crate::knowledge::types::Fact;
use crate::learning::{Challenge, Difficulty, Domain, LearningCycle, clamp_unit};

use chrono::{DateTime, Utc};
use serde::Serialize;

use std::collections::{BTreeMap, HashSet, VecDeque};

/// Half-mean gap beyond which a quality series counts as moving.
const TREND_BAND: f64 = 0.05;

/// Similarity score below which a past challenge is not reported.
const MIN_SIMILARITY: f64 = 0.3;

const CONTINUITY_PER_LEARNING: f64 = 0.2;
const CONTINUITY_STRONG_BONUS: f64 = 0.1;
const STRONG_IMPROVEMENT: f64 = 0.1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the agent remembers about one completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub cycle_id: String,
    pub challenge_id: String,
    pub domain: Domain,
    pub difficulty: Difficulty,
    pub content: String,
    pub uncertainty: f64,
    pub improvement: f64,
    pub completed_at: DateTime<Utc>,
}

impl CycleSummary {
    pub fn from_cycle(cycle: &LearningCycle) -> Self {
        Self {
            cycle_id: cycle.id.clone(),
            challenge_id: cycle.challenge.id.clone(),
            domain: cycle.challenge.domain,
            difficulty: cycle.challenge.difficulty,
            content: cycle.challenge.content.clone(),
            uncertainty: cycle.uncertainty,
            improvement: cycle.solver_improvement,
            completed_at: cycle.completed_at,
        }
    }

    /// `1 - uncertainty`.
    pub fn quality(&self) -> f64 {
        1.0 - self.uncertainty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub retained: usize,
}

/// Running counts of facts evicted by cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    pub total_archived: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_domain: BTreeMap<String, usize>,
}

impl ArchiveStats {
    fn record(&mut self, fact: &Fact) {
        self.total_archived += 1;
        *self.by_type.entry(fact.fact_type.clone()).or_insert(0) += 1;
        *self.by_domain.entry(fact.domain.clone()).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub current: usize,
    pub max_capacity: usize,
    pub needs_cleanup: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarChallenge {
    pub cycle_id: String,
    pub challenge_id: String,
    pub similarity: f64,
    pub uncertainty: f64,
    pub improvement: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTrend {
    Improving,
    Declining,
    Stable,
}

impl std::fmt::Display for QualityTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Improving => write!(f, "improving"),
            Self::Declining => write!(f, "declining"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityTrendReport {
    pub domain: Domain,
    pub trend: QualityTrend,
    pub samples: usize,
    pub first_half_mean: f64,
    pub second_half_mean: f64,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TemporalKnowledgeAgent {
    history: Vec<Fact>,
    max_history_size: usize,
    cleanup_threshold: usize,
    archive: ArchiveStats,
    cycles: VecDeque<CycleSummary>,
}

impl TemporalKnowledgeAgent {
    pub fn new(config: &KnowledgeConfig) -> Self {
        Self {
            history: Vec::new(),
            max_history_size: config.max_history_size,
            cleanup_threshold: config.cleanup_threshold,
            archive: ArchiveStats::default(),
            cycles: VecDeque::new(),
        }
    }

    /// Append facts, cleaning up if the history is now over threshold.
    pub fn add_facts(&mut self, facts: impl IntoIterator<Item = Fact>) -> Option<CleanupReport> {
        self.history.extend(facts);
        if self.history.len() > self.cleanup_threshold {
            Some(self.cleanup())
        } else {
            None
        }
    }

    /// Keep the `max_history_size` most recent facts by timestamp.
    pub fn cleanup(&mut self) -> CleanupReport {
        self.history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let archived = if self.history.len() > self.max_history_size {
            self.history.split_off(self.max_history_size)
        } else {
            Vec::new()
        };
        for fact in &archived {
            self.archive.record(fact);
        }

        let report = CleanupReport {
            removed: archived.len(),
            retained: self.history.len(),
        };
        tracing::debug!(
            removed = report.removed,
            retained = report.retained,
            "knowledge history cleaned up"
        );
        report
    }

    pub fn history(&self) -> &[Fact] {
        &self.history
    }

    pub fn archive_stats(&self) -> &ArchiveStats {
        &self.archive
    }

    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            current: self.history.len(),
            max_capacity: self.max_history_size,
            needs_cleanup: self.history.len() > self.cleanup_threshold,
        }
    }

    /// Remember a completed cycle. The ring holds at most
    /// `max_history_size` summaries.
    pub fn record_cycle(&mut self, cycle: &LearningCycle) {
        if self.max_history_size == 0 {
            return;
        }
        if self.cycles.len() == self.max_history_size {
            self.cycles.pop_front();
        }
        self.cycles.push_back(CycleSummary::from_cycle(cycle));
    }

    /// Up to `window` most recent summaries, oldest first.
    pub fn recent_cycles(&self, window: usize) -> Vec<CycleSummary> {
        let skip = self.cycles.len().saturating_sub(window);
        self.cycles.iter().skip(skip).cloned().collect()
    }

    pub fn cycle_count(&self) -> usize {
        self.cycles.len()
    }

    /// Same-domain past challenges among the last `window` cycles, most
    /// similar first.
    pub fn similar_challenges(&self, challenge: &Challenge, window: usize) -> Vec<SimilarChallenge> {
        let words = word_set(&challenge.content);
        let skip = self.cycles.len().saturating_sub(window);

        let mut similar: Vec<SimilarChallenge> = self
            .cycles
            .iter()
            .skip(skip)
            .filter(|summary| summary.domain == challenge.domain && summary.challenge_id != challenge.id)
            .map(|summary| {
                let content = jaccard(&words, &word_set(&summary.content));
                let gap = f64::from(summary.difficulty.rank().abs_diff(challenge.difficulty.rank()));
                SimilarChallenge {
                    cycle_id: summary.cycle_id.clone(),
                    challenge_id: summary.challenge_id.clone(),
                    similarity: 0.5 * content + 0.5 * (1.0 - gap / 3.0),
                    uncertainty: summary.uncertainty,
                    improvement: summary.improvement,
                }
            })
            .filter(|candidate| candidate.similarity >= MIN_SIMILARITY)
            .collect();

        similar.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        similar
    }

    /// Compare the first and second halves of the domain's recent quality
    /// series.
    pub fn quality_trend(&self, domain: Domain, window: usize) -> QualityTrendReport {
        let qualities: Vec<f64> = self
            .cycles
            .iter()
            .filter(|summary| summary.domain == domain)
            .map(CycleSummary::quality)
            .collect();
        let series = &qualities[qualities.len().saturating_sub(window)..];

        if series.len() < 2 {
            let mean = mean(series);
            return QualityTrendReport {
                domain,
                trend: QualityTrend::Stable,
                samples: series.len(),
                first_half_mean: mean,
                second_half_mean: mean,
            };
        }

        let (first, second) = series.split_at(series.len() / 2);
        let (first_half_mean, second_half_mean) = (mean(first), mean(second));
        let delta = second_half_mean - first_half_mean;
        let trend = if delta > TREND_BAND {
            QualityTrend::Improving
        } else if delta < -TREND_BAND {
            QualityTrend::Declining
        } else {
            QualityTrend::Stable
        };

        QualityTrendReport {
            domain,
            trend,
            samples: series.len(),
            first_half_mean,
            second_half_mean,
        }
    }

    /// How strongly `challenge` continues recent same-domain learning, in
    /// [0, 1].
    pub fn learning_continuity(&self, challenge: &Challenge, recent_learnings: &[CycleSummary]) -> f64 {
        let score: f64 = recent_learnings
            .iter()
            .filter(|summary| summary.domain == challenge.domain && summary.challenge_id != challenge.id)
            .map(|summary| {
                if summary.improvement > STRONG_IMPROVEMENT {
                    CONTINUITY_PER_LEARNING + CONTINUITY_STRONG_BONUS
                } else {
                    CONTINUITY_PER_LEARNING
                }
            })
            .sum();
        clamp_unit(score)
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
