//! Temporal invalidation: contradiction detection and fact expiry.
//!
//! Existing facts are indexed by their (type, domain, challenge-key) triple,
//! so each new fact is compared only against facts sharing its key. Any
//! value difference under the same key is a contradiction. Confidence facts
//! additionally carry a numeric-divergence flag when their values are far
//! apart. Each contradiction is classified by which side, if any, wins.

use crate::knowledge::KnowledgeConfig;
use crate::knowledge::types::{
    Contradiction, ContradictionKind, ExpiredFact, Fact, FactKey, SOLUTION_CONFIDENCE,
};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Audit entry linking an expired fact to the fact that replaced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Replacement {
    pub invalidation_id: String,
    pub old_fact_id: String,
    pub new_fact_id: String,
    pub replaced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidationSummary {
    pub total_expired: usize,
    pub total_replacements: usize,
    pub recently_expired: usize,
    pub reasons: BTreeMap<String, usize>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TemporalInvalidationEngine {
    max_contradictions: usize,
    confidence_divergence: f64,
    recent_window: Duration,
    expired: Vec<ExpiredFact>,
    replacements: Vec<Replacement>,
}

impl TemporalInvalidationEngine {
    pub fn new(config: &KnowledgeConfig) -> Self {
        Self {
            max_contradictions: config.max_contradictions,
            confidence_divergence: config.confidence_divergence,
            recent_window: Duration::days(config.recent_expiry_days),
            expired: Vec::new(),
            replacements: Vec::new(),
        }
    }

    /// Find contradictions between `new_facts` and a snapshot of existing
    /// facts.
    ///
    /// Search stops once the configured cap is reached. A new fact is never
    /// paired with itself or with a fact it was merged from.
    pub fn find_contradictions(
        &self,
        new_facts: &[Fact],
        existing_facts: &[Fact],
    ) -> Vec<Contradiction> {
        let mut index: HashMap<FactKey, Vec<&Fact>> = HashMap::new();
        for fact in existing_facts {
            index.entry(fact.contradiction_key()).or_default().push(fact);
        }

        let detected_at = Utc::now();
        let mut contradictions = Vec::new();

        'search: for new_fact in new_facts {
            let Some(candidates) = index.get(&new_fact.contradiction_key()) else {
                continue;
            };
            for old_fact in candidates {
                if old_fact.fact_id == new_fact.fact_id
                    || new_fact.merged_from.contains(&old_fact.fact_id)
                {
                    continue;
                }

                let numeric_divergence = self.numerically_divergent(new_fact, old_fact);
                if new_fact.value == old_fact.value && !numeric_divergence {
                    continue;
                }

                contradictions.push(Contradiction {
                    new_fact: new_fact.clone(),
                    old_fact: (*old_fact).clone(),
                    kind: classify(new_fact, old_fact),
                    new_confidence: new_fact.confidence,
                    old_confidence: old_fact.confidence,
                    numeric_divergence,
                    detected_at,
                });

                if contradictions.len() >= self.max_contradictions {
                    tracing::warn!(
                        cap = self.max_contradictions,
                        "contradiction search capped, stopping early"
                    );
                    break 'search;
                }
            }
        }

        contradictions
    }

    /// Record `fact` as expired, optionally linking its replacement.
    pub fn mark_expired(
        &mut self,
        fact: &Fact,
        reason: impl Into<String>,
        when: DateTime<Utc>,
        replacement: Option<&Fact>,
    ) -> &ExpiredFact {
        let invalidation_id = uuid::Uuid::new_v4().to_string();

        if let Some(replacement) = replacement {
            self.replacements.push(Replacement {
                invalidation_id: invalidation_id.clone(),
                old_fact_id: fact.fact_id.clone(),
                new_fact_id: replacement.fact_id.clone(),
                replaced_at: when,
            });
        }

        self.expired.push(ExpiredFact {
            invalidation_id,
            original: fact.clone(),
            expired_at: when,
            reason: reason.into(),
            replacement: replacement.cloned(),
        });
        &self.expired[self.expired.len() - 1]
    }

    pub fn expired(&self) -> &[ExpiredFact] {
        &self.expired
    }

    pub fn replacements(&self) -> &[Replacement] {
        &self.replacements
    }

    pub fn invalidation_summary(&self) -> InvalidationSummary {
        self.invalidation_summary_at(Utc::now())
    }

    /// Summary with the recency window measured back from `now`.
    pub fn invalidation_summary_at(&self, now: DateTime<Utc>) -> InvalidationSummary {
        let cutoff = now - self.recent_window;
        let mut reasons = BTreeMap::new();
        for expired in &self.expired {
            *reasons.entry(expired.reason.clone()).or_insert(0) += 1;
        }

        InvalidationSummary {
            total_expired: self.expired.len(),
            total_replacements: self.replacements.len(),
            recently_expired: self
                .expired
                .iter()
                .filter(|expired| expired.expired_at >= cutoff)
                .count(),
            reasons,
        }
    }

    fn numerically_divergent(&self, new_fact: &Fact, old_fact: &Fact) -> bool {
        if new_fact.fact_type != SOLUTION_CONFIDENCE
            || old_fact.fact_type != SOLUTION_CONFIDENCE
            || new_fact.challenge_key != old_fact.challenge_key
        {
            return false;
        }
        match (new_fact.value.as_number(), old_fact.value.as_number()) {
            (Some(new_value), Some(old_value)) => {
                (new_value - old_value).abs() > self.confidence_divergence
            }
            _ => false,
        }
    }
}

/// Newer wins first, then more confident; otherwise the evidence conflicts.
fn classify(new_fact: &Fact, old_fact: &Fact) -> ContradictionKind {
    if new_fact.timestamp > old_fact.timestamp {
        ContradictionKind::TemporalSupersession
    } else if new_fact.confidence > old_fact.confidence {
        ContradictionKind::ConfidenceSupersession
    } else {
        ContradictionKind::ConflictingEvidence
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
