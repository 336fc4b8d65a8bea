//! Temporal knowledge pipeline: digests completed cycles into the fact store.
//!
//! Per cycle, in order: extract atomic facts, snapshot the active knowledge,
//! resolve entities, store, retire merge sources, find contradictions
//! against the snapshot, expire superseded facts, and hand the stored facts
//! to the knowledge agent. Expired facts leave the entity registry at once.
//! When the agent cleans up, the store and registry are cut back to what it
//! still remembers.

use crate::knowledge::agent::{CleanupReport, MemoryStats, TemporalKnowledgeAgent};
use crate::knowledge::base::{EvolvingKnowledgeBase, TimelineBucket};
use crate::knowledge::facts::AtomicFactsEngine;
use crate::knowledge::invalidation::{InvalidationSummary, TemporalInvalidationEngine};
use crate::knowledge::resolution::EntityResolutionEngine;
use crate::knowledge::types::Fact;
use crate::knowledge::KnowledgeConfig;
use crate::learning::LearningCycle;

use chrono::Utc;
use serde::Serialize;

use std::collections::HashSet;

/// Result of digesting one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestReport {
    pub cycle_id: String,
    pub extracted: usize,
    pub resolved: usize,
    pub merged: usize,
    pub contradictions: usize,
    pub expired: usize,
    pub cleanup: Option<CleanupReport>,
}

#[derive(Debug, Clone)]
pub struct TemporalKnowledgePipeline {
    config: KnowledgeConfig,
    extractor: AtomicFactsEngine,
    resolution: EntityResolutionEngine,
    invalidation: TemporalInvalidationEngine,
    base: EvolvingKnowledgeBase,
    agent: TemporalKnowledgeAgent,
}

impl TemporalKnowledgePipeline {
    pub fn new(config: KnowledgeConfig) -> Self {
        Self {
            extractor: AtomicFactsEngine::new(),
            resolution: EntityResolutionEngine::new(&config),
            invalidation: TemporalInvalidationEngine::new(&config),
            base: EvolvingKnowledgeBase::new(),
            agent: TemporalKnowledgeAgent::new(&config),
            config,
        }
    }

    pub fn digest(&mut self, cycle: &LearningCycle) -> DigestReport {
        let extracted = self.extractor.extract(cycle);
        let extracted_count = extracted.len();

        // Taken before this cycle's facts touch the registry or the store.
        let snapshot: Vec<Fact> = self.base.active_facts().cloned().collect();

        let resolved = self.resolution.resolve(extracted);
        let merged_away: HashSet<String> = resolved
            .iter()
            .flat_map(|fact| fact.merged_from.iter().cloned())
            .collect();
        let merged = resolved.iter().filter(|fact| !fact.merged_from.is_empty()).count();

        let stored = self.base.store(resolved);
        for fact_id in &merged_away {
            self.base.retire(fact_id);
        }

        // Merge sources are superseded already; checking a merged fact
        // against them would only rediscover the merge.
        let comparable: Vec<Fact> = snapshot
            .into_iter()
            .filter(|fact| !merged_away.contains(&fact.fact_id))
            .collect();
        let contradictions = self.invalidation.find_contradictions(&stored, &comparable);

        let now = Utc::now();
        let mut expired_ids = HashSet::new();
        for contradiction in &contradictions {
            if !contradiction.kind.supersedes()
                || !expired_ids.insert(contradiction.old_fact.fact_id.clone())
            {
                continue;
            }
            self.invalidation.mark_expired(
                &contradiction.old_fact,
                contradiction.kind.to_string(),
                now,
                Some(&contradiction.new_fact),
            );
            self.base.retire(&contradiction.old_fact.fact_id);
            self.resolution.forget(&contradiction.old_fact.fact_id);
        }

        let resolved_count = stored.len();
        let cleanup = self.agent.add_facts(stored);
        if cleanup.is_some() {
            self.prune_to_agent_history();
        }
        self.agent.record_cycle(cycle);

        let report = DigestReport {
            cycle_id: cycle.id.clone(),
            extracted: extracted_count,
            resolved: resolved_count,
            merged,
            contradictions: contradictions.len(),
            expired: expired_ids.len(),
            cleanup,
        };
        tracing::debug!(
            cycle_id = %report.cycle_id,
            extracted = report.extracted,
            merged = report.merged,
            contradictions = report.contradictions,
            expired = report.expired,
            "cycle digested"
        );
        report
    }

    /// Evict everything the agent no longer remembers from the store and
    /// the entity registry, along with facts already retired.
    fn prune_to_agent_history(&mut self) {
        let retained: HashSet<&str> = self
            .agent
            .history()
            .iter()
            .map(|fact| fact.fact_id.as_str())
            .collect();
        let pruned = self.base.prune(|fact| retained.contains(fact.fact_id.as_str()));
        let forgotten = self
            .resolution
            .retain(|fact| retained.contains(fact.fact_id.as_str()));
        tracing::debug!(pruned, forgotten, "knowledge store pruned");
    }

    pub fn query(
        &self,
        fact_type: Option<&str>,
        domain: Option<&str>,
        challenge_key: Option<&str>,
    ) -> Vec<Fact> {
        self.base.query(fact_type, domain, challenge_key)
    }

    pub fn timeline(&self, domain: Option<&str>) -> Vec<TimelineBucket> {
        self.base.timeline(domain)
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.agent.memory_stats()
    }

    pub fn invalidation_summary(&self) -> InvalidationSummary {
        self.invalidation.invalidation_summary()
    }

    pub fn config(&self) -> &KnowledgeConfig {
        &self.config
    }

    pub fn knowledge_base(&self) -> &EvolvingKnowledgeBase {
        &self.base
    }

    pub fn agent(&self) -> &TemporalKnowledgeAgent {
        &self.agent
    }

    pub fn resolution(&self) -> &EntityResolutionEngine {
        &self.resolution
    }

    pub fn invalidation(&self) -> &TemporalInvalidationEngine {
        &self.invalidation
    }
}

impl Default for TemporalKnowledgePipeline {
    fn default() -> Self {
        Self::new(KnowledgeConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::{CHALLENGE_DOMAIN, SOLUTION_AGENT, SOLUTION_CONFIDENCE};
    use crate::learning::{Challenge, Difficulty, Domain, SolutionAttempt};

    use chrono::Duration;

    fn cycle(challenge: Challenge, confidences: &[f64]) -> LearningCycle {
        let attempts = confidences
            .iter()
            .enumerate()
            .map(|(i, &confidence)| {
                SolutionAttempt::new(&challenge.id, format!("strategy_{i}"), "answer", confidence, 1.0)
            })
            .collect();
        LearningCycle {
            id: uuid::Uuid::new_v4().to_string(),
            challenge,
            attempts,
            uncertainty: 0.4,
            challenger_reward: 0.9,
            solver_improvement: 0.05,
            safety_validated: true,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn first_digest_stores_every_fact() {
        let mut pipeline = TemporalKnowledgePipeline::default();
        let challenge = Challenge::new(Domain::Programming, Difficulty::Beginner, "write fizzbuzz");
        let report = pipeline.digest(&cycle(challenge, &[0.8, 0.6]));

        assert_eq!(report.extracted, 12);
        assert_eq!(report.contradictions, 0);
        assert_eq!(report.expired, 0);
        assert_eq!(pipeline.knowledge_base().len(), report.resolved);
        assert_eq!(pipeline.memory_stats().current, report.resolved);
        assert_eq!(pipeline.agent().cycle_count(), 1);
    }

    #[test]
    fn repeated_domain_facts_merge_and_retire_the_source() {
        let mut pipeline = TemporalKnowledgePipeline::default();
        let first = Challenge::new(Domain::Reasoning, Difficulty::Beginner, "puzzle one");
        let second = Challenge::new(Domain::Reasoning, Difficulty::Beginner, "puzzle two");
        pipeline.digest(&cycle(first, &[]));
        let report = pipeline.digest(&cycle(second.clone(), &[]));

        assert!(report.merged >= 1);
        let domain_facts = pipeline.query(Some(CHALLENGE_DOMAIN), Some("REASONING"), None);
        assert_eq!(domain_facts.len(), 1);
        assert_eq!(domain_facts[0].merged_from.len(), 2);
        assert_eq!(domain_facts[0].challenge_key.as_deref(), Some(second.id.as_str()));
    }

    #[test]
    fn newer_confidence_for_same_challenge_expires_the_old_fact() {
        let mut pipeline = TemporalKnowledgePipeline::default();
        let challenge = Challenge::new(Domain::Analysis, Difficulty::Advanced, "assess the plan");

        let mut earlier = cycle(challenge.clone(), &[0.7]);
        earlier.completed_at = Utc::now() - Duration::hours(1);
        pipeline.digest(&earlier);
        let report = pipeline.digest(&cycle(challenge.clone(), &[0.15]));

        assert!(report.contradictions >= 1);
        assert!(report.expired >= 1);

        let active = pipeline.query(Some(SOLUTION_CONFIDENCE), None, Some(&challenge.id));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].value.as_number(), Some(0.15));

        let summary = pipeline.invalidation_summary();
        assert!(summary.total_expired >= 1);
        assert_eq!(summary.total_expired, summary.total_replacements);
        assert!(summary.reasons.contains_key("temporal_supersession"));
    }

    #[test]
    fn timeline_tracks_digested_domains() {
        let mut pipeline = TemporalKnowledgePipeline::default();
        pipeline.digest(&cycle(
            Challenge::new(Domain::Safety, Difficulty::Beginner, "a"),
            &[0.5],
        ));
        pipeline.digest(&cycle(
            Challenge::new(Domain::Metacognitive, Difficulty::Beginner, "b"),
            &[0.5],
        ));

        let timeline = pipeline.timeline(None);
        assert!(!timeline.is_empty());
        let domains: HashSet<_> = timeline
            .iter()
            .flat_map(|bucket| bucket.domains.iter().cloned())
            .collect();
        assert!(domains.contains("SAFETY"));
        assert!(domains.contains("METACOGNITIVE"));
        assert!(pipeline.timeline(Some("PROGRAMMING")).is_empty());
    }

    fn labelled_cycle(challenge: &Challenge, label: &str, completed_at: chrono::DateTime<Utc>) -> LearningCycle {
        LearningCycle {
            id: uuid::Uuid::new_v4().to_string(),
            attempts: vec![SolutionAttempt::new(&challenge.id, label, "answer", 0.6, 1.0)],
            challenge: challenge.clone(),
            uncertainty: 0.4,
            challenger_reward: 0.9,
            solver_improvement: 0.05,
            safety_validated: true,
            completed_at,
        }
    }

    #[test]
    fn superseded_facts_stay_superseded() {
        let mut pipeline = TemporalKnowledgePipeline::default();
        let challenge = Challenge::new(Domain::Reasoning, Difficulty::Intermediate, "order the steps");
        let now = Utc::now();

        pipeline.digest(&labelled_cycle(&challenge, "step_by_step", now - Duration::hours(2)));
        pipeline.digest(&labelled_cycle(&challenge, "critical_review", now - Duration::hours(1)));
        let expired_labels = |pipeline: &TemporalKnowledgePipeline| -> Vec<String> {
            pipeline
                .invalidation()
                .expired()
                .iter()
                .filter(|expired| expired.original.fact_type == SOLUTION_AGENT)
                .map(|expired| expired.original.value.to_string())
                .collect()
        };
        assert_eq!(expired_labels(&pipeline), vec!["step_by_step".to_string()]);

        // Close enough to the expired label to have merged with it.
        let report = pipeline.digest(&labelled_cycle(&challenge, "step_by_steps", now));
        let agents = pipeline.query(Some(SOLUTION_AGENT), None, Some(&challenge.id));
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].value.to_string(), "step_by_steps");
        assert!(agents[0].merged_from.is_empty());
        assert!(report.expired >= 1);
        assert_eq!(
            expired_labels(&pipeline),
            vec!["step_by_step".to_string(), "critical_review".to_string()]
        );
    }

    #[test]
    fn long_runs_stay_within_capacity() {
        let config = KnowledgeConfig {
            max_history_size: 20,
            cleanup_threshold: 30,
            ..KnowledgeConfig::default()
        };
        let mut pipeline = TemporalKnowledgePipeline::new(config);
        let per_cycle = 6 + 3 * 3;

        let mut stored = 0;
        let mut cleanups = 0;
        for round in 0..200 {
            let challenge = Challenge::new(Domain::ALL[round % 6], Difficulty::Beginner, format!("task {round}"));
            let offset = round as f64 / 1000.0;
            let report = pipeline.digest(&cycle(challenge, &[0.2 + offset, 0.5 + offset, 0.7]));
            stored += report.resolved;
            cleanups += usize::from(report.cleanup.is_some());

            assert!(pipeline.knowledge_base().len() <= 30 + per_cycle);
            assert!(pipeline.resolution().entity_count() <= 30 + per_cycle);
            assert!(pipeline.agent().history().len() <= 30 + per_cycle);
        }

        assert!(cleanups > 0);
        let timeline_total: usize = pipeline.timeline(None).iter().map(|bucket| bucket.fact_count).sum();
        assert_eq!(timeline_total, stored);
    }
}
