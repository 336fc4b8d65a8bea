//! Atomic fact extraction from completed learning cycles.
//!
//! Each cycle is decomposed into a fixed set of small facts: three about the
//! challenge, three per solution attempt and three about the outcome. Every
//! fact carries the cycle's completion time and a source tag naming the rule
//! that produced it.

use crate::knowledge::types::*;
use crate::learning::LearningCycle;

/// Floor applied to execution time before dividing by it.
const MIN_EXECUTION_SECS: f64 = 0.1;

/// Floor applied to uncertainty before dividing by it.
const MIN_UNCERTAINTY: f64 = 0.1;

pub const CHALLENGE_SOURCE: &str = "challenge_extraction";
pub const SOLUTION_SOURCE: &str = "solution_extraction";
pub const OUTCOME_SOURCE: &str = "outcome_extraction";

/// Stateless extractor. Output is deterministic apart from fresh fact ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicFactsEngine;

impl AtomicFactsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Decompose a cycle into `6 + 3 × attempts` facts, challenge facts
    /// first, then per-attempt facts in attempt order, then outcome facts.
    pub fn extract(&self, cycle: &LearningCycle) -> Vec<Fact> {
        let challenge = &cycle.challenge;
        let domain = challenge.domain.to_string();
        let at = cycle.completed_at;
        let key = challenge.id.as_str();

        let mut facts = Vec::with_capacity(6 + cycle.attempts.len() * 3);

        facts.push(
            Fact::new(CHALLENGE_DOMAIN, domain.as_str(), &domain, at, CHALLENGE_SOURCE)
                .with_challenge_key(key),
        );
        facts.push(
            Fact::new(
                CHALLENGE_DIFFICULTY,
                challenge.difficulty.to_string(),
                &domain,
                at,
                CHALLENGE_SOURCE,
            )
            .with_challenge_key(key),
        );
        facts.push(
            Fact::new(
                CHALLENGE_COMPLEXITY,
                challenge.word_count() as f64,
                &domain,
                at,
                CHALLENGE_SOURCE,
            )
            .with_challenge_key(key),
        );

        for attempt in &cycle.attempts {
            let efficiency = attempt.confidence / attempt.execution_time_secs.max(MIN_EXECUTION_SECS);
            facts.push(
                Fact::new(SOLUTION_AGENT, attempt.agent_label.as_str(), &domain, at, SOLUTION_SOURCE)
                    .with_challenge_key(key)
                    .with_confidence(attempt.confidence),
            );
            facts.push(
                Fact::new(SOLUTION_CONFIDENCE, attempt.confidence, &domain, at, SOLUTION_SOURCE)
                    .with_challenge_key(key)
                    .with_confidence(attempt.confidence),
            );
            facts.push(
                Fact::new(SOLUTION_EFFICIENCY, efficiency, &domain, at, SOLUTION_SOURCE)
                    .with_challenge_key(key)
                    .with_confidence(attempt.confidence),
            );
        }

        // Outcome facts are as trustworthy as the cycle was certain.
        let outcome_confidence = 1.0 - cycle.uncertainty;
        let learning_efficiency = cycle.solver_improvement / cycle.uncertainty.max(MIN_UNCERTAINTY);
        for (fact_type, value) in [
            (LEARNING_IMPROVEMENT, cycle.solver_improvement),
            (LEARNING_UNCERTAINTY, cycle.uncertainty),
            (LEARNING_EFFICIENCY, learning_efficiency),
        ] {
            facts.push(
                Fact::new(fact_type, value, &domain, at, OUTCOME_SOURCE)
                    .with_challenge_key(key)
                    .with_confidence(outcome_confidence),
            );
        }

        facts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::{Challenge, Difficulty, Domain, SolutionAttempt};

    use chrono::Utc;

    fn cycle_with(attempts: Vec<SolutionAttempt>) -> LearningCycle {
        let challenge = Challenge::new(
            Domain::Programming,
            Difficulty::Advanced,
            "Reverse a linked list in place",
        );
        LearningCycle {
            id: "cycle-1".into(),
            challenge,
            attempts,
            uncertainty: 0.05,
            challenger_reward: 0.55,
            solver_improvement: 0.08,
            safety_validated: true,
            completed_at: Utc::now(),
        }
    }

    fn value_of<'a>(facts: &'a [Fact], fact_type: &str) -> &'a FactValue {
        &facts
            .iter()
            .find(|fact| fact.fact_type == fact_type)
            .unwrap()
            .value
    }

    #[test]
    fn emits_six_plus_three_per_attempt() {
        let attempts = vec![
            SolutionAttempt::new("c", "a", "x", 0.8, 1.0),
            SolutionAttempt::new("c", "b", "y", 0.6, 2.0),
        ];
        let facts = AtomicFactsEngine::new().extract(&cycle_with(attempts));
        assert_eq!(facts.len(), 12);
        assert!(AtomicFactsEngine::new().extract(&cycle_with(Vec::new())).len() == 6);
    }

    #[test]
    fn challenge_facts_describe_the_challenge() {
        let cycle = cycle_with(Vec::new());
        let facts = AtomicFactsEngine::new().extract(&cycle);

        assert_eq!(value_of(&facts, CHALLENGE_DOMAIN), &FactValue::from("PROGRAMMING"));
        assert_eq!(value_of(&facts, CHALLENGE_DIFFICULTY), &FactValue::from("advanced"));
        assert_eq!(value_of(&facts, CHALLENGE_COMPLEXITY), &FactValue::Number(6.0));
        assert!(facts.iter().all(|fact| fact.timestamp == cycle.completed_at));
        assert!(
            facts
                .iter()
                .all(|fact| fact.challenge_key.as_deref() == Some(cycle.challenge.id.as_str()))
        );
    }

    #[test]
    fn efficiency_floors_execution_time() {
        let attempts = vec![SolutionAttempt::new("c", "instant", "x", 0.5, 0.0)];
        let facts = AtomicFactsEngine::new().extract(&cycle_with(attempts));
        let efficiency = value_of(&facts, SOLUTION_EFFICIENCY).as_number().unwrap();
        assert!((efficiency - 5.0).abs() < 1e-9);
    }

    #[test]
    fn learning_efficiency_floors_uncertainty() {
        let facts = AtomicFactsEngine::new().extract(&cycle_with(Vec::new()));
        // 0.08 / max(0.05, 0.1)
        let efficiency = value_of(&facts, LEARNING_EFFICIENCY).as_number().unwrap();
        assert!((efficiency - 0.8).abs() < 1e-9);
    }

    #[test]
    fn sources_name_the_extraction_rule() {
        let attempts = vec![SolutionAttempt::new("c", "a", "x", 0.8, 1.0)];
        let facts = AtomicFactsEngine::new().extract(&cycle_with(attempts));
        let sources: Vec<_> = facts.iter().map(|fact| fact.source.as_str()).collect();
        assert_eq!(
            sources,
            vec![
                CHALLENGE_SOURCE,
                CHALLENGE_SOURCE,
                CHALLENGE_SOURCE,
                SOLUTION_SOURCE,
                SOLUTION_SOURCE,
                SOLUTION_SOURCE,
                OUTCOME_SOURCE,
                OUTCOME_SOURCE,
                OUTCOME_SOURCE,
            ]
        );
    }
}
