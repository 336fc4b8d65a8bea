//! Learning cycle orchestrator.
//!
//! One call to [`LearningOrchestrator::run_cycle`] walks the fixed sequence
//! generate, validate, solve, filter, score, reward, learn, record, adapt
//! and digest. Collaborator failures and timeouts are logged and replaced
//! with safe defaults so every cycle reaches the digest step; only a cycle
//! that cannot be assembled is reported to the caller.

use crate::config::EngineConfig;
use crate::knowledge::{Fact, MemoryStats, TemporalKnowledgePipeline, TimelineBucket};
use crate::learning::advantage::AdvantageOptimizer;
use crate::learning::analysis::{self, AnalysisContext, AnalysisResults, CurriculumSnapshot};
use crate::learning::collaborators::{ChallengeGenerator, SafetyPolicy, SafetyVerdict};
use crate::learning::curriculum::{CurriculumController, DomainPerformance};
use crate::learning::quality;
use crate::learning::{
    Challenge, Difficulty, Domain, EvolutionDirection, LearningConfig, LearningCycle,
    LearningError, SolutionAttempt,
};

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Snapshot of the orchestrator's recent behaviour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub current_domain: Domain,
    /// Difficulty the next cycle will run at, in `current_domain`.
    pub current_difficulty: Difficulty,
    /// Curriculum-wide level, used for domains without performance history.
    pub global_difficulty: Difficulty,
    pub total_cycles: usize,
    pub recent_uncertainty: Vec<f64>,
    pub recent_rewards: Vec<f64>,
    pub recent_improvements: Vec<f64>,
    pub evolution_direction: EvolutionDirection,
    pub domain_performance: BTreeMap<Domain, DomainPerformance>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct LearningOrchestrator<G, P> {
    config: LearningConfig,
    generator: G,
    safety: P,
    curriculum: CurriculumController,
    optimizer: AdvantageOptimizer,
    knowledge: Arc<RwLock<TemporalKnowledgePipeline>>,
    current_domain: Domain,
    challenge_context: String,
    history: VecDeque<LearningCycle>,
    total_cycles: usize,
    call_timeout: Duration,
}

impl<G, P> LearningOrchestrator<G, P>
where
    G: ChallengeGenerator,
    P: SafetyPolicy,
{
    /// Build an orchestrator with its own knowledge pipeline.
    pub fn new(config: &EngineConfig, generator: G, safety: P) -> Self {
        let knowledge = Arc::new(RwLock::new(TemporalKnowledgePipeline::new(
            config.knowledge.clone(),
        )));
        Self::with_shared_knowledge(config.learning.clone(), generator, safety, knowledge)
    }

    /// Build an orchestrator that digests into an existing pipeline. Writers
    /// sharing a pipeline are serialized by its lock.
    pub fn with_shared_knowledge(
        config: LearningConfig,
        generator: G,
        safety: P,
        knowledge: Arc<RwLock<TemporalKnowledgePipeline>>,
    ) -> Self {
        Self {
            curriculum: CurriculumController::new(&config),
            optimizer: AdvantageOptimizer::new(&config),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            generator,
            safety,
            knowledge,
            current_domain: Domain::ALL[0],
            challenge_context: String::new(),
            history: VecDeque::new(),
            total_cycles: 0,
            config,
        }
    }

    /// Advance the state machine by one full cycle.
    ///
    /// Returns [`LearningError::Integrity`] if the cycle record cannot be
    /// assembled; nothing is recorded or digested in that case.
    pub async fn run_cycle(&mut self) -> Result<LearningCycle, LearningError> {
        let domain = self.current_domain;
        let difficulty = self.curriculum.difficulty_for(domain);

        let challenge = self.generate_challenge(domain, difficulty).await;
        let (challenge, safety_validated) = self.validate_challenge(challenge).await;

        let attempts = self.solve(&challenge).await;
        let filtered = quality::filter_by_mean_confidence(&attempts);
        let attempts = if filtered.is_empty() { attempts } else { filtered };

        let uncertainty = quality::uncertainty(&attempts);
        let challenger_reward = quality::challenger_reward(uncertainty);
        let solver_improvement = self.learn(&challenge, &attempts, uncertainty).await;

        let cycle = assemble_cycle(
            challenge,
            attempts,
            uncertainty,
            challenger_reward,
            solver_improvement,
            safety_validated,
        )?;
        self.record(cycle.clone());

        self.evolve_and_adapt(&cycle).await;

        let report = self.knowledge.write().await.digest(&cycle);
        tracing::info!(
            cycle_id = %cycle.id,
            domain = %cycle.challenge.domain,
            difficulty = %cycle.challenge.difficulty,
            uncertainty = cycle.uncertainty,
            reward = cycle.challenger_reward,
            facts = report.resolved,
            "learning cycle completed"
        );
        Ok(cycle)
    }

    pub fn get_statistics(&self) -> Statistics {
        let skip = self.history.len().saturating_sub(self.config.statistics_window);
        let recent: Vec<&LearningCycle> = self.history.iter().skip(skip).collect();

        Statistics {
            current_domain: self.current_domain,
            current_difficulty: self.curriculum.difficulty_for(self.current_domain),
            global_difficulty: self.curriculum.current_difficulty(),
            total_cycles: self.total_cycles,
            recent_uncertainty: recent.iter().map(|cycle| cycle.uncertainty).collect(),
            recent_rewards: recent.iter().map(|cycle| cycle.challenger_reward).collect(),
            recent_improvements: recent.iter().map(|cycle| cycle.solver_improvement).collect(),
            evolution_direction: self.optimizer.evolution_direction(),
            domain_performance: self.domain_performance_snapshot(),
        }
    }

    /// Run the post-cycle analyses concurrently over the latest cycle.
    pub async fn run_analyses(&self) -> AnalysisResults {
        analysis::run_analyses(AnalysisContext {
            knowledge: self.knowledge.clone(),
            last_cycle: self.history.back().cloned(),
            curriculum: CurriculumSnapshot {
                current_difficulty: self.curriculum.difficulty_for(self.current_domain),
                global_difficulty: self.curriculum.current_difficulty(),
                changes: self.curriculum.history().copied().collect(),
                evolution_direction: self.optimizer.evolution_direction(),
                domain_performance: self.domain_performance_snapshot(),
            },
        })
        .await
    }

    pub async fn query(
        &self,
        fact_type: Option<&str>,
        domain: Option<&str>,
        challenge_key: Option<&str>,
    ) -> Vec<Fact> {
        self.knowledge.read().await.query(fact_type, domain, challenge_key)
    }

    pub async fn timeline(&self, domain: Option<&str>) -> Vec<TimelineBucket> {
        self.knowledge.read().await.timeline(domain)
    }

    pub async fn memory_stats(&self) -> MemoryStats {
        self.knowledge.read().await.memory_stats()
    }

    /// Shared handle to the knowledge pipeline.
    pub fn knowledge(&self) -> Arc<RwLock<TemporalKnowledgePipeline>> {
        self.knowledge.clone()
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn current_domain(&self) -> Domain {
        self.current_domain
    }

    pub fn curriculum(&self) -> &CurriculumController {
        &self.curriculum
    }

    pub fn optimizer(&self) -> &AdvantageOptimizer {
        &self.optimizer
    }

    /// Retained cycles, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &LearningCycle> {
        self.history.iter()
    }

    pub fn last_cycle(&self) -> Option<&LearningCycle> {
        self.history.back()
    }

    // -- stages ------------------------------------------------------------

    async fn generate_challenge(&self, domain: Domain, difficulty: Difficulty) -> Challenge {
        let text = bounded(
            self.call_timeout,
            "challenge",
            self.generator
                .generate_challenge_text(domain, difficulty, &self.challenge_context),
        )
        .await;

        match text {
            Ok(text) if !text.trim().is_empty() => Challenge::new(domain, difficulty, text),
            Ok(_) => {
                tracing::warn!(%domain, "challenge backend returned empty text, using fallback");
                Challenge::fallback(domain, difficulty)
            }
            Err(error) => {
                tracing::warn!(%error, %domain, "challenge generation failed, using fallback");
                Challenge::fallback(domain, difficulty)
            }
        }
    }

    /// Returns the challenge to solve and whether it passed validation.
    async fn validate_challenge(&self, challenge: Challenge) -> (Challenge, bool) {
        let verdict = self.review(&challenge).await;
        if verdict.is_safe {
            return (challenge, true);
        }

        tracing::info!(
            challenge_id = %challenge.id,
            reason = %verdict.reason,
            "challenge rejected, deriving safe alternative"
        );
        let alternative = self.safety.derive_safe_alternative(&challenge);
        let validated = self.review(&alternative).await.is_safe;
        (alternative, validated)
    }

    async fn review(&self, challenge: &Challenge) -> SafetyVerdict {
        match tokio::time::timeout(self.call_timeout, self.safety.validate(challenge)).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(error)) => {
                let error = LearningError::Safety(error.to_string());
                tracing::warn!(%error, "treating failed safety check as rejection");
                SafetyVerdict::rejected(error.to_string())
            }
            Err(_elapsed) => {
                let error = LearningError::Timeout {
                    stage: "safety",
                    timeout_ms: self.config.call_timeout_ms,
                };
                tracing::warn!(%error, "treating timed-out safety check as rejection");
                SafetyVerdict::rejected(error.to_string())
            }
        }
    }

    /// Query every strategy concurrently and keep the ones that answered.
    async fn solve(&self, challenge: &Challenge) -> Vec<SolutionAttempt> {
        let limit = self.call_timeout;
        let generator = &self.generator;
        let calls: Vec<_> = self
            .config
            .strategies
            .iter()
            .map(move |label| async move {
                let started = Instant::now();
                let draft = bounded(limit, "solve", generator.generate_solution(challenge, label)).await;
                (label, draft, started.elapsed())
            })
            .collect();

        join_all(calls)
            .await
            .into_iter()
            .filter_map(|(label, draft, elapsed)| match draft {
                Ok(draft) => Some(SolutionAttempt::new(
                    &challenge.id,
                    label,
                    draft.text,
                    draft.confidence,
                    elapsed.as_secs_f64(),
                )),
                Err(error) => {
                    tracing::warn!(%error, strategy = %label, "solver strategy skipped");
                    None
                }
            })
            .collect()
    }

    /// Solver improvement for the cycle; zero outside the informative band.
    async fn learn(
        &self,
        challenge: &Challenge,
        attempts: &[SolutionAttempt],
        uncertainty: f64,
    ) -> f64 {
        if uncertainty < self.config.low_threshold || uncertainty > self.config.high_threshold {
            return 0.0;
        }

        let best = attempts
            .iter()
            .map(|attempt| attempt.confidence)
            .fold(0.0, f64::max);
        let prompt = format!(
            "Extract a lesson from {} challenge {} (uncertainty {uncertainty:.3}, best confidence {best:.3}).",
            challenge.domain, challenge.id
        );

        match bounded(
            self.call_timeout,
            "learn",
            self.generator.generate_evolution_guidance(&prompt),
        )
        .await
        {
            Ok(_) => best * self.config.improvement_scale,
            Err(error) => {
                tracing::warn!(%error, challenge_id = %challenge.id, "learning step failed");
                0.0
            }
        }
    }

    fn record(&mut self, cycle: LearningCycle) {
        self.history.push_back(cycle);
        while self.history.len() > self.config.cycle_history_cap.max(1) {
            self.history.pop_front();
        }
        self.total_cycles += 1;
    }

    /// Feed the outcome back to the generators, move the curriculum and
    /// rotate to the next domain.
    async fn evolve_and_adapt(&mut self, cycle: &LearningCycle) {
        let domain = cycle.challenge.domain;
        let advantage = self.optimizer.record_reward(cycle.challenger_reward);
        let gradient = self.optimizer.policy_gradient(cycle.challenger_reward);
        let direction = self.optimizer.evolution_direction();

        let challenger_prompt = format!(
            "Challenger feedback for {domain}: reward {:.3}, advantage {advantage:.3}, direction {direction}.",
            cycle.challenger_reward
        );
        let solver_prompt = format!(
            "Solver feedback for {domain}: improvement {:.3}, policy gradient {gradient:.4}.",
            cycle.solver_improvement
        );
        let (challenger, solver) = tokio::join!(
            bounded(
                self.call_timeout,
                "challenger_guidance",
                self.generator.generate_evolution_guidance(&challenger_prompt),
            ),
            bounded(
                self.call_timeout,
                "solver_guidance",
                self.generator.generate_evolution_guidance(&solver_prompt),
            ),
        );
        for guidance in [challenger, solver] {
            if let Err(error) = guidance {
                tracing::warn!(%error, %domain, "evolution guidance failed");
            }
        }
        self.challenge_context = direction.to_string();

        let next = self.curriculum.optimal_difficulty(cycle.uncertainty, Some(domain));
        self.curriculum
            .update_domain_performance(domain, success_rate(&cycle.attempts), cycle.challenge.difficulty);
        self.current_domain = domain.next();

        tracing::debug!(
            %domain,
            next_difficulty = %next,
            advantage,
            gradient,
            %direction,
            "curriculum adapted"
        );
    }

    fn domain_performance_snapshot(&self) -> BTreeMap<Domain, DomainPerformance> {
        self.curriculum
            .domain_performance()
            .iter()
            .map(|(domain, performance)| (*domain, performance.clone()))
            .collect()
    }
}

impl<G, P> std::fmt::Debug for LearningOrchestrator<G, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningOrchestrator")
            .field("current_domain", &self.current_domain)
            .field("total_cycles", &self.total_cycles)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Await a collaborator call under a deadline.
async fn bounded<T>(
    limit: Duration,
    stage: &'static str,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, LearningError> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(LearningError::Generation {
            stage,
            message: error.to_string(),
        }),
        Err(_elapsed) => Err(LearningError::Timeout {
            stage,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Mean confidence of the kept attempts, the domain's observed success.
fn success_rate(attempts: &[SolutionAttempt]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    attempts.iter().map(|attempt| attempt.confidence).sum::<f64>() / attempts.len() as f64
}

fn assemble_cycle(
    challenge: Challenge,
    attempts: Vec<SolutionAttempt>,
    uncertainty: f64,
    challenger_reward: f64,
    solver_improvement: f64,
    safety_validated: bool,
) -> Result<LearningCycle, LearningError> {
    if challenge.id.is_empty() {
        return Err(LearningError::Integrity("challenge has no id".into()));
    }
    for (name, value) in [
        ("uncertainty", uncertainty),
        ("challenger_reward", challenger_reward),
        ("solver_improvement", solver_improvement),
    ] {
        if !value.is_finite() {
            return Err(LearningError::Integrity(format!("{name} is not finite: {value}")));
        }
    }
    if !(0.0..=1.0).contains(&uncertainty) || !(0.0..=1.0).contains(&challenger_reward) {
        return Err(LearningError::Integrity(format!(
            "scores out of range: uncertainty {uncertainty}, reward {challenger_reward}"
        )));
    }
    if let Some(stray) = attempts.iter().find(|attempt| attempt.challenge_id != challenge.id) {
        return Err(LearningError::Integrity(format!(
            "attempt from {} answers challenge {}, expected {}",
            stray.agent_label, stray.challenge_id, challenge.id
        )));
    }

    Ok(LearningCycle {
        id: uuid::Uuid::new_v4().to_string(),
        challenge,
        attempts,
        uncertainty,
        challenger_reward,
        solver_improvement,
        safety_validated,
        completed_at: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
