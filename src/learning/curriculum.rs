//! Curriculum controller: steers challenge difficulty toward the edge of the
//! solver's ability.
//!
//! Two control signals are used. A tracked domain's rolling success rate wins
//! when one is available; otherwise the cycle's uncertainty moves a single
//! global difficulty. Both paths go through the one-rung ladder transitions
//! in [`Difficulty`], so difficulty never jumps.

use crate::learning::{Difficulty, Domain, LearningConfig};

use serde::Serialize;

use std::collections::{HashMap, VecDeque};

/// Rolling performance state for one domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainPerformance {
    /// Exponential moving average of observed success rates.
    pub success_rate: f64,
    /// Difficulty the domain will run at next.
    pub difficulty: Difficulty,
    /// Difficulty of the most recent observed run.
    pub last_attempted: Difficulty,
    pub attempts: u64,
}

/// One logged difficulty change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DifficultyChange {
    pub level: Difficulty,
    pub uncertainty: f64,
}

/// Maps uncertainty and per-domain success rates to difficulty levels.
#[derive(Debug, Clone)]
pub struct CurriculumController {
    current_difficulty: Difficulty,
    domain_performance: HashMap<Domain, DomainPerformance>,
    history: VecDeque<DifficultyChange>,
    low_threshold: f64,
    high_threshold: f64,
    smoothing: f64,
    history_cap: usize,
}

impl CurriculumController {
    pub fn new(config: &LearningConfig) -> Self {
        Self {
            current_difficulty: Difficulty::default(),
            domain_performance: HashMap::new(),
            history: VecDeque::new(),
            low_threshold: config.low_threshold,
            high_threshold: config.high_threshold,
            smoothing: config.performance_smoothing.clamp(0.0, 1.0),
            history_cap: config.difficulty_history_cap.max(1),
        }
    }

    /// Start the global difficulty somewhere other than Intermediate.
    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.current_difficulty = difficulty;
        self
    }

    /// Global difficulty used for untracked domains.
    pub fn current_difficulty(&self) -> Difficulty {
        self.current_difficulty
    }

    /// Difficulty the given domain should run at next.
    pub fn difficulty_for(&self, domain: Domain) -> Difficulty {
        self.domain_performance
            .get(&domain)
            .map(|performance| performance.difficulty)
            .unwrap_or(self.current_difficulty)
    }

    pub fn domain_performance(&self) -> &HashMap<Domain, DomainPerformance> {
        &self.domain_performance
    }

    /// Logged difficulty changes, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &DifficultyChange> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Choose the next difficulty.
    ///
    /// With a tracked domain the domain's success rate decides: above the
    /// high threshold the domain gets harder, below the low threshold easier.
    /// Without one, low uncertainty makes the global difficulty harder and
    /// high uncertainty makes it easier. Values inside the band leave the
    /// level unchanged.
    pub fn optimal_difficulty(&mut self, uncertainty: f64, domain: Option<Domain>) -> Difficulty {
        let (low, high) = (self.low_threshold, self.high_threshold);

        if let Some(domain) = domain
            && let Some(performance) = self.domain_performance.get_mut(&domain)
        {
            let previous = performance.difficulty;
            if performance.success_rate > high {
                performance.difficulty = previous.increase();
            } else if performance.success_rate < low {
                performance.difficulty = previous.decrease();
            }
            let next = performance.difficulty;
            if next != previous {
                tracing::debug!(%domain, from = %previous, to = %next, "domain difficulty changed");
                self.log_change(next, uncertainty);
            }
            return next;
        }

        let previous = self.current_difficulty;
        if uncertainty < low {
            self.current_difficulty = previous.increase();
        } else if uncertainty > high {
            self.current_difficulty = previous.decrease();
        }
        let next = self.current_difficulty;
        if next != previous {
            tracing::debug!(from = %previous, to = %next, uncertainty, "global difficulty changed");
            self.log_change(next, uncertainty);
        }
        next
    }

    /// Fold an observed success rate into the domain's moving average.
    ///
    /// The first observation seeds the average and the domain's difficulty.
    /// Later calls only record `difficulty` as the last attempted level; the
    /// domain's next difficulty moves solely through
    /// [`CurriculumController::optimal_difficulty`].
    pub fn update_domain_performance(
        &mut self,
        domain: Domain,
        success_rate: f64,
        difficulty: Difficulty,
    ) {
        let observed = crate::learning::clamp_unit(success_rate);
        let alpha = self.smoothing;

        self.domain_performance
            .entry(domain)
            .and_modify(|performance| {
                performance.success_rate =
                    alpha * observed + (1.0 - alpha) * performance.success_rate;
                performance.last_attempted = difficulty;
                performance.attempts += 1;
            })
            .or_insert(DomainPerformance {
                success_rate: observed,
                difficulty,
                last_attempted: difficulty,
                attempts: 1,
            });
    }

    fn log_change(&mut self, level: Difficulty, uncertainty: f64) {
        self.history.push_back(DifficultyChange { level, uncertainty });
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
