//! Group-relative advantage optimizer.
//!
//! A batch's mean reward is its baseline and each item's advantage is its
//! reward minus that baseline, so no learned value function is needed. Reward,
//! advantage and gradient histories are FIFO windows of a fixed capacity.

use crate::learning::{EvolutionDirection, LearningConfig};

use std::collections::VecDeque;

/// Minimum advantage history before a policy gradient is emitted.
const MIN_GRADIENT_HISTORY: usize = 2;

/// Number of trailing advantages averaged for the evolution direction.
const DIRECTION_WINDOW: usize = 3;

#[derive(Debug, Clone)]
pub struct AdvantageOptimizer {
    window: usize,
    learning_rate: f64,
    direction_band: f64,
    reward_history: VecDeque<f64>,
    advantage_history: VecDeque<f64>,
    gradient_history: VecDeque<f64>,
}

impl AdvantageOptimizer {
    pub fn new(config: &LearningConfig) -> Self {
        let window = config.advantage_window.max(1);
        Self {
            window,
            learning_rate: config.policy_learning_rate,
            direction_band: config.direction_band,
            reward_history: VecDeque::with_capacity(window),
            advantage_history: VecDeque::with_capacity(window),
            gradient_history: VecDeque::with_capacity(window),
        }
    }

    /// Per-item advantages against the batch mean.
    ///
    /// Empty and single-element batches carry no relative signal and return
    /// zeros of matching length. Inputs and outputs are appended to the
    /// rolling histories.
    pub fn advantages(&mut self, rewards: &[f64]) -> Vec<f64> {
        let advantages = group_advantages(rewards);
        for &reward in rewards {
            push_capped(&mut self.reward_history, reward, self.window);
        }
        for &advantage in &advantages {
            push_capped(&mut self.advantage_history, advantage, self.window);
        }
        advantages
    }

    /// Record one reward and return its advantage against the reward window.
    ///
    /// The rolling window, including the new reward, is the group. The first
    /// reward has nothing to compare against and scores zero.
    pub fn record_reward(&mut self, reward: f64) -> f64 {
        push_capped(&mut self.reward_history, reward, self.window);
        let rewards: Vec<f64> = self.reward_history.iter().copied().collect();
        let advantage = group_advantages(&rewards).last().copied().unwrap_or(0.0);
        push_capped(&mut self.advantage_history, advantage, self.window);
        advantage
    }

    /// Scalar update signal from the latest advantage.
    ///
    /// Returns zero until at least two advantages have been recorded. The
    /// current reward is accepted for interface symmetry with the caller; the
    /// signal is driven by the latest advantage alone.
    pub fn policy_gradient(&mut self, _current_reward: f64) -> f64 {
        if self.advantage_history.len() < MIN_GRADIENT_HISTORY {
            return 0.0;
        }
        let last = self.advantage_history.back().copied().unwrap_or(0.0);
        let gradient = last * self.learning_rate;
        push_capped(&mut self.gradient_history, gradient, self.window);
        gradient
    }

    /// Advisory direction from the mean of the last three advantages.
    pub fn evolution_direction(&self) -> EvolutionDirection {
        if self.advantage_history.len() < DIRECTION_WINDOW {
            return EvolutionDirection::Maintain;
        }
        let recent_mean = self
            .advantage_history
            .iter()
            .rev()
            .take(DIRECTION_WINDOW)
            .sum::<f64>()
            / DIRECTION_WINDOW as f64;

        if recent_mean > self.direction_band {
            EvolutionDirection::Accelerate
        } else if recent_mean < -self.direction_band {
            EvolutionDirection::Stabilize
        } else {
            EvolutionDirection::Maintain
        }
    }

    pub fn reward_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.reward_history.iter().copied()
    }

    pub fn advantage_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.advantage_history.iter().copied()
    }

    pub fn gradient_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.gradient_history.iter().copied()
    }

    /// Clear every rolling window.
    pub fn reset(&mut self) {
        self.reward_history.clear();
        self.advantage_history.clear();
        self.gradient_history.clear();
    }
}

/// Rewards minus their mean. Batches of fewer than two yield zeros.
pub fn group_advantages(rewards: &[f64]) -> Vec<f64> {
    if rewards.len() < 2 {
        return vec![0.0; rewards.len()];
    }
    let baseline = rewards.iter().sum::<f64>() / rewards.len() as f64;
    rewards.iter().map(|reward| reward - baseline).collect()
}

fn push_capped(buffer: &mut VecDeque<f64>, value: f64, capacity: usize) {
    buffer.push_back(value);
    while buffer.len() > capacity {
        buffer.pop_front();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn optimizer() -> AdvantageOptimizer {
        AdvantageOptimizer::new(&LearningConfig::default())
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn advantages_are_centered_on_the_batch_mean() {
        let mut optimizer = optimizer();
        let advantages = optimizer.advantages(&[0.8, 0.6, 0.9, 0.7]);
        assert_close(&advantages, &[0.05, -0.15, 0.15, -0.05]);
    }

    #[test]
    fn advantages_sum_to_zero() {
        let mut optimizer = optimizer();
        for batch in [
            vec![0.1, 0.2, 0.3],
            vec![1.0, 0.0],
            vec![0.33, 0.33, 0.91, 0.05, 0.72],
        ] {
            let sum: f64 = optimizer.advantages(&batch).iter().sum();
            assert!(sum.abs() < 1e-9, "sum {sum} for {batch:?}");
        }
    }

    #[test]
    fn degenerate_batches_return_zeros() {
        let mut optimizer = optimizer();
        assert!(optimizer.advantages(&[]).is_empty());
        assert_eq!(optimizer.advantages(&[0.42]), vec![0.0]);
    }

    #[test]
    fn histories_evict_oldest_first() {
        let config = LearningConfig {
            advantage_window: 3,
            ..LearningConfig::default()
        };
        let mut optimizer = AdvantageOptimizer::new(&config);
        optimizer.advantages(&[0.1, 0.2]);
        optimizer.advantages(&[0.3, 0.4]);

        let rewards: Vec<f64> = optimizer.reward_history().collect();
        assert_eq!(rewards, vec![0.2, 0.3, 0.4]);
        assert_eq!(optimizer.advantage_history().count(), 3);
    }

    #[test]
    fn gradient_needs_two_advantages() {
        let mut optimizer = optimizer();
        assert_eq!(optimizer.policy_gradient(0.5), 0.0);
        optimizer.advantages(&[0.5]);
        assert_eq!(optimizer.policy_gradient(0.5), 0.0);
        assert_eq!(optimizer.gradient_history().count(), 0);

        optimizer.advantages(&[0.2, 0.8]);
        // Last advantage is +0.3.
        let gradient = optimizer.policy_gradient(0.8);
        assert!((gradient - 0.003).abs() < 1e-12);
        assert_eq!(optimizer.gradient_history().count(), 1);
    }

    #[test]
    fn direction_defaults_to_maintain_with_short_history() {
        let mut optimizer = optimizer();
        optimizer.advantages(&[0.0, 1.0]);
        assert_eq!(optimizer.evolution_direction(), EvolutionDirection::Maintain);
    }

    #[test]
    fn direction_follows_recent_mean() {
        let mut optimizer = optimizer();
        optimizer.advantage_history.extend([0.2, 0.3, 0.25]);
        assert_eq!(optimizer.evolution_direction(), EvolutionDirection::Accelerate);

        optimizer.advantage_history.extend([-0.3, -0.2, -0.25]);
        assert_eq!(optimizer.evolution_direction(), EvolutionDirection::Stabilize);

        optimizer.advantage_history.extend([0.05, -0.05, 0.0]);
        assert_eq!(optimizer.evolution_direction(), EvolutionDirection::Maintain);
    }

    #[test]
    fn recorded_rewards_compare_against_the_window() {
        let mut optimizer = optimizer();
        assert_eq!(optimizer.record_reward(0.5), 0.0);
        // Window [0.5, 0.9], mean 0.7.
        assert!((optimizer.record_reward(0.9) - 0.2).abs() < 1e-12);
        // Window [0.5, 0.9, 0.1], mean 0.5.
        assert!((optimizer.record_reward(0.1) + 0.4).abs() < 1e-12);
        assert_eq!(optimizer.advantage_history().count(), 3);
    }

    #[test]
    fn reset_clears_all_windows() {
        let mut optimizer = optimizer();
        optimizer.advantages(&[0.1, 0.9]);
        optimizer.policy_gradient(0.9);
        optimizer.reset();
        assert_eq!(optimizer.reward_history().count(), 0);
        assert_eq!(optimizer.advantage_history().count(), 0);
        assert_eq!(optimizer.gradient_history().count(), 0);
    }
}
