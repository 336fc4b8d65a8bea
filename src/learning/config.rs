//! Learning loop configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the orchestrator and its curriculum/reward sub-engines.
///
/// Loaded from the `[learning]` table of the engine's TOML file. Every field
/// has a default, so partial tables are fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LearningConfig {
    /// Uncertainty below this makes the curriculum harder; domain success
    /// rates below it make the domain easier.
    pub low_threshold: f64,
    /// Uncertainty above this makes the curriculum easier; domain success
    /// rates above it make the domain harder.
    pub high_threshold: f64,
    /// EMA smoothing factor for per-domain success rates.
    pub performance_smoothing: f64,
    /// Maximum entries in the difficulty history log.
    pub difficulty_history_cap: usize,
    /// Rolling window for reward, advantage and gradient histories.
    pub advantage_window: usize,
    /// Scale applied to the latest advantage to form the policy gradient.
    pub policy_learning_rate: f64,
    /// Mean-advantage band outside of which the evolution direction changes.
    pub direction_band: f64,
    /// Best-attempt confidence is multiplied by this to form the solver
    /// improvement signal.
    pub improvement_scale: f64,
    /// Solver strategies queried once each per cycle.
    pub strategies: Vec<String>,
    /// Per-call budget for challenger, solver and guidance calls.
    pub call_timeout_ms: u64,
    /// Seconds between cycles when driven by [`super::engine::spawn_cycle_loop`].
    pub cycle_interval_secs: u64,
    /// Entries reported in the `recent_*` statistics series.
    pub statistics_window: usize,
    /// Completed cycles kept in memory; the oldest are dropped first.
    pub cycle_history_cap: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            low_threshold: 0.3,
            high_threshold: 0.7,
            performance_smoothing: 0.1,
            difficulty_history_cap: 100,
            advantage_window: 10,
            policy_learning_rate: 0.01,
            direction_band: 0.1,
            improvement_scale: 0.1,
            strategies: vec![
                "direct_reasoning".into(),
                "step_by_step".into(),
                "critical_review".into(),
            ],
            call_timeout_ms: 30_000,
            cycle_interval_secs: 60,
            statistics_window: 10,
            cycle_history_cap: 1000,
        }
    }
}
