//! Pseudo-label quality gate and the cycle's scoring arithmetic.
//!
//! The quality gate keeps attempts at or above the batch's own mean
//! confidence. Uncertainty and challenger reward are pure functions of the
//! confidences, treated as opaque caller-supplied floats.

use crate::learning::{SolutionAttempt, clamp_unit};

/// Uncertainty at which the challenger reward peaks.
const OPTIMAL_UNCERTAINTY: f64 = 0.5;

/// Keep every attempt whose confidence is at least the batch mean.
///
/// Order is preserved and ties with the mean are kept. The batch sets its own
/// bar, so a second pass over survivors can only narrow the set further; it
/// is a fixpoint once the surviving confidences agree.
pub fn filter_by_mean_confidence(attempts: &[SolutionAttempt]) -> Vec<SolutionAttempt> {
    if attempts.is_empty() {
        return Vec::new();
    }
    let mean = mean(attempts.iter().map(|attempt| attempt.confidence));
    attempts
        .iter()
        .filter(|attempt| attempt.confidence >= mean)
        .cloned()
        .collect()
}

/// `min(1, variance + (1 - mean))` over the attempts' confidences.
///
/// Population variance is used. With no attempts there is no information and
/// uncertainty is maximal.
pub fn uncertainty(attempts: &[SolutionAttempt]) -> f64 {
    if attempts.is_empty() {
        return 1.0;
    }
    let confidences: Vec<f64> = attempts.iter().map(|attempt| attempt.confidence).collect();
    let mean = mean(confidences.iter().copied());
    let variance = mean_of_squared_deviation(&confidences, mean);
    clamp_unit((variance + (1.0 - mean)).min(1.0))
}

/// `max(0, 1 - |uncertainty - 0.5|)`: largest when the solver is most torn.
pub fn challenger_reward(uncertainty: f64) -> f64 {
    clamp_unit(1.0 - (uncertainty - OPTIMAL_UNCERTAINTY).abs())
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn mean_of_squared_deviation(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / values.len() as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn attempts(confidences: &[f64]) -> Vec<SolutionAttempt> {
        confidences
            .iter()
            .enumerate()
            .map(|(index, &confidence)| {
                SolutionAttempt::new("c1", format!("agent-{index}"), "answer", confidence, 0.5)
            })
            .collect()
    }

    fn confidences(attempts: &[SolutionAttempt]) -> Vec<f64> {
        attempts.iter().map(|attempt| attempt.confidence).collect()
    }

    #[test]
    fn filter_keeps_attempts_at_or_above_mean() {
        let kept = filter_by_mean_confidence(&attempts(&[0.9, 0.6, 0.8, 0.4]));
        assert_eq!(confidences(&kept), vec![0.9, 0.8]);
    }

    #[test]
    fn filter_keeps_ties_and_order() {
        let kept = filter_by_mean_confidence(&attempts(&[0.5, 0.5, 0.5]));
        assert_eq!(kept.len(), 3);
        let labels: Vec<_> = kept.iter().map(|attempt| attempt.agent_label.as_str()).collect();
        assert_eq!(labels, vec!["agent-0", "agent-1", "agent-2"]);
    }

    #[test]
    fn filter_of_empty_is_empty() {
        assert!(filter_by_mean_confidence(&[]).is_empty());
    }

    #[test]
    fn refiltering_only_narrows_and_preserves_order() {
        for batch in [
            vec![0.9, 0.6, 0.8, 0.4],
            vec![0.1, 0.2, 0.3, 0.4, 0.5],
            vec![0.25, 0.75, 0.75],
        ] {
            let once = filter_by_mean_confidence(&attempts(&batch));
            let twice = filter_by_mean_confidence(&once);
            assert!(!twice.is_empty());
            assert!(twice.len() <= once.len());
            let once_labels: Vec<_> = once.iter().map(|a| a.agent_label.clone()).collect();
            let twice_labels: Vec<_> = twice.iter().map(|a| a.agent_label.clone()).collect();
            // Survivors of the second pass appear in the same relative order.
            let mut cursor = once_labels.iter();
            assert!(twice_labels.iter().all(|label| cursor.any(|l| l == label)));
        }
    }

    #[test]
    fn filter_is_a_fixpoint_once_confidences_agree() {
        let once = filter_by_mean_confidence(&attempts(&[0.3, 0.8, 0.8]));
        assert_eq!(confidences(&once), vec![0.8, 0.8]);
        let twice = filter_by_mean_confidence(&once);
        assert_eq!(confidences(&twice), confidences(&once));
    }

    #[test]
    fn uncertainty_without_attempts_is_maximal() {
        assert_eq!(uncertainty(&[]), 1.0);
    }

    #[test]
    fn uncertainty_combines_variance_and_mean() {
        // mean 0.8, variance 0.01
        let value = uncertainty(&attempts(&[0.7, 0.9]));
        assert!((value - 0.21).abs() < 1e-9);
    }

    #[test]
    fn uncertainty_is_capped_at_one() {
        assert_eq!(uncertainty(&attempts(&[0.0, 0.0])), 1.0);
    }

    #[test]
    fn reward_peaks_at_half_uncertainty() {
        assert_eq!(challenger_reward(0.5), 1.0);
        assert!(challenger_reward(0.49) < 1.0);
        assert!(challenger_reward(0.51) < 1.0);
    }

    #[test]
    fn reward_stays_in_unit_interval() {
        for step in 0..=20 {
            let value = challenger_reward(step as f64 / 20.0);
            assert!((0.0..=1.0).contains(&value));
        }
        assert!((challenger_reward(0.0) - 0.5).abs() < 1e-12);
        assert!((challenger_reward(1.0) - 0.5).abs() < 1e-12);
    }
}
