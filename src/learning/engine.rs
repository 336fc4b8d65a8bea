//! Background driver that runs learning cycles on a fixed cadence.
//!
//! Integrity failures are logged and the loop carries on with the next tick;
//! every other collaborator failure has already been absorbed by the
//! orchestrator.

use super::collaborators::{ChallengeGenerator, SafetyPolicy};
use super::orchestrator::LearningOrchestrator;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use std::time::Duration;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Spawn the cycle loop as a background task.
///
/// Runs one cycle per `interval` tick until `shutdown` flips to `true` or its
/// sender is dropped, then hands the orchestrator back through the join
/// handle. Ticks missed while a slow cycle runs are skipped, not replayed.
pub fn spawn_cycle_loop<G, P>(
    mut orchestrator: LearningOrchestrator<G, P>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<LearningOrchestrator<G, P>>
where
    G: ChallengeGenerator + 'static,
    P: SafetyPolicy + 'static,
{
    tokio::spawn(async move {
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(interval_ms, "learning cycle loop started");

        let mut heartbeat = tokio::time::interval(interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = heartbeat.tick() => {
                    if let Err(error) = orchestrator.run_cycle().await {
                        tracing::error!(%error, "learning cycle aborted");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::info!("shutdown sender dropped, learning cycle loop exiting");
                        break;
                    }
                }
            }
        }

        tracing::info!(
            cycles = orchestrator.get_statistics().total_cycles,
            "learning cycle loop stopped"
        );
        orchestrator
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::learning::collaborators::{KeywordSafetyPolicy, TemplateBackend};

    fn orchestrator() -> LearningOrchestrator<TemplateBackend, KeywordSafetyPolicy> {
        LearningOrchestrator::new(
            &EngineConfig::default(),
            TemplateBackend::new(),
            KeywordSafetyPolicy::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn runs_a_cycle_per_tick_until_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_cycle_loop(orchestrator(), Duration::from_secs(1), shutdown_rx);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        shutdown_tx.send(true).unwrap();

        let orchestrator = handle.await.unwrap();
        let cycles = orchestrator.get_statistics().total_cycles;
        // Ticks at 0s, 1s, 2s and 3s.
        assert!((3..=4).contains(&cycles), "ran {cycles} cycles");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_sender_stops_the_loop() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_cycle_loop(orchestrator(), Duration::from_secs(60), shutdown_rx);

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(shutdown_tx);

        let orchestrator = handle.await.unwrap();
        assert_eq!(orchestrator.get_statistics().total_cycles, 1);
    }
}
