//! # Recovery Loop
//!
//! A periodic task that calls [`Coordinator::sweep`]. It is started and
//! stopped with the service; nothing about it is global. Every
//! `snapshot_every` sweeps it also saves the registry.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::coordinator::Coordinator;

/// Handle to a running recovery loop.
#[derive(Debug)]
pub struct RecoveryTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RecoveryTask {
    /// Spawn the loop on the current runtime.
    pub fn spawn(coordinator: Arc<Coordinator>) -> Self {
        let (stop, mut stop_rx) = watch::channel(false);
        let period = coordinator.config().recovery_interval;
        let snapshot_every = coordinator.config().snapshot_every;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(period_ms = period.as_millis() as u64, "recovery loop started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        coordinator.sweep().await;
                        let sweeps = coordinator.sweep_count();
                        if snapshot_every > 0 && sweeps % snapshot_every == 0 {
                            coordinator.registry().save_or_log();
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            tracing::info!("recovery loop stopped");
        });

        Self { stop, handle }
    }

    /// Stop the loop and wait for the sweep in progress to finish.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "recovery loop terminated abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use lra_core::TimeLimit;
    use lra_state::LraStatus;

    use crate::config::CoordinatorConfig;
    use crate::registry::Registry;

    #[tokio::test]
    async fn loop_sweeps_until_stopped() {
        let mut config = CoordinatorConfig::default();
        config.recovery_interval = Duration::from_millis(10);
        let coordinator = Arc::new(Coordinator::new(Registry::new(), config).unwrap());
        let id = coordinator.start("c", None, TimeLimit::from_millis(1)).unwrap();

        let task = RecoveryTask::spawn(Arc::clone(&coordinator));
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.stop().await;

        let sweeps = coordinator.sweep_count();
        assert!(sweeps >= 2, "expected several sweeps, got {sweeps}");
        assert_eq!(coordinator.status(id).unwrap(), LraStatus::Cancelled);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(coordinator.sweep_count(), sweeps);
    }

    #[tokio::test]
    async fn recovery_waits_for_two_sweeps() {
        let mut config = CoordinatorConfig::default();
        config.recovery_interval = Duration::from_millis(10);
        config.recovery_wait = Duration::from_secs(5);
        let coordinator = Arc::new(Coordinator::new(Registry::new(), config).unwrap());
        let task = RecoveryTask::spawn(Arc::clone(&coordinator));

        let before = coordinator.sweep_count();
        coordinator.recovery().await;
        assert!(coordinator.sweep_count() >= before + 2);
        task.stop().await;
    }

    #[tokio::test]
    async fn periodic_snapshot_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let mut config = CoordinatorConfig::default();
        config.recovery_interval = Duration::from_millis(5);
        config.snapshot_every = 2;
        let coordinator =
            Arc::new(Coordinator::new(Registry::with_snapshot_path(&path), config).unwrap());
        coordinator.start("c", None, TimeLimit::NONE).unwrap();

        let task = RecoveryTask::spawn(Arc::clone(&coordinator));
        tokio::time::sleep(Duration::from_millis(60)).await;
        task.stop().await;

        let snapshot = crate::registry::read_snapshot(&path).unwrap().unwrap();
        assert_eq!(snapshot.lras.len(), 1);
    }
}
