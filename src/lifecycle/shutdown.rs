//! Stop sequence.
//!
//! # Responsibilities
//! - Clear failed jobs while every broker is still reachable
//! - Stop supervised services in the exact reverse of start order
//! - Reclaim orphaned workers by broad pattern
//! - Kill brokers and wipe their persisted data
//! - Poll health until nothing answers or the stop deadline passes
//!
//! # Design Decisions
//! - Absent processes and locks count as stopped, so stop is re-entrant
//! - A signal that cannot be delivered marks the component `StoppingFailed`
//!   and the sequence continues
//! - A lock or data directory that cannot be removed aborts the command

use tracing::{info, warn};

use crate::health::HealthReport;
use crate::lifecycle::controller::{set_state, StackController};
use crate::lifecycle::{Command, CommandOutcome, ControlError};
use crate::process::TerminateOutcome;
use crate::queue::{DrainReport, QueueDrain};
use crate::services::{broker, ServiceState};

impl StackController {
    /// Tear the whole stack down and verify it.
    pub async fn stop(&mut self) -> Result<CommandOutcome, ControlError> {
        info!("Stopping mail stack");

        self.drain_queues().await;
        self.stop_services().await?;
        self.reclaim_orphans().await;
        self.stop_brokers().await?;

        let poll = self
            .poll_health(self.stop_policy(), HealthReport::is_stopped)
            .await;

        let (success, message) = if poll.satisfied {
            info!(attempts = poll.attempts, "Mail stack stopped");
            (true, "Mail stack stopped".to_string())
        } else {
            let up: Vec<String> = poll.last.up().iter().map(|c| c.key()).collect();
            warn!(still_up = ?up, "Mail stack still running after stop");
            (
                false,
                format!("Mail stack did not stop; still up: {}", up.join(", ")),
            )
        };

        Ok(CommandOutcome {
            command: Command::Stop,
            success,
            message,
            report: poll.last,
        })
    }

    /// Clear every configured queue's failed jobs against its broker.
    pub(super) async fn drain_queues(&self) -> Vec<DrainReport> {
        let mut targets = Vec::new();
        for queue in &self.config.queues {
            match self.brokers.iter().find(|b| b.name() == queue.broker) {
                Some(broker) => targets.push((queue.name.as_str(), broker.endpoint().to_string())),
                None => warn!(queue = %queue.name, broker = %queue.broker, "Queue has no broker, skipping drain"),
            }
        }

        let reports = QueueDrain::new(self.queues.clone()).drain_all(targets).await;
        let failed = reports.iter().filter(|r| r.result.is_err()).count();
        if failed > 0 {
            warn!(failed, total = reports.len(), "Some failed queues were not cleared");
        }
        reports
    }

    /// Stop supervised services, last started first.
    async fn stop_services(&mut self) -> Result<(), ControlError> {
        for svc in self.services.iter().rev() {
            let key = svc.service.key();
            set_state(&mut self.states, &key, ServiceState::Stopping);

            let outcome = svc.stop(self.procs.as_ref(), &self.store).await?;
            let next = if outcome.terminate.is_success() {
                ServiceState::Stopped
            } else {
                ServiceState::StoppingFailed
            };
            set_state(&mut self.states, &key, next);
            info!(service = svc.name(), outcome = ?outcome.terminate, lock = ?outcome.lock, "Service stopped");
        }
        Ok(())
    }

    /// Kill leftover workers no service entry tracks.
    async fn reclaim_orphans(&self) {
        for pattern in &self.config.orphan_patterns {
            match self.procs.terminate_matching(pattern).await {
                TerminateOutcome::Terminated => info!(pattern = %pattern, "Reclaimed orphaned workers"),
                TerminateOutcome::AlreadyAbsent => {}
                TerminateOutcome::Failed(reason) => {
                    warn!(pattern = %pattern, reason = %reason, "Could not reclaim orphaned workers")
                }
            }
        }
    }

    /// Kill every broker together, then delete persisted broker data.
    async fn stop_brokers(&mut self) -> Result<(), ControlError> {
        for b in &self.brokers {
            set_state(&mut self.states, &b.service.key(), ServiceState::Stopping);
        }

        let outcome = broker::stop_all(
            &self.brokers,
            &self.config.broker_match_pattern,
            self.procs.as_ref(),
            &self.store,
        )
        .await?;

        for b in &self.brokers {
            if b.purge_data()? {
                info!(broker = b.name(), dir = %b.data_dir().display(), "Removed broker data");
            }
        }
        broker::remove_tree(&self.config.paths.broker_data_root)?;

        let next = if outcome.is_success() {
            ServiceState::Stopped
        } else {
            ServiceState::StoppingFailed
        };
        for b in &self.brokers {
            set_state(&mut self.states, &b.service.key(), next);
        }
        Ok(())
    }
}

