//! Start sequence.
//!
//! # Responsibilities
//! - Launch every broker, each independently of the others
//! - Launch supervised services tier by tier, in configured order
//! - Fix ownership on the shared log tree
//! - Poll health until the stack runs or the start deadline passes
//!
//! # Design Decisions
//! - A component that fails to launch is logged; later steps still run
//! - Components already alive are left alone, so start is idempotent
//! - A failed start is reported, never retried

use tracing::{info, warn};

use crate::health::HealthReport;
use crate::lifecycle::controller::{names, set_state, StackController};
use crate::lifecycle::{ownership, Command, CommandOutcome, ControlError};
use crate::services::{BrokerInstance, ServiceError, ServiceState, StartOutcome, SupervisedService};

impl StackController {
    /// Bring the whole stack up and verify it.
    pub async fn start(&mut self) -> Result<CommandOutcome, ControlError> {
        info!(
            brokers = self.brokers.len(),
            services = self.services.len(),
            "Starting mail stack"
        );

        self.launch_brokers(|_| true).await?;
        self.launch_services(|_| true).await?;
        self.fix_ownership().await;

        let poll = self
            .poll_health(self.start_policy(), HealthReport::is_running)
            .await;
        self.settle_started(&poll.last).await;

        let (success, message) = if poll.satisfied {
            info!(attempts = poll.attempts, elapsed_ms = poll.elapsed.as_millis() as u64, "Mail stack running");
            (true, format!("Mail stack started ({})", poll.last))
        } else {
            warn!(summary = %poll.last, "Mail stack did not come up before the deadline");
            (
                false,
                format!("Mail stack failed to start; down: {}", names(&poll.last)),
            )
        };

        Ok(CommandOutcome {
            command: Command::Start,
            success,
            message,
            report: poll.last,
        })
    }

    /// Launch the brokers selected by `wanted`.
    pub(super) async fn launch_brokers<F>(&mut self, wanted: F) -> Result<(), ControlError>
    where
        F: Fn(&BrokerInstance) -> bool,
    {
        for broker in &self.brokers {
            if !wanted(broker) {
                continue;
            }
            let key = broker.service.key();
            set_state(&mut self.states, &key, ServiceState::Starting);

            match broker
                .start(self.procs.as_ref(), self.queues.as_ref(), &self.store)
                .await
            {
                Ok(StartOutcome::Launched(handle)) => {
                    info!(broker = broker.name(), pid = handle.pid, endpoint = broker.endpoint(), "Broker launched");
                }
                Ok(StartOutcome::AlreadyRunning) => {}
                Err(e) if e.is_launch_failure() || matches!(e, ServiceError::DataDir { .. }) => {
                    warn!(broker = broker.name(), error = %e, "Broker failed to launch, continuing");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Launch the supervised services selected by `wanted`, in start order.
    pub(super) async fn launch_services<F>(&mut self, wanted: F) -> Result<(), ControlError>
    where
        F: Fn(&SupervisedService) -> bool,
    {
        let mut tier = None;
        for svc in &self.services {
            if !wanted(svc) {
                continue;
            }
            if tier != Some(svc.service.tier) {
                tier = Some(svc.service.tier);
                info!(tier = svc.service.tier, dir = %svc.service.working_dir.display(), "Starting tier");
            }

            let key = svc.service.key();
            set_state(&mut self.states, &key, ServiceState::Starting);

            match svc.start(self.procs.as_ref(), &self.store).await {
                Ok(StartOutcome::Launched(handle)) => {
                    info!(service = svc.name(), pid = handle.pid, "Service launched");
                }
                Ok(StartOutcome::AlreadyRunning) => {}
                Err(e) if e.is_launch_failure() => {
                    warn!(service = svc.name(), error = %e, "Service failed to launch, continuing");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn fix_ownership(&self) {
        let config = self.config.ownership.clone();
        match tokio::task::spawn_blocking(move || ownership::fix_ownership(&config)).await {
            Ok(report) if report.failed > 0 => {
                warn!(changed = report.changed, failed = report.failed, "Ownership fixup incomplete");
            }
            Ok(report) => info!(changed = report.changed, "Ownership fixed"),
            Err(e) => warn!(error = %e, "Ownership fixup task failed"),
        }
    }
}
