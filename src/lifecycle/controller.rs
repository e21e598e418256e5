//! The stack controller.
//!
//! Owns the static component list built from `StackConfig` and the
//! per-component `ServiceState` map. Command sequences live in
//! `startup.rs` and `shutdown.rs`; this file holds construction, status,
//! restart and recover.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::StackConfig;
use crate::health::{HealthCheck, HealthReport};
use crate::lifecycle::{Command, CommandOutcome, ControlError};
use crate::process::{ExitState, HandleStore, ProcessControl};
use crate::queue::QueueBackend;
use crate::resilience::{wait_until, PollPolicy, PollResult};
use crate::services::{BrokerInstance, ServiceKind, ServiceState, SupervisedService};

/// Top-level lifecycle state machine for the mail stack.
pub struct StackController {
    pub(super) config: StackConfig,
    pub(super) procs: Arc<dyn ProcessControl>,
    pub(super) queues: Arc<dyn QueueBackend>,
    pub(super) store: HandleStore,
    pub(super) brokers: Vec<BrokerInstance>,
    pub(super) services: Vec<SupervisedService>,
    pub(super) health: HealthCheck,
    pub(super) states: BTreeMap<String, ServiceState>,
}

impl StackController {
    pub fn new(
        config: StackConfig,
        procs: Arc<dyn ProcessControl>,
        queues: Arc<dyn QueueBackend>,
    ) -> Self {
        let paths = &config.paths;
        let brokers: Vec<BrokerInstance> = config
            .brokers
            .iter()
            .map(|b| BrokerInstance::new(b, &paths.broker_data_root, &paths.log_dir))
            .collect();

        let mut services = Vec::new();
        for (index, tier) in config.tiers.iter().enumerate() {
            for svc in &tier.services {
                services.push(SupervisedService::new(index, tier, svc, &paths.log_dir));
            }
        }

        let store = HandleStore::new(paths.state_dir.clone());
        let health = HealthCheck::new(
            procs.clone(),
            queues.clone(),
            store.clone(),
            brokers.clone(),
            services.clone(),
        );

        let states = brokers
            .iter()
            .map(|b| &b.service)
            .chain(services.iter().map(|s| &s.service))
            .map(|svc| (svc.key(), ServiceState::Stopped))
            .collect();

        Self {
            config,
            procs,
            queues,
            store,
            brokers,
            services,
            health,
            states,
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn brokers(&self) -> &[BrokerInstance] {
        &self.brokers
    }

    /// Supervised services in start order.
    pub fn services(&self) -> &[SupervisedService] {
        &self.services
    }

    /// Runtime state per component key (`broker-<name>` / `service-<name>`).
    pub fn states(&self) -> &BTreeMap<String, ServiceState> {
        &self.states
    }

    pub fn state(&self, key: &str) -> Option<ServiceState> {
        self.states.get(key).copied()
    }

    /// Read-only health query.
    pub async fn status(&self) -> CommandOutcome {
        let report = self.health.probe().await;
        let running = report.is_running();
        let message = if running {
            format!("Mail stack is running ({report})")
        } else if report.is_stopped() {
            format!("Mail stack is stopped ({report})")
        } else {
            format!("Mail stack is degraded ({report}); down: {}", names(&report))
        };
        info!(running, summary = %report, "Status");
        CommandOutcome {
            command: Command::Status,
            success: running,
            message,
            report,
        }
    }

    /// Stop followed by start. A failed start leaves the stack stopped.
    pub async fn restart(&mut self) -> Result<CommandOutcome, ControlError> {
        let stopped = self.stop().await?;
        if !stopped.success {
            warn!(message = %stopped.message, "Stop phase of restart incomplete, starting anyway");
        }
        let started = self.start().await?;
        Ok(CommandOutcome {
            command: Command::Restart,
            success: started.success,
            message: if started.success {
                "Mail stack restarted".to_string()
            } else {
                format!("Mail stack failed to restart: {}", started.message)
            },
            report: started.report,
        })
    }

    /// Relaunch only the components that are down, then poll health.
    pub async fn recover(&mut self) -> Result<CommandOutcome, ControlError> {
        let before = self.health.probe().await;
        if before.is_running() {
            return Ok(CommandOutcome {
                command: Command::Recover,
                success: true,
                message: format!("Mail stack already running ({before}); nothing to recover"),
                report: before,
            });
        }

        let down: Vec<String> = before.down().iter().map(|c| c.key()).collect();
        info!(components = ?down, "Recovering components");

        self.launch_brokers(|b| down.contains(&b.service.key())).await?;
        self.launch_services(|s| down.contains(&s.service.key())).await?;

        let poll = self.poll_health(self.start_policy(), HealthReport::is_running).await;
        self.settle_started(&poll.last).await;

        let success = poll.satisfied;
        let message = if success {
            format!("Recovered {}: {}", down.len(), down.join(", "))
        } else {
            format!("Recovery incomplete; still down: {}", names(&poll.last))
        };
        Ok(CommandOutcome {
            command: Command::Recover,
            success,
            message,
            report: poll.last,
        })
    }

    pub(super) fn start_policy(&self) -> PollPolicy {
        PollPolicy::for_start(&self.config.timing)
    }

    pub(super) fn stop_policy(&self) -> PollPolicy {
        PollPolicy::for_stop(&self.config.timing)
    }

    /// Poll the health check until `done` holds or the policy deadline passes.
    pub(super) async fn poll_health(
        &self,
        policy: PollPolicy,
        done: fn(&HealthReport) -> bool,
    ) -> PollResult<HealthReport> {
        let health = &self.health;
        let result = wait_until(policy, || health.probe(), done).await;
        debug!(
            satisfied = result.satisfied,
            attempts = result.attempts,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Health poll finished"
        );
        result
    }

    /// Resolve every `Starting` component to `Running` or `Failed`.
    pub(super) async fn settle_started(&mut self, report: &HealthReport) {
        for component in &report.components {
            let key = component.key();
            if self.state(&key) != Some(ServiceState::Starting) {
                continue;
            }
            if component.up {
                set_state(&mut self.states, &key, ServiceState::Running);
                continue;
            }

            set_state(&mut self.states, &key, ServiceState::Failed);
            let exit = match self.store.load_lossy(&key) {
                Some(handle) => self.procs.exit_state(&handle).await,
                None => ExitState::Untracked,
            };
            match component.kind {
                ServiceKind::Broker => {
                    warn!(broker = %component.name, exit = ?exit, "Broker not reachable")
                }
                ServiceKind::Supervised => {
                    warn!(service = %component.name, exit = ?exit, "Service not running")
                }
            }
        }
    }
}

/// Apply a transition, refusing illegal ones.
pub(super) fn set_state(states: &mut BTreeMap<String, ServiceState>, key: &str, next: ServiceState) {
    let current = states.get(key).copied().unwrap_or(ServiceState::Stopped);
    if current == next {
        return;
    }
    if current.can_transition_to(next) {
        debug!(component = key, from = %current, to = %next, "State change");
        states.insert(key.to_string(), next);
    } else {
        warn!(component = key, from = %current, to = %next, "Ignoring illegal state change");
    }
}

/// Comma-separated names of the components that are down.
pub(super) fn names(report: &HealthReport) -> String {
    report
        .down()
        .iter()
        .map(|c| c.key())
        .collect::<Vec<_>>()
        .join(", ")
}
