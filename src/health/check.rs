//! Health probing of the whole stack.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::process::{HandleStore, ProcessControl};
use crate::queue::QueueBackend;
use crate::services::{BrokerInstance, ServiceKind, SupervisedService};

/// Liveness of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub kind: ServiceKind,
    pub up: bool,
}

impl ComponentHealth {
    /// Same key as the component's `Service::key`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.kind.key_prefix(), self.name)
    }
}

/// Snapshot of every required component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    /// True only if every required component answered.
    pub fn is_running(&self) -> bool {
        !self.components.is_empty() && self.components.iter().all(|c| c.up)
    }

    /// True only if no component answered.
    pub fn is_stopped(&self) -> bool {
        self.components.iter().all(|c| !c.up)
    }

    pub fn down(&self) -> Vec<&ComponentHealth> {
        self.components.iter().filter(|c| !c.up).collect()
    }

    pub fn up(&self) -> Vec<&ComponentHealth> {
        self.components.iter().filter(|c| c.up).collect()
    }

    fn count(&self, kind: ServiceKind) -> (usize, usize) {
        let of_kind = self.components.iter().filter(|c| c.kind == kind);
        let total = of_kind.clone().count();
        let up = of_kind.filter(|c| c.up).count();
        (up, total)
    }

    pub fn component(&self, kind: ServiceKind, name: &str) -> Option<&ComponentHealth> {
        self.components
            .iter()
            .find(|c| c.kind == kind && c.name == name)
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (brokers_up, brokers) = self.count(ServiceKind::Broker);
        let (services_up, services) = self.count(ServiceKind::Supervised);
        write!(
            f,
            "{brokers_up}/{brokers} brokers, {services_up}/{services} services up"
        )
    }
}

/// Read-only probe of brokers and supervised services.
#[derive(Clone)]
pub struct HealthCheck {
    procs: Arc<dyn ProcessControl>,
    queues: Arc<dyn QueueBackend>,
    store: HandleStore,
    brokers: Vec<BrokerInstance>,
    services: Vec<SupervisedService>,
}

impl HealthCheck {
    pub fn new(
        procs: Arc<dyn ProcessControl>,
        queues: Arc<dyn QueueBackend>,
        store: HandleStore,
        brokers: Vec<BrokerInstance>,
        services: Vec<SupervisedService>,
    ) -> Self {
        Self {
            procs,
            queues,
            store,
            brokers,
            services,
        }
    }

    /// Probe every component.
    pub async fn probe(&self) -> HealthReport {
        let mut components = Vec::with_capacity(self.brokers.len() + self.services.len());

        for broker in &self.brokers {
            components.push(ComponentHealth {
                name: broker.name().to_string(),
                kind: ServiceKind::Broker,
                up: broker.is_reachable(self.queues.as_ref()).await,
            });
        }
        for svc in &self.services {
            components.push(ComponentHealth {
                name: svc.name().to_string(),
                kind: ServiceKind::Supervised,
                up: svc.is_running(self.procs.as_ref(), &self.store).await,
            });
        }

        let report = HealthReport { components };
        tracing::debug!(summary = %report, "Health probed");
        report
    }

    /// Whether the whole stack is considered running.
    pub async fn is_running(&self) -> bool {
        self.probe().await.is_running()
    }
}
