//! Component identity and lifecycle state.
//!
//! # State Transitions
//! ```text
//! Stopped → Starting → Running
//!              ↓
//!            Failed            (stack not healthy before the start deadline)
//! Running/Failed/Starting → Stopping → Stopped
//!                               ↓
//!                         StoppingFailed (signal delivery failed)
//! ```

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// What kind of component a service is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Broker,
    Supervised,
}

impl ServiceKind {
    /// Prefix used for handle-record keys.
    pub fn key_prefix(self) -> &'static str {
        match self {
            ServiceKind::Broker => "broker",
            ServiceKind::Supervised => "service",
        }
    }
}

/// Static identity of a managed component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub name: String,
    pub working_dir: PathBuf,
    /// Start tier; brokers are tier 0, supervised tiers count from 1.
    pub tier: usize,
    pub kind: ServiceKind,
}

impl Service {
    /// Unique key across kinds, e.g. `broker-message`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.kind.key_prefix(), self.name)
    }
}

/// Runtime status of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Failed,
    Stopping,
    StoppingFailed,
}

impl ServiceState {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Stopped, Stopping)
                | (Starting, Running)
                | (Starting, Failed)
                | (Starting, Stopping)
                | (Running, Starting)
                | (Running, Stopping)
                | (Failed, Starting)
                | (Failed, Stopping)
                | (Stopping, Stopped)
                | (Stopping, StoppingFailed)
                | (StoppingFailed, Starting)
                | (StoppingFailed, Stopping)
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Failed => "failed",
            ServiceState::Stopping => "stopping",
            ServiceState::StoppingFailed => "stopping-failed",
        };
        f.write_str(text)
    }
}
