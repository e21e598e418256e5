//! Managed components.
//!
//! # Data Flow
//! ```text
//! StackConfig
//!     → broker.rs     (BrokerInstance per [[brokers]] entry, tier 0)
//!     → supervised.rs (SupervisedService per tier service, tiers 1..)
//!     → state.rs      (Service identity + ServiceState owned by the controller)
//! ```
//!
//! # Design Decisions
//! - Components never mutate their own ServiceState; the controller does
//! - Expected absence (no process, no lock, no data) is success
//! - Only unexpected filesystem failures surface as ServiceError

pub mod broker;
pub mod state;
pub mod supervised;

use std::path::PathBuf;

use thiserror::Error;

use crate::process::{ProcessError, ProcessHandle};

pub use broker::BrokerInstance;
pub use state::{Service, ServiceKind, ServiceState};
pub use supervised::{RemoveOutcome, StopOutcome, SupervisedService, SupervisorLock};

/// Errors raised by component start/stop.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("cannot remove supervisor lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("broker data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServiceError {
    /// A launch that failed to spawn; the rest of the start sequence goes on.
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            ServiceError::Process(
                ProcessError::EmptyCommand(_)
                    | ProcessError::MissingWorkingDir(_)
                    | ProcessError::Spawn { .. }
            )
        )
    }
}

/// What a start request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Launched(ProcessHandle),
    AlreadyRunning,
}
