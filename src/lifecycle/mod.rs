//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (startup.rs):
//!     brokers (each independent) → tiers in order → ownership fixup
//!     → poll health until running or start deadline
//!
//! Stop (shutdown.rs):
//!     drain failed queues (brokers still up) → services in reverse start order
//!     → orphan reclamation → kill brokers → purge broker data
//!     → poll health until stopped or stop deadline
//!
//! Restart: stop, then start. No rollback if start fails.
//! Status:  health probe only.
//! Recover: relaunch whatever is not alive, then poll.
//! ```
//!
//! # Design Decisions
//! - Steps are sequential; a failed step is logged and the next one runs
//! - Only unexpected filesystem or record failures abort a command
//! - Success means the final health matches the intended state

pub mod controller;
pub mod ownership;
pub mod shutdown;
pub mod startup;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::health::HealthReport;
use crate::process::ProcessError;
use crate::services::ServiceError;

pub use controller::StackController;

/// Failures that abort a command.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Operator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Start,
    Stop,
    Restart,
    Status,
    Recover,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Restart => "restart",
            Command::Status => "status",
            Command::Recover => "recover",
        };
        f.write_str(text)
    }
}

/// Result of one command, rendered as the final status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub command: Command,
    /// Whether the stack ended in the state the command intended.
    pub success: bool,
    pub message: String,
    pub report: HealthReport,
}
