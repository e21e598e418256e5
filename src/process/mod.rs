//! Process control subsystem.
//!
//! # Data Flow
//! ```text
//! launch (system.rs):
//!     LaunchSpec → spawn in own process group → ProcessHandle
//!     → handle.rs persists the handle under the state directory
//!
//! stop / health:
//!     handle.rs loads the recorded handle → signal / probe the process group
//!     matcher.rs scans command lines only for processes we never launched
//! ```
//!
//! # Design Decisions
//! - Launched processes are detached: the controller never waits on them
//! - Handles are tracked by pid + process group; pattern matching is the
//!   fallback for orphans, never the primary mechanism
//! - Termination is tri-state; an already-gone process is a success

pub mod handle;
pub mod matcher;
pub mod system;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use handle::{HandleStore, ProcessHandle};
pub use system::SystemProcesses;

/// Errors raised while launching or tracking processes.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("empty command for '{0}'")]
    EmptyCommand(String),

    #[error("working directory '{0}' does not exist")]
    MissingWorkingDir(PathBuf),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handle record {path}: {source}")]
    Record {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// What to launch and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Component name, for logging.
    pub name: String,
    /// Program followed by its arguments.
    pub program_and_args: Vec<String>,
    /// Directory the process starts in.
    pub working_dir: PathBuf,
    /// File receiving stdout and stderr; discarded when `None`.
    pub log_file: Option<PathBuf>,
}

/// Result of a terminate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// At least one process was signalled and is gone.
    Terminated,
    /// Nothing matched; already stopped.
    AlreadyAbsent,
    /// Signal delivery failed for a reason other than absence.
    Failed(String),
}

impl TerminateOutcome {
    /// Both `Terminated` and `AlreadyAbsent` leave the target stopped.
    pub fn is_success(&self) -> bool {
        !matches!(self, TerminateOutcome::Failed(_))
    }

    /// Merge two outcomes for the same target: any failure wins, then any termination.
    pub fn combine(self, other: TerminateOutcome) -> TerminateOutcome {
        use TerminateOutcome::*;
        match (self, other) {
            (Failed(a), Failed(b)) => Failed(format!("{a}; {b}")),
            (Failed(reason), _) | (_, Failed(reason)) => Failed(reason),
            (Terminated, _) | (_, Terminated) => Terminated,
            (AlreadyAbsent, AlreadyAbsent) => AlreadyAbsent,
        }
    }
}

/// Exit state of a launched process, as far as this controller can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Running,
    Exited { code: Option<i32> },
    /// Launched by another controller invocation; exit status unavailable.
    Untracked,
}

/// Operating-system process operations the controller depends on.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Start a detached process in its own process group.
    async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandle, ProcessError>;

    /// Whether the handle's process group still has a live leader.
    async fn is_alive(&self, handle: &ProcessHandle) -> bool;

    /// Exit status for processes launched by this controller instance.
    async fn exit_state(&self, handle: &ProcessHandle) -> ExitState;

    /// SIGTERM the handle's group, escalating to SIGKILL after the grace period.
    async fn terminate(&self, handle: &ProcessHandle) -> TerminateOutcome;

    /// Pids whose command line matches `pattern`.
    async fn find_matching(&self, pattern: &str) -> Vec<u32>;

    /// Terminate every process whose command line matches `pattern`.
    async fn terminate_matching(&self, pattern: &str) -> TerminateOutcome;
}
