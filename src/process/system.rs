//! `ProcessControl` backed by the host operating system.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::process::matcher::{matching_pids, process_table};
use crate::process::{
    ExitState, LaunchSpec, ProcessControl, ProcessError, ProcessHandle, TerminateOutcome,
};

const TERMINATE_POLL: Duration = Duration::from_millis(100);

/// Start-time tolerance when checking a recorded pid against pid reuse.
const START_TIME_TOLERANCE_SECS: i64 = 2;

/// Real processes, signals and command-line scans.
pub struct SystemProcesses {
    terminate_grace: Duration,
    /// Children spawned by this invocation, kept so their exit status can be read.
    children: Mutex<HashMap<u32, Child>>,
}

impl SystemProcesses {
    pub fn new(terminate_grace: Duration) -> Self {
        Self {
            terminate_grace,
            children: Mutex::new(HashMap::new()),
        }
    }

    fn open_log(spec: &LaunchSpec) -> Result<(Stdio, Stdio), ProcessError> {
        match &spec.log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                let err = file.try_clone()?;
                Ok((Stdio::from(file), Stdio::from(err)))
            }
            None => Ok((Stdio::null(), Stdio::null())),
        }
    }

    /// Reap our own child if it has exited, so a zombie is not reported alive.
    fn reap(&self, pid: u32) -> Option<ExitState> {
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        let child = children.get_mut(&pid)?;
        match child.try_wait() {
            Ok(Some(status)) => Some(ExitState::Exited {
                code: status.code(),
            }),
            Ok(None) => Some(ExitState::Running),
            Err(e) => {
                debug!(pid, error = %e, "try_wait failed");
                None
            }
        }
    }

    fn pid_exists(pid: u32) -> bool {
        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            // Exists but owned by someone else.
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn group_exists(pgid: u32) -> bool {
        match killpg(Pid::from_raw(pgid as i32), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    /// Guard against pid reuse: the live process must have started near the recorded time.
    fn start_time_matches(handle: &ProcessHandle) -> bool {
        let mut sys = System::new();
        let pid = sysinfo::Pid::from_u32(handle.pid);
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            false,
            ProcessRefreshKind::nothing(),
        );
        match sys.process(pid) {
            Some(process) => {
                let actual = process.start_time() as i64;
                let expected = handle.started_at.timestamp();
                (actual - expected).abs() <= START_TIME_TOLERANCE_SECS
            }
            // Cannot inspect; trust the signal probe.
            None => true,
        }
    }

    async fn wait_gone<F>(&self, gone: F) -> bool
    where
        F: Fn() -> bool,
    {
        let deadline = tokio::time::Instant::now() + self.terminate_grace;
        loop {
            if gone() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(TERMINATE_POLL).await;
        }
    }
}

#[async_trait]
impl ProcessControl for SystemProcesses {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandle, ProcessError> {
        let Some(program) = spec.program_and_args.first() else {
            return Err(ProcessError::EmptyCommand(spec.name.clone()));
        };
        if !spec.working_dir.is_dir() {
            return Err(ProcessError::MissingWorkingDir(spec.working_dir.clone()));
        }

        let (stdout, stderr) = Self::open_log(spec)?;
        let mut cmd = Command::new(program);
        cmd.args(&spec.program_and_args[1..])
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(false);
        // Own process group, so the whole tree can be signalled together.
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;
        let Some(pid) = child.id() else {
            return Err(ProcessError::Spawn {
                program: program.clone(),
                source: std::io::Error::other("child exited before its pid was read"),
            });
        };

        info!(name = %spec.name, pid, cwd = %spec.working_dir.display(), "Launched");
        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pid, child);
        Ok(ProcessHandle::new(pid, spec.program_and_args.clone()))
    }

    async fn is_alive(&self, handle: &ProcessHandle) -> bool {
        match self.reap(handle.pid) {
            Some(ExitState::Exited { .. }) => return false,
            Some(ExitState::Running) => return true,
            _ => {}
        }
        Self::pid_exists(handle.pid) && Self::start_time_matches(handle)
    }

    async fn exit_state(&self, handle: &ProcessHandle) -> ExitState {
        self.reap(handle.pid).unwrap_or(ExitState::Untracked)
    }

    async fn terminate(&self, handle: &ProcessHandle) -> TerminateOutcome {
        if !self.is_alive(handle).await {
            // Leader gone: only signal leftover group members, never a reused pid.
            if Self::pid_exists(handle.pid) || !Self::group_exists(handle.pgid) {
                return TerminateOutcome::AlreadyAbsent;
            }
        }

        let pgid = Pid::from_raw(handle.pgid as i32);
        match killpg(pgid, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return TerminateOutcome::AlreadyAbsent,
            Err(e) => {
                warn!(pgid = handle.pgid, error = %e, "SIGTERM to process group failed");
                return TerminateOutcome::Failed(e.to_string());
            }
        }

        let group_gone = || {
            self.reap(handle.pid);
            !Self::group_exists(handle.pgid)
        };
        if self.wait_gone(group_gone).await {
            debug!(pgid = handle.pgid, "Process group terminated");
            return TerminateOutcome::Terminated;
        }

        warn!(pgid = handle.pgid, "Process group ignored SIGTERM, sending SIGKILL");
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {
                self.reap(handle.pid);
                TerminateOutcome::Terminated
            }
            Err(e) => TerminateOutcome::Failed(e.to_string()),
        }
    }

    async fn find_matching(&self, pattern: &str) -> Vec<u32> {
        let table = tokio::task::spawn_blocking(process_table)
            .await
            .unwrap_or_default();
        matching_pids(&table, pattern)
    }

    async fn terminate_matching(&self, pattern: &str) -> TerminateOutcome {
        let pids = self.find_matching(pattern).await;
        if pids.is_empty() {
            return TerminateOutcome::AlreadyAbsent;
        }

        info!(pattern, count = pids.len(), "Terminating matching processes");
        let mut failures = Vec::new();
        for &pid in &pids {
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => failures.push(format!("{pid}: {e}")),
            }
        }

        let all_gone = || {
            pids.iter().all(|&pid| {
                self.reap(pid);
                !Self::pid_exists(pid)
            })
        };
        if !self.wait_gone(all_gone).await {
            for &pid in &pids {
                if Self::pid_exists(pid) {
                    warn!(pid, pattern, "Process ignored SIGTERM, sending SIGKILL");
                    match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                        Ok(()) | Err(Errno::ESRCH) => {}
                        Err(e) => failures.push(format!("{pid}: {e}")),
                    }
                }
            }
        }
        if failures.is_empty() {
            TerminateOutcome::Terminated
        } else {
            TerminateOutcome::Failed(failures.join(", "))
        }
    }
}
