//! Supervised worker services.
//!
//! # Responsibilities
//! - Launch one restart-supervisor per worker from its tier directory
//! - Stop it by tracked handle and by `supervise <name>` pattern
//! - Remove the supervisor lock after the supervisor is gone
//!
//! # Design Decisions
//! - Terminate before unlocking, so a lingering supervisor cannot recreate the lock
//! - A supervisor that could not be terminated keeps its lock and handle record
//! - A missing lock or process is "already clean", not an error
//! - Start is optimistic; the aggregate health check decides success

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::{ServiceConfig, TierConfig};
use crate::process::{HandleStore, LaunchSpec, ProcessControl, ProcessHandle, TerminateOutcome};
use crate::services::state::{Service, ServiceKind};
use crate::services::{ServiceError, StartOutcome};

/// Result of removing a lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    AlreadyAbsent,
    /// Left in place because its owner is still alive.
    Kept,
}

/// The `<parent>/<name>/supervise/lock` file of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorLock {
    path: PathBuf,
}

impl SupervisorLock {
    pub fn for_service(parent: &Path, name: &str) -> Self {
        Self {
            path: parent.join(name).join("supervise").join("lock"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn remove(&self) -> Result<RemoveOutcome, ServiceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(RemoveOutcome::Removed),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RemoveOutcome::AlreadyAbsent),
            Err(source) => Err(ServiceError::Lock {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// What `stop` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    pub terminate: TerminateOutcome,
    pub lock: RemoveOutcome,
}

/// One worker under a restart-supervisor.
#[derive(Debug, Clone)]
pub struct SupervisedService {
    pub service: Service,
    command: Vec<String>,
    pattern: String,
    lock: SupervisorLock,
    log_file: Option<PathBuf>,
}

impl SupervisedService {
    pub fn new(tier_index: usize, tier: &TierConfig, config: &ServiceConfig, log_dir: &Path) -> Self {
        Self {
            service: Service {
                name: config.name.clone(),
                working_dir: tier.working_dir.clone(),
                tier: tier_index + 1,
                kind: ServiceKind::Supervised,
            },
            command: config.launch_command(),
            pattern: config.pattern(),
            lock: SupervisorLock::for_service(&tier.working_dir, &config.name),
            log_file: Some(log_dir.join(format!("supervise-{}.log", config.name))),
        }
    }

    pub fn name(&self) -> &str {
        &self.service.name
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn lock(&self) -> &SupervisorLock {
        &self.lock
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            name: self.service.key(),
            program_and_args: self.command.clone(),
            working_dir: self.service.working_dir.clone(),
            log_file: self.log_file.clone(),
        }
    }

    async fn tracked(&self, procs: &dyn ProcessControl, store: &HandleStore) -> Option<ProcessHandle> {
        let handle = store.load_lossy(&self.service.key())?;
        procs.is_alive(&handle).await.then_some(handle)
    }

    /// Whether the supervisor is alive, by tracked handle or, failing that, by pattern.
    pub async fn is_running(&self, procs: &dyn ProcessControl, store: &HandleStore) -> bool {
        if self.tracked(procs, store).await.is_some() {
            return true;
        }
        !procs.find_matching(&self.pattern).await.is_empty()
    }

    /// Launch the supervisor unless one is already running.
    pub async fn start(
        &self,
        procs: &dyn ProcessControl,
        store: &HandleStore,
    ) -> Result<StartOutcome, ServiceError> {
        if self.is_running(procs, store).await {
            info!(service = self.name(), "Already running, not launching again");
            return Ok(StartOutcome::AlreadyRunning);
        }

        if self.lock.exists() {
            warn!(service = self.name(), lock = %self.lock.path().display(), "Removing stale supervisor lock");
            self.lock.remove()?;
        }

        let handle = procs.launch(&self.launch_spec()).await?;
        store.save(&self.service.key(), &handle)?;
        Ok(StartOutcome::Launched(handle))
    }

    /// Terminate the supervisor, then clear its lock and handle record.
    pub async fn stop(
        &self,
        procs: &dyn ProcessControl,
        store: &HandleStore,
    ) -> Result<StopOutcome, ServiceError> {
        let mut terminate = TerminateOutcome::AlreadyAbsent;
        if let Some(handle) = store.load_lossy(&self.service.key()) {
            terminate = procs.terminate(&handle).await;
        }
        // Also catches a supervisor launched outside this controller.
        terminate = terminate.combine(procs.terminate_matching(&self.pattern).await);

        if let TerminateOutcome::Failed(reason) = &terminate {
            warn!(
                service = self.name(),
                reason = %reason,
                lock = %self.lock.path().display(),
                "Supervisor termination failed, leaving its lock in place"
            );
            return Ok(StopOutcome {
                terminate,
                lock: RemoveOutcome::Kept,
            });
        }
        debug!(service = self.name(), outcome = ?terminate, "Supervisor stopped");

        let lock = self.lock.remove()?;
        store.remove(&self.service.key())?;
        Ok(StopOutcome { terminate, lock })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_layout() {
        let lock = SupervisorLock::for_service(Path::new("/srv/mail"), "crypto");
        assert_eq!(lock.path(), Path::new("/srv/mail/crypto/supervise/lock"));
    }

    #[test]
    fn test_lock_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SupervisorLock::for_service(dir.path(), "bundle");
        fs::create_dir_all(lock.path().parent().unwrap()).unwrap();
        fs::write(lock.path(), b"").unwrap();

        assert!(lock.exists());
        assert_eq!(lock.remove().unwrap(), RemoveOutcome::Removed);
        assert_eq!(lock.remove().unwrap(), RemoveOutcome::AlreadyAbsent);
    }

    /// Every process is alive and refuses signals.
    struct Stubborn;

    #[async_trait::async_trait]
    impl ProcessControl for Stubborn {
        async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandle, crate::process::ProcessError> {
            Ok(ProcessHandle::new(4242, spec.program_and_args.clone()))
        }
        async fn is_alive(&self, _: &ProcessHandle) -> bool {
            true
        }
        async fn exit_state(&self, _: &ProcessHandle) -> crate::process::ExitState {
            crate::process::ExitState::Running
        }
        async fn terminate(&self, _: &ProcessHandle) -> TerminateOutcome {
            TerminateOutcome::Failed("EPERM".into())
        }
        async fn find_matching(&self, _: &str) -> Vec<u32> {
            vec![4242]
        }
        async fn terminate_matching(&self, _: &str) -> TerminateOutcome {
            TerminateOutcome::Failed("EPERM".into())
        }
    }

    #[tokio::test]
    async fn test_failed_termination_keeps_lock_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = HandleStore::new(dir.path().join("run"));
        let tier = TierConfig {
            name: "mail".into(),
            working_dir: dir.path().to_path_buf(),
            services: vec![ServiceConfig::named("crypto")],
        };
        let svc = SupervisedService::new(0, &tier, &tier.services[0], dir.path());
        fs::create_dir_all(svc.lock().path().parent().unwrap()).unwrap();
        fs::write(svc.lock().path(), b"").unwrap();
        store
            .save(&svc.service.key(), &ProcessHandle::new(4242, svc.command.clone()))
            .unwrap();

        let outcome = svc.stop(&Stubborn, &store).await.unwrap();

        assert!(!outcome.terminate.is_success());
        assert_eq!(outcome.lock, RemoveOutcome::Kept);
        assert!(svc.lock().exists());
        assert!(store.load_lossy(&svc.service.key()).is_some());
    }

    #[test]
    fn test_service_from_config() {
        let tier = TierConfig {
            name: "mail".into(),
            working_dir: PathBuf::from("/srv/mail"),
            services: vec![ServiceConfig::named("crypto")],
        };
        let svc = SupervisedService::new(0, &tier, &tier.services[0], Path::new("/var/log/x"));
        assert_eq!(svc.service.tier, 1);
        assert_eq!(svc.pattern(), "supervise crypto");
        let spec = svc.launch_spec();
        assert_eq!(spec.program_and_args, vec!["supervise", "crypto"]);
        assert_eq!(spec.working_dir, PathBuf::from("/srv/mail"));
        assert_eq!(spec.log_file, Some(PathBuf::from("/var/log/x/supervise-crypto.log")));
    }
}
