//! Broker instances.
//!
//! # Responsibilities
//! - Launch one broker per logical queue, each with its own config and port
//! - Probe reachability
//! - Kill every broker together and wipe persisted data on stop
//!
//! # Design Decisions
//! - Brokers start independently; one failing does not block the others
//! - The data directory is the broker's working directory, so a repeated
//!   start reuses it instead of creating another

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::BrokerConfig;
use crate::process::{HandleStore, LaunchSpec, ProcessControl, TerminateOutcome};
use crate::queue::QueueBackend;
use crate::services::state::{Service, ServiceKind};
use crate::services::{ServiceError, StartOutcome};

/// One standalone in-memory broker process.
#[derive(Debug, Clone)]
pub struct BrokerInstance {
    pub service: Service,
    command: Vec<String>,
    endpoint: String,
    log_file: Option<PathBuf>,
}

impl BrokerInstance {
    pub fn new(config: &BrokerConfig, data_root: &Path, log_dir: &Path) -> Self {
        let data_dir = config
            .data_dir
            .clone()
            .unwrap_or_else(|| data_root.join(&config.name));
        Self {
            service: Service {
                name: config.name.clone(),
                working_dir: data_dir,
                tier: 0,
                kind: ServiceKind::Broker,
            },
            command: config.launch_command(),
            endpoint: config.endpoint(),
            log_file: Some(log_dir.join(format!("broker-{}.log", config.name))),
        }
    }

    pub fn name(&self) -> &str {
        &self.service.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn data_dir(&self) -> &Path {
        &self.service.working_dir
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            name: self.service.key(),
            program_and_args: self.command.clone(),
            working_dir: self.service.working_dir.clone(),
            log_file: self.log_file.clone(),
        }
    }

    pub async fn is_reachable(&self, queues: &dyn QueueBackend) -> bool {
        queues.ping(&self.endpoint).await
    }

    /// Launch the broker unless it already answers.
    pub async fn start(
        &self,
        procs: &dyn ProcessControl,
        queues: &dyn QueueBackend,
        store: &HandleStore,
    ) -> Result<StartOutcome, ServiceError> {
        if self.is_reachable(queues).await {
            info!(broker = self.name(), endpoint = %self.endpoint, "Broker already answering");
            return Ok(StartOutcome::AlreadyRunning);
        }
        if let Some(handle) = store.load_lossy(&self.service.key()) {
            if procs.is_alive(&handle).await {
                info!(broker = self.name(), pid = handle.pid, "Broker process alive, not launching again");
                return Ok(StartOutcome::AlreadyRunning);
            }
        }

        fs::create_dir_all(self.data_dir()).map_err(|source| ServiceError::DataDir {
            path: self.data_dir().to_path_buf(),
            source,
        })?;
        let handle = procs.launch(&self.launch_spec()).await?;
        store.save(&self.service.key(), &handle)?;
        Ok(StartOutcome::Launched(handle))
    }

    /// Delete this instance's persisted data.
    pub fn purge_data(&self) -> Result<bool, ServiceError> {
        remove_tree(self.data_dir())
    }
}

/// Terminate every broker: tracked handles first, then the generic pattern.
pub async fn stop_all(
    brokers: &[BrokerInstance],
    match_pattern: &str,
    procs: &dyn ProcessControl,
    store: &HandleStore,
) -> Result<TerminateOutcome, ServiceError> {
    let mut outcome = TerminateOutcome::AlreadyAbsent;
    for broker in brokers {
        if let Some(handle) = store.load_lossy(&broker.service.key()) {
            outcome = outcome.combine(procs.terminate(&handle).await);
        }
    }
    outcome = outcome.combine(procs.terminate_matching(match_pattern).await);

    if let TerminateOutcome::Failed(reason) = &outcome {
        warn!(pattern = match_pattern, reason = %reason, "Some brokers could not be terminated");
    }
    for broker in brokers {
        store.remove(&broker.service.key())?;
    }
    Ok(outcome)
}

/// Remove a directory tree; `Ok(false)` when it did not exist.
pub fn remove_tree(path: &Path) -> Result<bool, ServiceError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ServiceError::DataDir {
            path: path.to_path_buf(),
            source,
        }),
    }
}
