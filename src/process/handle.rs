//! Tracked process handles.
//!
//! # Responsibilities
//! - Describe a launched process (pid, process group, command, start time)
//! - Persist one record per component so a later `stop` finds what `start` launched
//!
//! # Design Decisions
//! - One JSON file per component, keyed `<kind>-<name>.json`
//! - A missing record is "not launched by us", never an error

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::process::ProcessError;

/// A process launched by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub pid: u32,
    /// Process group id; equal to `pid` for processes we launch.
    pub pgid: u32,
    pub command: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl ProcessHandle {
    pub fn new(pid: u32, command: Vec<String>) -> Self {
        Self {
            pid,
            pgid: pid,
            command,
            started_at: Utc::now(),
        }
    }
}

/// Directory of persisted handle records.
#[derive(Debug, Clone)]
pub struct HandleStore {
    dir: PathBuf,
}

impl HandleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Persist the handle for `key`, replacing any previous record.
    pub fn save(&self, key: &str, handle: &ProcessHandle) -> Result<(), ProcessError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.record_path(key);
        let body = serde_json::to_vec_pretty(handle)
            .map_err(|source| ProcessError::Record { path: path.clone(), source })?;
        fs::write(&path, body)?;
        Ok(())
    }

    /// Load the handle for `key`; `Ok(None)` when nothing was recorded.
    pub fn load(&self, key: &str) -> Result<Option<ProcessHandle>, ProcessError> {
        let path = self.record_path(key);
        let body = match fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let handle = serde_json::from_slice(&body)
            .map_err(|source| ProcessError::Record { path, source })?;
        Ok(Some(handle))
    }

    /// Load, treating a corrupt record as absent.
    pub fn load_lossy(&self, key: &str) -> Option<ProcessHandle> {
        match self.load(key) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring unreadable handle record");
                None
            }
        }
    }

    /// Remove the record for `key`; absence is fine.
    pub fn remove(&self, key: &str) -> Result<(), ProcessError> {
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = HandleStore::new(dir.path().join("run"));
        let handle = ProcessHandle::new(4242, vec!["supervise".into(), "crypto".into()]);

        assert_eq!(store.load("service-crypto").unwrap(), None);
        store.save("service-crypto", &handle).unwrap();
        assert_eq!(store.load("service-crypto").unwrap(), Some(handle));

        store.remove("service-crypto").unwrap();
        store.remove("service-crypto").unwrap();
        assert_eq!(store.load("service-crypto").unwrap(), None);
    }

    #[test]
    fn test_corrupt_record_is_lossy_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = HandleStore::new(dir.path());
        fs::write(dir.path().join("broker-message.json"), b"{not json").unwrap();

        assert!(matches!(
            store.load("broker-message"),
            Err(ProcessError::Record { .. })
        ));
        assert_eq!(store.load_lossy("broker-message"), None);
    }
}
