//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (queues reference existing brokers)
//! - Validate value ranges (timeouts > 0, ports unique)
//! - Detect duplicate component names
//! - Keep every tree deleted on stop away from `/` and from live directories
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: StackConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the controller

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::config::schema::StackConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no brokers configured")]
    NoBrokers,

    #[error("duplicate component name '{0}'")]
    DuplicateName(String),

    #[error("broker port {0} is used more than once")]
    DuplicatePort(u16),

    #[error("queue '{queue}' references unknown broker '{broker}'")]
    UnknownBroker { queue: String, broker: String },

    #[error("tier '{0}' has no services")]
    EmptyTier(String),

    #[error("'{0}' has an empty launch command")]
    EmptyCommand(String),

    #[error("timing.{0} must be greater than zero")]
    ZeroTiming(&'static str),

    #[error("ownership fixup enabled without user or group")]
    OwnershipWithoutOwner,

    #[error("{field} '{}' must be an absolute path without '..'", .path.display())]
    UnsafeDataPath { field: String, path: PathBuf },

    #[error("{field} must not be the filesystem root")]
    DataPathIsRoot { field: String },

    #[error(
        "{field} '{}' contains '{}', which would be deleted on stop",
        .path.display(),
        .protected.display()
    )]
    DataPathContains {
        field: String,
        path: PathBuf,
        protected: PathBuf,
    },
}

/// Check one directory that `stop` removes recursively.
fn check_deleted_tree(
    field: String,
    path: &Path,
    protected: &[&Path],
    errors: &mut Vec<ValidationError>,
) {
    let normal = path.is_absolute() && !path.components().any(|c| c == Component::ParentDir);
    if !normal {
        errors.push(ValidationError::UnsafeDataPath {
            field,
            path: path.to_path_buf(),
        });
        return;
    }
    if path.parent().is_none() {
        errors.push(ValidationError::DataPathIsRoot { field });
        return;
    }
    if let Some(hit) = protected.iter().find(|p| p.starts_with(path)) {
        errors.push(ValidationError::DataPathContains {
            field,
            path: path.to_path_buf(),
            protected: hit.to_path_buf(),
        });
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &StackConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.brokers.is_empty() {
        errors.push(ValidationError::NoBrokers);
    }

    let mut names = HashSet::new();
    let mut ports = HashSet::new();
    for broker in &config.brokers {
        if !names.insert(broker.name.as_str()) {
            errors.push(ValidationError::DuplicateName(broker.name.clone()));
        }
        if !ports.insert(broker.port) {
            errors.push(ValidationError::DuplicatePort(broker.port));
        }
        if broker.launch_command().is_empty() {
            errors.push(ValidationError::EmptyCommand(broker.name.clone()));
        }
    }

    // Services live in their own namespace; a broker and a service may share a name.
    let mut names = HashSet::new();
    for tier in &config.tiers {
        if tier.services.is_empty() {
            errors.push(ValidationError::EmptyTier(tier.name.clone()));
        }
        for svc in &tier.services {
            if !names.insert(svc.name.as_str()) {
                errors.push(ValidationError::DuplicateName(svc.name.clone()));
            }
        }
    }

    for queue in &config.queues {
        if config.broker(&queue.broker).is_none() {
            errors.push(ValidationError::UnknownBroker {
                queue: queue.name.clone(),
                broker: queue.broker.clone(),
            });
        }
    }

    let timing = &config.timing;
    let checks = [
        ("start_timeout_secs", timing.start_timeout_secs),
        ("stop_timeout_secs", timing.stop_timeout_secs),
        ("poll_base_ms", timing.poll_base_ms),
        ("poll_max_ms", timing.poll_max_ms),
        ("probe_timeout_ms", timing.probe_timeout_ms),
    ];
    for (field, value) in checks {
        if value == 0 {
            errors.push(ValidationError::ZeroTiming(field));
        }
    }

    let paths = &config.paths;
    let mut protected: Vec<&Path> = vec![paths.state_dir.as_path(), paths.log_dir.as_path()];
    protected.extend(config.tiers.iter().map(|t| t.working_dir.as_path()));
    protected.extend(config.brokers.iter().map(|b| b.config_path.as_path()));
    check_deleted_tree(
        "paths.broker_data_root".to_string(),
        &paths.broker_data_root,
        &protected,
        &mut errors,
    );
    for broker in &config.brokers {
        let data_dir = broker
            .data_dir
            .clone()
            .unwrap_or_else(|| paths.broker_data_root.join(&broker.name));
        check_deleted_tree(
            format!("data_dir of broker '{}'", broker.name),
            &data_dir,
            &protected,
            &mut errors,
        );
    }

    let ownership = &config.ownership;
    if ownership.enabled && ownership.user.is_none() && ownership.group.is_none() {
        errors.push(ValidationError::OwnershipWithoutOwner);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
