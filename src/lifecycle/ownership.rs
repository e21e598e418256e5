//! Recursive ownership fixup on the shared log tree.
//!
//! Workers run as an unprivileged account and must be able to write the
//! logs the controller (often root) created. Every failure here is logged
//! and counted; none is fatal.

use std::fs;
use std::path::Path;

use nix::unistd::{chown, Gid, Group, Uid, User};
use tracing::{debug, warn};

use crate::config::OwnershipConfig;

/// Counts from one fixup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnershipReport {
    pub changed: usize,
    pub failed: usize,
}

/// Apply the configured owner to every path the globs match, recursively.
pub fn fix_ownership(config: &OwnershipConfig) -> OwnershipReport {
    let mut report = OwnershipReport::default();
    if !config.enabled {
        return report;
    }

    let Some((uid, gid)) = resolve_owner(config) else {
        report.failed += 1;
        return report;
    };

    for pattern in &config.paths {
        let entries = match glob::glob(pattern) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid ownership glob");
                report.failed += 1;
                continue;
            }
        };
        for entry in entries {
            match entry {
                Ok(path) => chown_tree(&path, uid, gid, &mut report),
                Err(e) => {
                    warn!(error = %e, "Unreadable path while expanding ownership glob");
                    report.failed += 1;
                }
            }
        }
    }
    report
}

fn resolve_owner(config: &OwnershipConfig) -> Option<(Option<Uid>, Option<Gid>)> {
    let uid = match &config.user {
        Some(name) => match User::from_name(name) {
            Ok(Some(user)) => Some(user.uid),
            Ok(None) => {
                warn!(user = %name, "Unknown user, skipping ownership fixup");
                return None;
            }
            Err(e) => {
                warn!(user = %name, error = %e, "User lookup failed, skipping ownership fixup");
                return None;
            }
        },
        None => None,
    };
    let gid = match &config.group {
        Some(name) => match Group::from_name(name) {
            Ok(Some(group)) => Some(group.gid),
            Ok(None) => {
                warn!(group = %name, "Unknown group, skipping ownership fixup");
                return None;
            }
            Err(e) => {
                warn!(group = %name, error = %e, "Group lookup failed, skipping ownership fixup");
                return None;
            }
        },
        None => None,
    };
    Some((uid, gid))
}

fn chown_tree(path: &Path, uid: Option<Uid>, gid: Option<Gid>, report: &mut OwnershipReport) {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Path vanished during ownership fixup");
            return;
        }
    };
    // Links are left alone; chown would follow them out of the tree.
    if meta.file_type().is_symlink() {
        return;
    }

    match chown(path, uid, gid) {
        Ok(()) => report.changed += 1,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "chown failed");
            report.failed += 1;
        }
    }

    if meta.is_dir() {
        let children = match fs::read_dir(path) {
            Ok(children) => children,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot list directory");
                report.failed += 1;
                return;
            }
        };
        for child in children.flatten() {
            chown_tree(&child.path(), uid, gid, report);
        }
    }
}
