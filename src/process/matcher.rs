//! Command-line pattern matching.
//!
//! A pattern matches when it occurs in the joined command line on word
//! boundaries, so `supervise crypto` does not match `supervise crypto-keys`
//! while `redis-server` still matches `/usr/bin/redis-server /etc/x.conf`.

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// Whether `cmdline` contains `pattern` on word boundaries.
pub fn command_matches(cmdline: &str, pattern: &str) -> bool {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return false;
    }

    cmdline.match_indices(pattern).any(|(start, _)| {
        let before = cmdline[..start].chars().next_back();
        let after = cmdline[start + pattern.len()..].chars().next();
        let left_ok = before.map_or(true, |c| c.is_whitespace() || c == '/');
        let right_ok = after.map_or(true, char::is_whitespace);
        left_ok && right_ok
    })
}

/// Snapshot of `(pid, command line)` for every process on the host.
pub fn process_table() -> Vec<(u32, String)> {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );

    let own_pid = std::process::id();
    sys.processes()
        .values()
        .filter(|p| p.thread_kind().is_none())
        .filter(|p| p.pid().as_u32() != own_pid)
        .map(|p| {
            let cmdline = p
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            (p.pid().as_u32(), cmdline)
        })
        .filter(|(_, cmdline)| !cmdline.is_empty())
        .collect()
}

/// Pids in `table` matching `pattern`, sorted.
pub fn matching_pids(table: &[(u32, String)], pattern: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = table
        .iter()
        .filter(|(_, cmdline)| command_matches(cmdline, pattern))
        .map(|(pid, _)| *pid)
        .collect();
    pids.sort_unstable();
    pids
}
