//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use mailstack::config::{
    BrokerConfig, OwnershipConfig, PathsConfig, QueueConfig, ServiceConfig, StackConfig,
    TierConfig, TimingConfig,
};
use mailstack::lifecycle::StackController;
use mailstack::process::matcher::command_matches;
use mailstack::process::{
    ExitState, LaunchSpec, ProcessControl, ProcessError, ProcessHandle, TerminateOutcome,
};
use mailstack::queue::resp::{read_value, RespValue};
use mailstack::queue::{QueueBackend, QueueError};

/// One observable side effect of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Launch(String),
    Terminate(String),
    TerminateMatching(String),
    Drain { queue: String, endpoint: String },
    /// Whether a watched lock file existed when its owner was signalled.
    LockAtTerminate { name: String, present: bool },
}

#[derive(Debug, Clone)]
struct FakeProc {
    name: String,
    cmdline: String,
}

#[derive(Default)]
struct World {
    next_pid: u32,
    procs: BTreeMap<u32, FakeProc>,
    /// endpoint → broker launch name (`broker-<name>`)
    endpoints: HashMap<String, String>,
    fail_launch: HashSet<String>,
    fail_terminate: HashSet<String>,
    failed_jobs: HashMap<String, usize>,
    watched_locks: HashMap<String, PathBuf>,
    events: Vec<Event>,
}

impl World {
    fn alive_named(&self, name: &str) -> bool {
        self.procs.values().any(|p| p.name == name)
    }
}

/// In-memory process table and broker set, recording every side effect.
///
/// Implements both `ProcessControl` and `QueueBackend` so drains and kills
/// land in one ordered event log.
#[derive(Clone)]
pub struct FakeStack {
    world: Arc<Mutex<World>>,
}

impl FakeStack {
    pub fn new(config: &StackConfig) -> Self {
        let world = World {
            next_pid: 1000,
            endpoints: config
                .brokers
                .iter()
                .map(|b| (b.endpoint(), format!("broker-{}", b.name)))
                .collect(),
            ..World::default()
        };
        Self {
            world: Arc::new(Mutex::new(world)),
        }
    }

    pub fn controller(&self, config: StackConfig) -> StackController {
        StackController::new(config, Arc::new(self.clone()), Arc::new(self.clone()))
    }

    pub fn events(&self) -> Vec<Event> {
        self.world.lock().unwrap().events.clone()
    }

    pub fn clear_events(&self) {
        self.world.lock().unwrap().events.clear();
    }

    pub fn launches(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Launch(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Make launches of `name` (e.g. `service-gpg`) fail to spawn.
    pub fn fail_launch(&self, name: &str) {
        self.world.lock().unwrap().fail_launch.insert(name.to_string());
    }

    /// Make signals to `name` fail and leave it running.
    pub fn fail_terminate(&self, name: &str) {
        self.world
            .lock()
            .unwrap()
            .fail_terminate
            .insert(name.to_string());
    }

    /// Record whether `lock` exists each time `name` is signalled.
    pub fn watch_lock(&self, name: &str, lock: &Path) {
        self.world
            .lock()
            .unwrap()
            .watched_locks
            .insert(name.to_string(), lock.to_path_buf());
    }

    pub fn set_failed_jobs(&self, queue: &str, count: usize) {
        self.world
            .lock()
            .unwrap()
            .failed_jobs
            .insert(queue.to_string(), count);
    }

    pub fn failed_jobs(&self, queue: &str) -> usize {
        self.world
            .lock()
            .unwrap()
            .failed_jobs
            .get(queue)
            .copied()
            .unwrap_or(0)
    }

    /// Simulate a process this controller never launched.
    pub fn spawn_foreign(&self, name: &str, cmdline: &str) -> u32 {
        let mut world = self.world.lock().unwrap();
        world.next_pid += 1;
        let pid = world.next_pid;
        world.procs.insert(
            pid,
            FakeProc {
                name: name.to_string(),
                cmdline: cmdline.to_string(),
            },
        );
        pid
    }

    /// Simulate a crash.
    pub fn kill(&self, name: &str) {
        self.world.lock().unwrap().procs.retain(|_, p| p.name != name);
    }

    pub fn is_alive(&self, name: &str) -> bool {
        self.world.lock().unwrap().alive_named(name)
    }

    pub fn alive_count(&self) -> usize {
        self.world.lock().unwrap().procs.len()
    }
}

#[async_trait]
impl ProcessControl for FakeStack {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandle, ProcessError> {
        let mut world = self.world.lock().unwrap();
        world.events.push(Event::Launch(spec.name.clone()));

        if world.fail_launch.contains(&spec.name) {
            return Err(ProcessError::Spawn {
                program: spec.program_and_args[0].clone(),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }

        world.next_pid += 1;
        let pid = world.next_pid;
        world.procs.insert(
            pid,
            FakeProc {
                name: spec.name.clone(),
                cmdline: spec.program_and_args.join(" "),
            },
        );
        Ok(ProcessHandle::new(pid, spec.program_and_args.clone()))
    }

    async fn is_alive(&self, handle: &ProcessHandle) -> bool {
        self.world.lock().unwrap().procs.contains_key(&handle.pid)
    }

    async fn exit_state(&self, handle: &ProcessHandle) -> ExitState {
        if self.world.lock().unwrap().procs.contains_key(&handle.pid) {
            ExitState::Running
        } else {
            ExitState::Exited { code: Some(1) }
        }
    }

    async fn terminate(&self, handle: &ProcessHandle) -> TerminateOutcome {
        let mut world = self.world.lock().unwrap();
        let Some(proc) = world.procs.get(&handle.pid).cloned() else {
            return TerminateOutcome::AlreadyAbsent;
        };
        world.events.push(Event::Terminate(proc.name.clone()));
        if let Some(lock) = world.watched_locks.get(&proc.name) {
            let present = lock.exists();
            world.events.push(Event::LockAtTerminate {
                name: proc.name.clone(),
                present,
            });
        }
        if world.fail_terminate.contains(&proc.name) {
            return TerminateOutcome::Failed("EPERM".into());
        }
        world.procs.remove(&handle.pid);
        TerminateOutcome::Terminated
    }

    async fn find_matching(&self, pattern: &str) -> Vec<u32> {
        let world = self.world.lock().unwrap();
        world
            .procs
            .iter()
            .filter(|(_, p)| command_matches(&p.cmdline, pattern))
            .map(|(pid, _)| *pid)
            .collect()
    }

    async fn terminate_matching(&self, pattern: &str) -> TerminateOutcome {
        let mut world = self.world.lock().unwrap();
        world
            .events
            .push(Event::TerminateMatching(pattern.to_string()));

        let matched: Vec<(u32, String)> = world
            .procs
            .iter()
            .filter(|(_, p)| command_matches(&p.cmdline, pattern))
            .map(|(pid, p)| (*pid, p.name.clone()))
            .collect();
        if matched.is_empty() {
            return TerminateOutcome::AlreadyAbsent;
        }

        let mut outcome = TerminateOutcome::Terminated;
        for (pid, name) in matched {
            if world.fail_terminate.contains(&name) {
                outcome = TerminateOutcome::Failed(format!("{name}: EPERM"));
            } else {
                world.procs.remove(&pid);
            }
        }
        outcome
    }
}

#[async_trait]
impl QueueBackend for FakeStack {
    async fn ping(&self, endpoint: &str) -> bool {
        let world = self.world.lock().unwrap();
        world
            .endpoints
            .get(endpoint)
            .map(|name| world.alive_named(name))
            .unwrap_or(false)
    }

    async fn clear_failed(&self, queue: &str, endpoint: &str) -> Result<usize, QueueError> {
        let mut world = self.world.lock().unwrap();
        world.events.push(Event::Drain {
            queue: queue.to_string(),
            endpoint: endpoint.to_string(),
        });

        let reachable = world
            .endpoints
            .get(endpoint)
            .map(|name| world.alive_named(name))
            .unwrap_or(false);
        if !reachable {
            return Err(QueueError::Connect {
                endpoint: endpoint.to_string(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }
        Ok(world.failed_jobs.remove(queue).unwrap_or(0))
    }
}

/// The stock stack layout rooted in a scratch directory, with short deadlines.
pub fn test_config(root: &Path) -> StackConfig {
    let mut brokers = Vec::new();
    for (name, port) in [("message", 6385), ("crypto", 6386), ("bundle", 6387), ("special", 6388)] {
        let mut broker = BrokerConfig::new(name, port);
        broker.config_path = root.join(format!("etc/{name}.conf"));
        brokers.push(broker);
    }

    let tier = |name: &str, dir: &str, services: &[&str]| TierConfig {
        name: name.to_string(),
        working_dir: root.join(dir),
        services: services.iter().map(|s| ServiceConfig::named(s)).collect(),
    };

    StackConfig {
        paths: PathsConfig {
            state_dir: root.join("run"),
            log_dir: root.join("log"),
            broker_data_root: root.join("redis"),
        },
        brokers,
        broker_match_pattern: "redis-server".to_string(),
        tiers: vec![
            tier("mail", "daemon/mail", &["crypto", "message", "bundle"]),
            tier("key-exchange", "daemon/oce", &["gpg"]),
            tier("system", "daemon/system", &["special", "check-updates"]),
        ],
        queues: vec![
            QueueConfig::new("message", "message"),
            QueueConfig::new("crypto", "crypto"),
            QueueConfig::new("special", "special"),
        ],
        orphan_patterns: vec!["rqworker".to_string()],
        ownership: OwnershipConfig {
            enabled: false,
            ..OwnershipConfig::default()
        },
        timing: TimingConfig {
            start_timeout_secs: 1,
            stop_timeout_secs: 1,
            poll_base_ms: 5,
            poll_max_ms: 20,
            terminate_grace_ms: 200,
            probe_timeout_ms: 200,
        },
        observability: Default::default(),
    }
}

/// Start a programmable RESP server: `f` maps each command to its reply.
pub async fn start_resp_server<F>(f: F) -> SocketAddr
where
    F: Fn(Vec<String>) -> RespValue + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = socket.into_split();
                        let mut reader = BufReader::new(read);
                        while let Ok(request) = read_value(&mut reader).await {
                            let Ok(args) = request.into_strings() else {
                                break;
                            };
                            let reply = encode_reply(&f(args));
                            if write.write_all(&reply).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// A bound-then-released local port nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn encode_reply(value: &RespValue) -> Vec<u8> {
    match value {
        RespValue::Simple(s) => format!("+{s}\r\n").into_bytes(),
        RespValue::Error(s) => format!("-{s}\r\n").into_bytes(),
        RespValue::Integer(n) => format!(":{n}\r\n").into_bytes(),
        RespValue::Bulk(None) => b"$-1\r\n".to_vec(),
        RespValue::Bulk(Some(data)) => {
            let mut out = format!("${}\r\n", data.len()).into_bytes();
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
            out
        }
        RespValue::Array(None) => b"*-1\r\n".to_vec(),
        RespValue::Array(Some(items)) => {
            let mut out = format!("*{}\r\n", items.len()).into_bytes();
            for item in items {
                out.extend(encode_reply(item));
            }
            out
        }
    }
}

pub fn bulk(s: &str) -> RespValue {
    RespValue::Bulk(Some(s.as_bytes().to_vec()))
}
