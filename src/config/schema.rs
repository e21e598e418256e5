//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the stack
//! controller. All types derive Serde traits for deserialization from config
//! files, and `StackConfig::default()` describes the stock mail stack.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the mail-stack controller.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StackConfig {
    /// Filesystem locations owned or relied upon by the controller.
    pub paths: PathsConfig,

    /// Broker instances, one per logical queue.
    pub brokers: Vec<BrokerConfig>,

    /// Pattern matching every broker process (used to kill them together).
    pub broker_match_pattern: String,

    /// Supervised service tiers, in start order.
    pub tiers: Vec<TierConfig>,

    /// Job queues drained on shutdown.
    pub queues: Vec<QueueConfig>,

    /// Broad patterns for worker processes reclaimed on stop.
    pub orphan_patterns: Vec<String>,

    /// Ownership fixups applied after start.
    pub ownership: OwnershipConfig,

    /// Polling and termination timings.
    pub timing: TimingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        let project = PathBuf::from("/var/local/projects/goodcrypto/server/daemon");
        let mail_tier = project.join("mail");
        let oce_tier = project.join("oce");
        let system_tier = project.join("system");

        Self {
            paths: PathsConfig::default(),
            brokers: vec![
                BrokerConfig::new("message", 6385),
                BrokerConfig::new("crypto", 6386),
                BrokerConfig::new("bundle", 6387),
                BrokerConfig::new("special", 6388),
            ],
            broker_match_pattern: "redis-server".to_string(),
            tiers: vec![
                TierConfig {
                    name: "mail".to_string(),
                    working_dir: mail_tier,
                    services: vec![
                        ServiceConfig::named("crypto"),
                        ServiceConfig::named("message"),
                        ServiceConfig::named("bundle"),
                    ],
                },
                TierConfig {
                    name: "key-exchange".to_string(),
                    working_dir: oce_tier,
                    services: vec![ServiceConfig::named("gpg")],
                },
                TierConfig {
                    name: "system".to_string(),
                    working_dir: system_tier,
                    services: vec![
                        ServiceConfig::named("special"),
                        ServiceConfig::named("check-updates"),
                    ],
                },
            ],
            queues: vec![
                QueueConfig::new("message", "message"),
                QueueConfig::new("crypto", "crypto"),
                QueueConfig::new("special", "special"),
            ],
            orphan_patterns: vec!["rqworker".to_string()],
            ownership: OwnershipConfig::default(),
            timing: TimingConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl StackConfig {
    /// Supervised services flattened in launch order, paired with their tier.
    pub fn services_in_start_order(&self) -> Vec<(&TierConfig, &ServiceConfig)> {
        self.tiers
            .iter()
            .flat_map(|tier| tier.services.iter().map(move |svc| (tier, svc)))
            .collect()
    }

    /// Look up a broker by name.
    pub fn broker(&self, name: &str) -> Option<&BrokerConfig> {
        self.brokers.iter().find(|b| b.name == name)
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding one handle record per launched process.
    pub state_dir: PathBuf,

    /// Directory receiving stdout/stderr of launched processes.
    pub log_dir: PathBuf,

    /// Root of all broker persisted data; deleted on stop.
    pub broker_data_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("/run/mailstack"),
            log_dir: PathBuf::from("/var/local/log/goodcrypto"),
            broker_data_root: PathBuf::from("/var/lib/redis/mailstack"),
        }
    }
}

/// One standalone broker process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    /// Logical name (also used for its handle record and log file).
    pub name: String,

    /// Dedicated broker config file.
    pub config_path: PathBuf,

    /// Host the broker listens on.
    #[serde(default = "default_broker_host")]
    pub host: String,

    /// TCP port the broker listens on.
    pub port: u16,

    /// Persisted data directory for this instance.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Launch command; defaults to `redis-server <config_path>`.
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_broker_host() -> String {
    "127.0.0.1".to_string()
}

impl BrokerConfig {
    /// Broker with stock config path and localhost endpoint.
    pub fn new(name: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            config_path: PathBuf::from(format!("/etc/redis/mailstack-{name}.conf")),
            host: default_broker_host(),
            port,
            data_dir: None,
            command: Vec::new(),
        }
    }

    /// Resolved launch command.
    pub fn launch_command(&self) -> Vec<String> {
        if self.command.is_empty() {
            vec![
                "redis-server".to_string(),
                self.config_path.display().to_string(),
            ]
        } else {
            self.command.clone()
        }
    }

    /// `host:port` endpoint; IPv6 literals are bracketed.
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// A group of supervised services sharing a working directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TierConfig {
    /// Tier name, for logging.
    pub name: String,

    /// Working directory the supervisor is launched from.
    pub working_dir: PathBuf,

    /// Services in launch order.
    pub services: Vec<ServiceConfig>,
}

/// One supervised worker.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service name; also the supervise directory name.
    pub name: String,

    /// Launch command; defaults to `supervise <name>`.
    #[serde(default)]
    pub command: Vec<String>,

    /// Command-line pattern identifying the supervisor; defaults to `supervise <name>`.
    #[serde(default)]
    pub match_pattern: Option<String>,
}

impl ServiceConfig {
    /// Service with the default supervise command.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            command: Vec::new(),
            match_pattern: None,
        }
    }

    pub fn launch_command(&self) -> Vec<String> {
        if self.command.is_empty() {
            vec!["supervise".to_string(), self.name.clone()]
        } else {
            self.command.clone()
        }
    }

    pub fn pattern(&self) -> String {
        self.match_pattern
            .clone()
            .unwrap_or_else(|| format!("supervise {}", self.name))
    }
}

/// A job queue and the broker backing it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Queue name as known to the job system.
    pub name: String,

    /// Name of the broker holding this queue.
    pub broker: String,
}

impl QueueConfig {
    pub fn new(name: &str, broker: &str) -> Self {
        Self {
            name: name.to_string(),
            broker: broker.to_string(),
        }
    }
}

/// Ownership fixup applied to the log tree after start.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OwnershipConfig {
    /// Enable the fixup.
    pub enabled: bool,

    /// Owning user name.
    pub user: Option<String>,

    /// Owning group name.
    pub group: Option<String>,

    /// Glob patterns; each match is changed recursively.
    pub paths: Vec<String>,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user: Some("goodcrypto".to_string()),
            group: Some("goodcrypto".to_string()),
            paths: vec!["/var/local/log/goodcrypto/*".to_string()],
        }
    }
}

/// Timing configuration for polling and termination.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Deadline for the stack to come up after `start`, in seconds.
    pub start_timeout_secs: u64,

    /// Deadline for the stack to go down after `stop`, in seconds.
    pub stop_timeout_secs: u64,

    /// Base delay between health polls in milliseconds.
    pub poll_base_ms: u64,

    /// Maximum delay between health polls in milliseconds.
    pub poll_max_ms: u64,

    /// Time a process group gets between SIGTERM and SIGKILL.
    pub terminate_grace_ms: u64,

    /// Timeout for a single broker probe or command.
    pub probe_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            start_timeout_secs: 30,
            stop_timeout_secs: 15,
            poll_base_ms: 100,
            poll_max_ms: 2000,
            terminate_grace_ms: 5000,
            probe_timeout_ms: 1000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
