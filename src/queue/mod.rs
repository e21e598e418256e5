//! Job-queue subsystem.
//!
//! # Data Flow
//! ```text
//! stop:
//!     drain.rs (for each configured queue, in order)
//!     → QueueBackend::clear_failed(queue, broker endpoint)
//!     → resp.rs (RESP round trips against the still-running broker)
//! ```
//!
//! # Design Decisions
//! - Failed jobs follow the RQ registry layout: ids in `rq:failed:<queue>`,
//!   job bodies in `rq:job:<id>`
//! - A queue that cannot be drained is logged and skipped

pub mod drain;
pub mod resp;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::queue::resp::{RespConnection, RespValue};

pub use drain::{DrainReport, QueueDrain};

/// Errors talking to a broker.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("cannot connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("broker {0} did not answer in time")]
    Timeout(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("broker error: {0}")]
    Server(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Broker operations the controller needs.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Whether the broker at `endpoint` answers.
    async fn ping(&self, endpoint: &str) -> bool;

    /// Remove failed entries of `queue`; returns how many jobs were removed.
    async fn clear_failed(&self, queue: &str, endpoint: &str) -> Result<usize, QueueError>;
}

/// Registry key listing failed job ids for a queue.
pub fn failed_registry_key(queue: &str) -> String {
    format!("rq:failed:{queue}")
}

/// Hash key holding one job.
pub fn job_key(id: &str) -> String {
    format!("rq:job:{id}")
}

/// `QueueBackend` speaking RESP to Redis-compatible brokers.
#[derive(Debug, Clone)]
pub struct RedisBackend {
    timeout: Duration,
}

impl RedisBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    async fn ping(&self, endpoint: &str) -> bool {
        let reply = match RespConnection::connect(endpoint, self.timeout).await {
            Ok(mut conn) => conn.command(&["PING"]).await,
            Err(e) => Err(e),
        };
        match reply {
            Ok(RespValue::Simple(pong)) => pong == "PONG",
            Ok(other) => {
                tracing::debug!(endpoint, reply = ?other, "Unexpected PING reply");
                false
            }
            Err(e) => {
                tracing::trace!(endpoint, error = %e, "Broker not reachable");
                false
            }
        }
    }

    async fn clear_failed(&self, queue: &str, endpoint: &str) -> Result<usize, QueueError> {
        let mut conn = RespConnection::connect(endpoint, self.timeout).await?;
        let registry = failed_registry_key(queue);

        let ids = conn
            .command(&["ZRANGE", &registry, "0", "-1"])
            .await?
            .into_strings()?;

        for id in &ids {
            conn.command(&["DEL", &job_key(id)]).await?.into_integer()?;
        }
        conn.command(&["DEL", &registry]).await?.into_integer()?;

        Ok(ids.len())
    }
}
