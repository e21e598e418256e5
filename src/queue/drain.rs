//! Failed-queue draining.
//!
//! # Responsibilities
//! - Clear failed entries of every configured queue before brokers go down
//! - Keep going when one queue cannot be drained

use std::sync::Arc;

use tracing::{info, warn};

use crate::queue::QueueBackend;

/// Outcome of draining one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub queue: String,
    pub endpoint: String,
    /// Jobs removed, or the error text when the drain failed.
    pub result: Result<usize, String>,
}

/// Drives `QueueBackend::clear_failed` across queues.
#[derive(Clone)]
pub struct QueueDrain {
    backend: Arc<dyn QueueBackend>,
}

impl QueueDrain {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self { backend }
    }

    /// Drain one queue; failures are logged and reported, never raised.
    pub async fn drain(&self, queue: &str, endpoint: &str) -> DrainReport {
        let result = match self.backend.clear_failed(queue, endpoint).await {
            Ok(removed) => {
                info!(queue, endpoint, removed, "Cleared failed queue");
                Ok(removed)
            }
            Err(e) => {
                warn!(queue, endpoint, error = %e, "Could not clear failed queue, continuing");
                Err(e.to_string())
            }
        };
        DrainReport {
            queue: queue.to_string(),
            endpoint: endpoint.to_string(),
            result,
        }
    }

    /// Drain `(queue, endpoint)` pairs in order.
    pub async fn drain_all<'a, I>(&self, queues: I) -> Vec<DrainReport>
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        let mut reports = Vec::new();
        for (queue, endpoint) in queues {
            reports.push(self.drain(queue, &endpoint).await);
        }
        reports
    }
}
