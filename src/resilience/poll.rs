//! Poll-with-timeout.
//!
//! # Responsibilities
//! - Re-run an async probe until it reports the wanted value
//! - Space probes with `calculate_backoff`
//! - Give up at the deadline and hand back the last observation

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::TimingConfig;
use crate::resilience::backoff::calculate_backoff;

/// How long and how often to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl PollPolicy {
    pub fn for_start(timing: &TimingConfig) -> Self {
        Self {
            timeout: Duration::from_secs(timing.start_timeout_secs),
            base_delay: Duration::from_millis(timing.poll_base_ms),
            max_delay: Duration::from_millis(timing.poll_max_ms),
        }
    }

    pub fn for_stop(timing: &TimingConfig) -> Self {
        Self {
            timeout: Duration::from_secs(timing.stop_timeout_secs),
            ..Self::for_start(timing)
        }
    }
}

/// Outcome of a poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult<T> {
    /// Whether the condition held before the deadline.
    pub satisfied: bool,
    /// The last value the probe produced.
    pub last: T,
    /// Number of probes run.
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Run `probe` until `done(&value)` holds or `policy.timeout` passes.
///
/// The probe always runs at least once, even with a zero timeout.
pub async fn wait_until<T, P, Fut, D>(policy: PollPolicy, mut probe: P, done: D) -> PollResult<T>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = T>,
    D: Fn(&T) -> bool,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempt = 0u32;

    loop {
        let value = probe().await;
        attempt += 1;

        if done(&value) {
            return PollResult {
                satisfied: true,
                last: value,
                attempts: attempt,
                elapsed: started.elapsed(),
            };
        }

        let now = Instant::now();
        if now >= deadline {
            return PollResult {
                satisfied: false,
                last: value,
                attempts: attempt,
                elapsed: started.elapsed(),
            };
        }

        let delay = calculate_backoff(attempt, policy.base_delay, policy.max_delay);
        tracing::trace!(attempt, delay_ms = delay.as_millis() as u64, "Condition not met, polling again");
        tokio::time::sleep(delay.min(deadline - now)).await;
    }
}
