//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! After start/stop commands are issued:
//!     → poll.rs (probe health until the expected state or the deadline)
//!     → backoff.rs (delay between probes, exponential with jitter)
//! ```
//!
//! # Design Decisions
//! - No fixed settle sleeps; return as soon as the condition holds
//! - Every wait has a deadline; a slow environment gets the full timeout
//! - Probes are never interrupted mid-flight; the deadline is checked between them

pub mod backoff;
pub mod poll;

pub use backoff::calculate_backoff;
pub use poll::{wait_until, PollPolicy, PollResult};
