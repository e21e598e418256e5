//! Aggregate health.
//!
//! # Data Flow
//! ```text
//! HealthCheck::probe (check.rs):
//!     each broker  → QueueBackend::ping
//!     each service → tracked handle alive? else pattern match
//!     → HealthReport (derived on demand, never cached)
//! ```
//!
//! # Design Decisions
//! - "Running" means every required component answers
//! - An absent component is a negative result, never an error
//! - Probing is read-only; it never launches, signals or deletes

pub mod check;

pub use check::{ComponentHealth, HealthCheck, HealthReport};
