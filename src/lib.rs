//! Mail stack lifecycle controller.
//!
//! Brings a multi-process mail stack (broker instances plus supervised
//! workers) up in dependency order, tears it down with failed-queue
//! draining and orphan reclamation, and reports aggregate health.
//!
//! # Architecture Overview
//!
//! ```text
//!   mailstack {start|stop|restart|status|recover}
//!          │
//!          ▼
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ lifecycle::StackController                               │
//!   │   start:  brokers → tiers → ownership → poll(running)    │
//!   │   stop:   drain → tiers reversed → orphans → brokers     │
//!   │           → purge data → poll(stopped)                   │
//!   └───────┬──────────────┬───────────────┬───────────────────┘
//!           │              │               │
//!   ┌───────▼─────┐ ┌──────▼──────┐ ┌──────▼──────┐
//!   │  services   │ │    queue    │ │   health    │
//!   │ broker /    │ │ RESP client │ │ HealthCheck │
//!   │ supervised  │ │ + drain     │ │             │
//!   └───────┬─────┘ └─────────────┘ └─────────────┘
//!           │
//!   ┌───────▼─────────────────────────┐
//!   │ process: launch, track, signal  │
//!   └─────────────────────────────────┘
//!
//!   Cross-cutting: config, resilience (poll + backoff), observability
//! ```

// Core subsystems
pub mod config;
pub mod process;
pub mod queue;
pub mod services;

// Orchestration
pub mod health;
pub mod lifecycle;

// Cross-cutting concerns
pub mod observability;
pub mod resilience;

pub use config::StackConfig;
pub use lifecycle::{Command, CommandOutcome, ControlError, StackController};
