//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems emit `tracing` events with structured fields
//!     → logging.rs (EnvFilter + fmt layer, human or JSON)
//!     → stderr
//!
//! The one-line command status goes to stdout, outside this pipeline.
//! ```
//!
//! # Design Decisions
//! - RUST_LOG overrides the configured level
//! - Logs never share stdout with the status line, so scripts can parse it

pub mod logging;

pub use logging::init_logging;
