//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, or built-in defaults)
//!     → validation.rs (semantic checks)
//!     → StackConfig (validated, immutable)
//!     → handed to StackController at construction
//! ```
//!
//! # Design Decisions
//! - Every path, port and tier is explicit configuration; nothing is a global
//! - Tier order in the file is the start order; stop is its exact reverse
//! - All fields have defaults to allow minimal configs

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, parse_config, ConfigError};
pub use schema::{
    BrokerConfig, ObservabilityConfig, OwnershipConfig, PathsConfig, QueueConfig, ServiceConfig,
    StackConfig, TierConfig, TimingConfig,
};
