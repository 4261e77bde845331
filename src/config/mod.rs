//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BatchConfig (validated, immutable)
//!     → handed to the server, dispatcher and transport at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BatchConfig, DispatchConfig, LimitsConfig, ListenerConfig, ObservabilityConfig, TimeoutConfig,
};
pub use validation::ValidationError;
