//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! DICE_CONFIG (optional TOML file)
//!     → loader.rs (parse & deserialize, defaults for missing sections)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → handed to lifecycle::run at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    ExporterKind, ListenerConfig, LogFormat, LoggingConfig, ServiceConfig, TelemetryConfig,
    TimeoutConfig,
};
