//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .config.toml (or --config <path>)
//!     → loader.rs (parse & deserialize, APP_* overrides via envconfig)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → handed to startup and the lifecycle
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, LoadedConfig};
pub use schema::AppConfig;
pub use schema::DatabaseConfig;
pub use schema::LogFormat;
pub use schema::MigrationConfig;
pub use schema::ObservabilityConfig;
pub use schema::ServerConfig;
