//! Backend service bootstrap library.
//!
//! Loads configuration, migrates the database, then serves an application
//! router behind a tracing and access-logging pipeline until a termination
//! signal starts a bounded graceful drain.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;

// Startup and storage
pub mod migration;
pub mod store;

// Cross-cutting concerns
pub mod health;
pub mod lifecycle;
pub mod observability;

pub use config::AppConfig;
pub use http::{HttpServer, Pipeline, TraceContext};
pub use lifecycle::{LifecycleError, LifecycleHandle, LifecycleState, ServiceLifecycle, Shutdown};
pub use migration::{MigrationReport, MigrationRunner};
pub use store::MigrationStore;
