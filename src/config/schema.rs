//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener and connection timeouts.
    pub server: ServerConfig,

    /// PostgreSQL connection settings.
    pub database: DatabaseConfig,

    /// Migration directories and ledger tables.
    pub migration: MigrationConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// Listener port. Zero binds an ephemeral port.
    pub port: u16,

    /// Time allowed to read request headers, in seconds.
    pub read_timeout: u64,

    /// Time allowed for a handler to produce its response, in seconds.
    pub write_timeout: u64,

    /// Time an idle keep-alive connection is kept open, in seconds.
    pub idle_timeout: u64,

    /// Drain deadline after a termination signal, in seconds.
    pub shutdown_timeout: u64,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            read_timeout: 15,
            write_timeout: 15,
            idle_timeout: 60,
            shutdown_timeout: 30,
            max_connections: 10_000,
        }
    }
}

impl ServerConfig {
    /// Address string handed to the listener.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}

/// PostgreSQL connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub name: String,

    /// libpq sslmode (disable, allow, prefer, require, verify-ca, verify-full).
    pub ssl_mode: String,

    /// Connect timeout in seconds.
    pub conn_timeout: u64,

    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            name: "postgres".to_string(),
            ssl_mode: "disable".to_string(),
            conn_timeout: 5,
            max_connections: 10,
        }
    }
}

/// Migration sources and the ledger tables that record applied units.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Directory holding schema units.
    pub schema: PathBuf,

    /// Directory holding seed units.
    pub seed: PathBuf,

    /// Ledger table for the schema set.
    pub schema_table: String,

    /// Ledger table for the seed set.
    pub seed_table: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            schema: PathBuf::from("database/migration/schema"),
            seed: PathBuf::from("database/migration/seed"),
            schema_table: "gorp_schema".to_string(),
            seed_table: "gorp_seed".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Text for terminals, JSON for log shippers.
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Exporter address, only when the exporter is enabled.
    pub fn metrics_socket(&self) -> Option<SocketAddr> {
        self.metrics_enabled
            .then(|| self.metrics_address.parse().ok())
            .flatten()
    }
}
