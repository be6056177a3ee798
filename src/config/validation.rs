//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, pool sizes > 0)
//! - Reject ledger table names that are not plain SQL identifiers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

const SSL_MODES: &[&str] = &["disable", "allow", "prefer", "require", "verify-ca", "verify-full"];

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key}: {message}")]
pub struct ValidationError {
    pub key: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let server = &config.server;
    for (key, value) in [
        ("server.read_timeout", server.read_timeout),
        ("server.write_timeout", server.write_timeout),
        ("server.idle_timeout", server.idle_timeout),
        ("server.shutdown_timeout", server.shutdown_timeout),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(key, "must be greater than zero"));
        }
    }
    if server.max_connections == 0 {
        errors.push(ValidationError::new("server.max_connections", "must be greater than zero"));
    }
    if server.host.trim().is_empty() {
        errors.push(ValidationError::new("server.host", "must not be empty"));
    }

    let database = &config.database;
    if database.host.trim().is_empty() {
        errors.push(ValidationError::new("database.host", "must not be empty"));
    }
    if database.name.trim().is_empty() {
        errors.push(ValidationError::new("database.name", "must not be empty"));
    }
    if database.max_connections == 0 {
        errors.push(ValidationError::new("database.max_connections", "must be greater than zero"));
    }
    if !SSL_MODES.contains(&database.ssl_mode.as_str()) {
        errors.push(ValidationError::new(
            "database.ssl_mode",
            format!("'{}' is not one of {}", database.ssl_mode, SSL_MODES.join(", ")),
        ));
    }

    let migration = &config.migration;
    for (key, table) in [
        ("migration.schema_table", &migration.schema_table),
        ("migration.seed_table", &migration.seed_table),
    ] {
        if !is_identifier(table) {
            errors.push(ValidationError::new(key, format!("'{}' is not a valid table name", table)));
        }
    }
    if migration.schema_table == migration.seed_table {
        errors.push(ValidationError::new(
            "migration.seed_table",
            "must differ from migration.schema_table",
        ));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// ASCII letter or underscore, then letters, digits or underscores.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
