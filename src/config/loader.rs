//! Configuration loading from disk and the environment.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use envconfig::Envconfig;
use thiserror::Error;

use crate::config::schema::{AppConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = ".config.toml";

/// `APP_*` environment variables that override file values.
///
/// Each variable maps to one dotted key, e.g. `APP_SERVER_READ_TIMEOUT`
/// overrides `server.read_timeout`. Unset variables leave the file value.
#[derive(Envconfig, Debug, Default)]
pub struct EnvOverrides {
    #[envconfig(from = "APP_SERVER_HOST")]
    pub server_host: Option<String>,
    #[envconfig(from = "APP_SERVER_PORT")]
    pub server_port: Option<u16>,
    #[envconfig(from = "APP_SERVER_READ_TIMEOUT")]
    pub server_read_timeout: Option<u64>,
    #[envconfig(from = "APP_SERVER_WRITE_TIMEOUT")]
    pub server_write_timeout: Option<u64>,
    #[envconfig(from = "APP_SERVER_IDLE_TIMEOUT")]
    pub server_idle_timeout: Option<u64>,
    #[envconfig(from = "APP_SERVER_SHUTDOWN_TIMEOUT")]
    pub server_shutdown_timeout: Option<u64>,
    #[envconfig(from = "APP_SERVER_MAX_CONNECTIONS")]
    pub server_max_connections: Option<usize>,

    #[envconfig(from = "APP_DATABASE_HOST")]
    pub database_host: Option<String>,
    #[envconfig(from = "APP_DATABASE_PORT")]
    pub database_port: Option<u16>,
    #[envconfig(from = "APP_DATABASE_USERNAME")]
    pub database_username: Option<String>,
    #[envconfig(from = "APP_DATABASE_PASSWORD")]
    pub database_password: Option<String>,
    #[envconfig(from = "APP_DATABASE_NAME")]
    pub database_name: Option<String>,
    #[envconfig(from = "APP_DATABASE_SSL_MODE")]
    pub database_ssl_mode: Option<String>,
    #[envconfig(from = "APP_DATABASE_CONN_TIMEOUT")]
    pub database_conn_timeout: Option<u64>,
    #[envconfig(from = "APP_DATABASE_MAX_CONNECTIONS")]
    pub database_max_connections: Option<u32>,

    #[envconfig(from = "APP_MIGRATION_SCHEMA")]
    pub migration_schema: Option<PathBuf>,
    #[envconfig(from = "APP_MIGRATION_SEED")]
    pub migration_seed: Option<PathBuf>,
    #[envconfig(from = "APP_MIGRATION_SCHEMA_TABLE")]
    pub migration_schema_table: Option<String>,
    #[envconfig(from = "APP_MIGRATION_SEED_TABLE")]
    pub migration_seed_table: Option<String>,

    #[envconfig(from = "APP_OBSERVABILITY_LOG_LEVEL")]
    pub observability_log_level: Option<String>,
    #[envconfig(from = "APP_OBSERVABILITY_LOG_FORMAT")]
    pub observability_log_format: Option<LogFormat>,
    #[envconfig(from = "APP_OBSERVABILITY_METRICS_ENABLED")]
    pub observability_metrics_enabled: Option<bool>,
    #[envconfig(from = "APP_OBSERVABILITY_METRICS_ADDRESS")]
    pub observability_metrics_address: Option<String>,
}

fn overlay<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl EnvOverrides {
    /// Write every set variable over `config`.
    pub fn apply(self, config: &mut AppConfig) {
        let server = &mut config.server;
        overlay(&mut server.host, self.server_host);
        overlay(&mut server.port, self.server_port);
        overlay(&mut server.read_timeout, self.server_read_timeout);
        overlay(&mut server.write_timeout, self.server_write_timeout);
        overlay(&mut server.idle_timeout, self.server_idle_timeout);
        overlay(&mut server.shutdown_timeout, self.server_shutdown_timeout);
        overlay(&mut server.max_connections, self.server_max_connections);

        let database = &mut config.database;
        overlay(&mut database.host, self.database_host);
        overlay(&mut database.port, self.database_port);
        overlay(&mut database.username, self.database_username);
        overlay(&mut database.password, self.database_password);
        overlay(&mut database.name, self.database_name);
        overlay(&mut database.ssl_mode, self.database_ssl_mode);
        overlay(&mut database.conn_timeout, self.database_conn_timeout);
        overlay(&mut database.max_connections, self.database_max_connections);

        let migration = &mut config.migration;
        overlay(&mut migration.schema, self.migration_schema);
        overlay(&mut migration.seed, self.migration_seed);
        overlay(&mut migration.schema_table, self.migration_schema_table);
        overlay(&mut migration.seed_table, self.migration_seed_table);

        let observability = &mut config.observability;
        overlay(&mut observability.log_level, self.observability_log_level);
        overlay(&mut observability.log_format, self.observability_log_format);
        overlay(&mut observability.metrics_enabled, self.observability_metrics_enabled);
        overlay(&mut observability.metrics_address, self.observability_metrics_address);
    }
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Environment override rejected: {0}")]
    Env(#[from] envconfig::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A validated configuration and the file it came from, if any.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

/// Load configuration using the process environment for overrides.
///
/// An explicit path must exist. Without one, `.config.toml` in the working
/// directory is read when present and defaults are used otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    finish(explicit, EnvOverrides::init_from_env()?)
}

/// Load configuration with overrides taken from `env` instead of the process.
pub fn load_config_with_env(
    explicit: Option<&Path>,
    env: &HashMap<String, String>,
) -> Result<LoadedConfig, ConfigError> {
    finish(explicit, EnvOverrides::init_from_hashmap(env)?)
}

fn finish(explicit: Option<&Path>, overrides: EnvOverrides) -> Result<LoadedConfig, ConfigError> {
    let (mut config, source) = match explicit {
        Some(path) => (read_file(path)?, Some(path.to_path_buf())),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if path.is_file() {
                (read_file(&path)?, Some(path))
            } else {
                (AppConfig::default(), None)
            }
        }
    };

    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(LoadedConfig { config, source })
}

/// Parse a TOML document without touching the environment or validating.
pub fn parse_config(content: &str) -> Result<AppConfig, toml::de::Error> {
    toml::from_str(content)
}

fn read_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
