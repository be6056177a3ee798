//! Backend service entry point.
//!
//! # Startup Order
//!
//! ```text
//! CLI args → config (.config.toml + APP_* env) → logging
//!     → metrics exporter → database → migrations (schema, then seed)
//!     → listener → ready → serve
//! ```
//!
//! SIGINT/SIGTERM flips readiness and drains open connections within
//! `server.shutdown_timeout`. Any fatal error exits with status 1.

use std::path::PathBuf;
use std::process::ExitCode;

use axum::Router;
use clap::Parser;

use app_backend::config::load_config;
use app_backend::lifecycle::startup;
use app_backend::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "app-backend")]
#[command(about = "Backend service with ordered migrations and graceful drain", long_about = None)]
struct Cli {
    /// Configuration file. Defaults to .config.toml in the working directory.
    #[arg(short, long, env = "APP_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match load_config(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("app-backend: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = init_logging(&loaded.config.observability) {
        eprintln!("app-backend: failed to initialize logging: {}", err);
        return ExitCode::FAILURE;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "app-backend starting");

    match startup::start(loaded, Router::new()).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "Fatal error");
            ExitCode::FAILURE
        }
    }
}
