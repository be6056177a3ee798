//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize the metrics exporter when enabled
//! - Connect to the database (fatal on failure)
//! - Hand the store and router to the [`ServiceLifecycle`]
//!
//! # Design Decisions
//! - Fail fast: store connection errors are fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener is bound by the lifecycle, after migrations

use std::sync::Arc;

use axum::Router;

use crate::config::LoadedConfig;
use crate::lifecycle::service::{LifecycleError, LifecycleOptions, ServiceLifecycle};
use crate::observability::metrics;
use crate::store::PgStore;

/// Run the service described by `loaded` with the given application router.
///
/// Logging must already be initialized.
pub async fn start(loaded: LoadedConfig, router: Router) -> Result<(), LifecycleError> {
    let config = &loaded.config;

    match &loaded.source {
        Some(path) => tracing::info!(path = %path.display(), "Configuration loaded"),
        None => tracing::info!("No configuration file found, using defaults"),
    }

    if let Some(addr) = config.observability.metrics_socket() {
        if let Err(err) = metrics::init_metrics(addr) {
            tracing::warn!(error = %err, "Failed to start metrics exporter");
        }
    }

    let store = PgStore::connect(&config.database)
        .await
        .map_err(LifecycleError::StoreConnect)?;

    let options = LifecycleOptions::from_config(config);
    ServiceLifecycle::new(options, Arc::new(store), router)
        .run()
        .await
}
