//! The service lifecycle state machine.
//!
//! ```text
//! Init → Migrating → Starting → Serving → Draining → Stopped
//! ```
//!
//! Migration failures are logged and startup continues. A bind failure is
//! fatal. The first shutdown trigger flips readiness, stops accepting and
//! drains; the drain is bounded by a deadline.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;

use crate::config::AppConfig;
use crate::health::HealthProbe;
use crate::http::{
    HttpServer, Pipeline, RequestIdGenerator, ServerTimeouts, SharedAccessLogger,
    TracingAccessLogger,
};
use crate::lifecycle::signals::spawn_signal_watcher;
use crate::lifecycle::state::{LifecycleHandle, LifecycleState, MigrationOutcome, Shared};
use crate::migration::{MigrationRunner, MigrationSource};
use crate::net::{Listener, ListenerError};
use crate::store::MigrationStore;

/// Errors that stop the service.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Bind(#[from] ListenerError),

    #[error("Failed to connect to the database: {0}")]
    StoreConnect(#[source] sqlx::Error),

    #[error("Failed to install signal handlers: {0}")]
    Signal(#[source] io::Error),

    #[error("Drain did not finish within {deadline:?}; {in_flight} connections still open")]
    ForcedShutdownTimeout { deadline: Duration, in_flight: u64 },
}

/// Everything the lifecycle needs besides the store and router.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    pub bind_address: String,
    pub max_connections: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub drain_deadline: Duration,
    pub schema: MigrationSource,
    pub seed: MigrationSource,
    /// Install SIGINT/SIGTERM handlers. Off when embedding or testing.
    pub handle_signals: bool,
}

impl LifecycleOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let server = &config.server;
        let (schema, seed) = MigrationSource::from_config(&config.migration);
        Self {
            bind_address: server.bind_address(),
            max_connections: server.max_connections,
            read_timeout: server.read_timeout(),
            write_timeout: server.write_timeout(),
            idle_timeout: server.idle_timeout(),
            drain_deadline: server.shutdown_timeout(),
            schema,
            seed,
            handle_signals: true,
        }
    }
}

/// Drives one run of the service from migration to stop.
pub struct ServiceLifecycle {
    options: LifecycleOptions,
    store: Arc<dyn MigrationStore>,
    router: Router,
    access_logger: SharedAccessLogger,
    shared: Arc<Shared>,
}

impl ServiceLifecycle {
    /// `router` must not route `/healthz`; the readiness probe is mounted
    /// there when serving starts and a duplicate route panics.
    pub fn new(options: LifecycleOptions, store: Arc<dyn MigrationStore>, router: Router) -> Self {
        Self {
            options,
            store,
            router,
            access_logger: Arc::new(TracingAccessLogger),
            shared: Arc::new(Shared::new()),
        }
    }

    /// Replace the default access logger.
    pub fn with_access_logger(mut self, logger: SharedAccessLogger) -> Self {
        self.access_logger = logger;
        self
    }

    pub fn handle(&self) -> LifecycleHandle {
        LifecycleHandle::new(Arc::clone(&self.shared))
    }

    /// Run to completion. Always ends in [`LifecycleState::Stopped`].
    pub async fn run(self) -> Result<(), LifecycleError> {
        let shared = Arc::clone(&self.shared);
        let result = self.run_phases().await;
        shared.health.mark_not_ready();
        shared.publish(LifecycleState::Stopped);
        result
    }

    async fn run_phases(self) -> Result<(), LifecycleError> {
        let shared = &self.shared;
        let options = &self.options;

        shared.publish(LifecycleState::Migrating);
        let report = MigrationRunner::new(self.store.as_ref())
            .run_all(&options.schema, &options.seed)
            .await;
        if !report.is_success() {
            tracing::warn!(
                failed_sets = report.errors().count(),
                "Continuing startup with incomplete migrations"
            );
        }
        let _ = shared.outcome.set(MigrationOutcome::from(&report));

        shared.publish(LifecycleState::Starting);
        let listener = Listener::bind(&options.bind_address, options.max_connections).await?;
        if let Ok(addr) = listener.local_addr() {
            let _ = shared.local_addr.set(addr);
        }

        let pipeline = Pipeline::builder()
            .tracing(Arc::new(RequestIdGenerator::new()))
            .access_log(Arc::clone(&self.access_logger))
            .write_timeout(options.write_timeout)
            .build();
        let server = HttpServer::new(
            self.router,
            &pipeline,
            HealthProbe::new(Arc::clone(&shared.health)),
            ServerTimeouts {
                read: options.read_timeout,
                idle: options.idle_timeout,
            },
        );

        let watcher = if options.handle_signals {
            Some(spawn_signal_watcher(shared.shutdown.clone()).map_err(LifecycleError::Signal)?)
        } else {
            None
        };

        let mut shutdown = shared.shutdown.subscribe();
        shared.health.mark_ready();
        shared.publish(LifecycleState::Serving);

        tokio::select! {
            _ = server.accept_loop(&listener) => {}
            _ = shutdown.recv() => {}
        }

        // Readiness goes first so probes fail before connections start closing.
        shared.health.mark_not_ready();
        shared.publish(LifecycleState::Draining);
        drop(listener);
        server.begin_drain();

        let drained = tokio::time::timeout(options.drain_deadline, server.wait_drained()).await;

        if let Some(watcher) = watcher {
            watcher.abort();
        }

        match drained {
            Ok(()) => {
                tracing::info!("All connections drained");
                Ok(())
            }
            Err(_) => {
                let in_flight = server.open_connections();
                tracing::warn!(
                    deadline = ?options.drain_deadline,
                    in_flight,
                    "Drain deadline reached, forcing shutdown"
                );
                Err(LifecycleError::ForcedShutdownTimeout {
                    deadline: options.drain_deadline,
                    in_flight,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn options(dir: &std::path::Path) -> LifecycleOptions {
        LifecycleOptions {
            bind_address: "127.0.0.1:0".into(),
            max_connections: 64,
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            drain_deadline: Duration::from_secs(5),
            schema: MigrationSource::schema(dir.join("schema")),
            seed: MigrationSource::seed(dir.join("seed")),
            handle_signals: false,
        }
    }

    #[test]
    fn options_follow_config() {
        let mut config = AppConfig::default();
        config.server.host = "127.0.0.1".into();
        config.server.port = 9000;
        config.server.shutdown_timeout = 12;
        config.migration.seed_table = "seed_ledger".into();

        let options = LifecycleOptions::from_config(&config);
        assert_eq!(options.bind_address, "127.0.0.1:9000");
        assert_eq!(options.drain_deadline, Duration::from_secs(12));
        assert_eq!(options.seed.ledger, "seed_ledger");
        assert!(options.handle_signals);
    }

    #[tokio::test]
    async fn missing_migration_dirs_do_not_stop_startup() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = ServiceLifecycle::new(
            options(dir.path()),
            Arc::new(MemoryStore::new()),
            Router::new(),
        );
        let handle = lifecycle.handle();
        let run = tokio::spawn(lifecycle.run());

        assert_eq!(handle.wait_for(LifecycleState::Serving).await, LifecycleState::Serving);
        assert!(handle.health().is_ready());
        assert_eq!(handle.migration_outcome().unwrap().failures.len(), 2);

        assert!(handle.terminate().await >= LifecycleState::Draining);
        assert!(!handle.health().is_ready());
        run.await.unwrap().unwrap();
        assert_eq!(handle.state(), LifecycleState::Stopped);
    }
}
