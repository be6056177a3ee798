//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use app_backend::http::{AccessLogger, AccessRecord};
use app_backend::lifecycle::{
    LifecycleError, LifecycleHandle, LifecycleOptions, LifecycleState, ServiceLifecycle,
};
use app_backend::migration::MigrationSource;
use app_backend::store::MigrationStore;
use axum::Router;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Access logger that keeps every record in memory.
#[derive(Debug, Default)]
pub struct CollectingLogger {
    records: Mutex<Vec<AccessRecord>>,
}

impl CollectingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<AccessRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AccessLogger for CollectingLogger {
    fn record(&self, record: &AccessRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// Schema and seed directories populated with the given units.
pub struct MigrationDirs {
    pub root: TempDir,
}

impl MigrationDirs {
    pub fn new(schema: &[(&str, &str)], seed: &[(&str, &str)]) -> Self {
        let root = tempfile::tempdir().unwrap();
        write_units(&root.path().join("schema"), schema);
        write_units(&root.path().join("seed"), seed);
        Self { root }
    }

    pub fn schema(&self) -> MigrationSource {
        MigrationSource::schema(self.root.path().join("schema"))
    }

    pub fn seed(&self) -> MigrationSource {
        MigrationSource::seed(self.root.path().join("seed"))
    }

    pub fn add_schema_unit(&self, name: &str, sql: &str) {
        fs::write(self.root.path().join("schema").join(name), sql).unwrap();
    }
}

fn write_units(dir: &Path, units: &[(&str, &str)]) {
    fs::create_dir_all(dir).unwrap();
    for (name, sql) in units {
        fs::write(dir.join(name), sql).unwrap();
    }
}

/// Options for a lifecycle on an ephemeral local port without signal handling.
pub fn test_options(dirs: &MigrationDirs) -> LifecycleOptions {
    LifecycleOptions {
        bind_address: "127.0.0.1:0".into(),
        max_connections: 1024,
        read_timeout: Duration::from_secs(5),
        write_timeout: Duration::from_secs(30),
        idle_timeout: Duration::from_secs(60),
        drain_deadline: Duration::from_secs(5),
        schema: dirs.schema(),
        seed: dirs.seed(),
        handle_signals: false,
    }
}

/// A lifecycle running on its own task.
pub struct RunningService {
    pub handle: LifecycleHandle,
    pub task: JoinHandle<Result<(), LifecycleError>>,
    pub base_url: String,
}

/// Start a lifecycle and wait until it serves.
pub async fn spawn_service(
    options: LifecycleOptions,
    store: Arc<dyn MigrationStore>,
    router: Router,
    logger: Arc<CollectingLogger>,
) -> RunningService {
    let lifecycle = ServiceLifecycle::new(options, store, router).with_access_logger(logger);
    let handle = lifecycle.handle();
    let task = tokio::spawn(lifecycle.run());

    let reached = tokio::time::timeout(
        Duration::from_secs(10),
        handle.wait_for(LifecycleState::Serving),
    )
    .await
    .expect("service did not start in time");
    assert_eq!(reached, LifecycleState::Serving);

    let addr = handle.local_addr().expect("listener address not published");
    RunningService {
        handle,
        task,
        base_url: format!("http://{}", addr),
    }
}

/// HTTP client that never goes through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}
