//! Two-phase migration execution.
//!
//! The schema set always runs to completion (or to its first failure) before
//! the seed set starts. A failing unit stops the rest of its own set only;
//! the seed set still runs and the caller goes on to serve.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::MigrationConfig;
use crate::migration::unit::load_units;
use crate::observability::metrics;
use crate::store::{ApplyError, MigrationStore, StoreError};

/// Which of the two ordered sets a unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationSet {
    Schema,
    Seed,
}

impl MigrationSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationSet::Schema => "schema",
            MigrationSet::Seed => "seed",
        }
    }
}

impl fmt::Display for MigrationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a set's units live and which ledger records them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSource {
    pub set: MigrationSet,
    pub dir: PathBuf,
    pub ledger: String,
}

impl MigrationSource {
    pub fn schema(dir: impl Into<PathBuf>) -> Self {
        Self {
            set: MigrationSet::Schema,
            dir: dir.into(),
            ledger: MigrationConfig::default().schema_table,
        }
    }

    pub fn seed(dir: impl Into<PathBuf>) -> Self {
        Self {
            set: MigrationSet::Seed,
            dir: dir.into(),
            ledger: MigrationConfig::default().seed_table,
        }
    }

    pub fn with_ledger(mut self, ledger: impl Into<String>) -> Self {
        self.ledger = ledger.into();
        self
    }

    /// Both sources described by the migration config, schema first.
    pub fn from_config(config: &MigrationConfig) -> (Self, Self) {
        (
            Self::schema(&config.schema).with_ledger(&config.schema_table),
            Self::seed(&config.seed).with_ledger(&config.seed_table),
        )
    }
}

/// Why a set stopped early. Never fatal to the process.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("{set} migrations could not be read from {}: {source}", dir.display())]
    Source {
        set: MigrationSet,
        dir: PathBuf,
        source: io::Error,
    },

    #[error("{set} ledger {ledger} is unavailable: {source}")]
    Ledger {
        set: MigrationSet,
        ledger: String,
        source: StoreError,
    },

    #[error("{set} migration {unit} failed: {cause}")]
    Failure {
        set: MigrationSet,
        unit: String,
        #[source]
        cause: StoreError,
    },

    /// The script ran but the ledger does not know it. Needs an operator.
    #[error("{set} migration {unit} was applied but could not be recorded: {cause}")]
    Unrecorded {
        set: MigrationSet,
        unit: String,
        #[source]
        cause: StoreError,
    },
}

impl MigrationError {
    pub fn set(&self) -> MigrationSet {
        match self {
            MigrationError::Source { set, .. }
            | MigrationError::Ledger { set, .. }
            | MigrationError::Failure { set, .. }
            | MigrationError::Unrecorded { set, .. } => *set,
        }
    }

    /// The unit that failed, when a single unit is to blame.
    pub fn unit(&self) -> Option<&str> {
        match self {
            MigrationError::Failure { unit, .. } | MigrationError::Unrecorded { unit, .. } => {
                Some(unit)
            }
            _ => None,
        }
    }
}

/// Result of running one set.
#[derive(Debug, Default)]
pub struct MigrationRunResult {
    /// Units applied by this run, including those before a failure.
    pub applied_count: usize,
    pub error: Option<MigrationError>,
}

impl MigrationRunResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Results of both sets.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub schema: MigrationRunResult,
    pub seed: MigrationRunResult,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.schema.is_success() && self.seed.is_success()
    }

    pub fn errors(&self) -> impl Iterator<Item = &MigrationError> {
        self.schema.error.iter().chain(self.seed.error.iter())
    }
}

/// Applies migration sets against a store.
pub struct MigrationRunner<'a> {
    store: &'a dyn MigrationStore,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(store: &'a dyn MigrationStore) -> Self {
        Self { store }
    }

    /// Run `schema`, then `seed`, regardless of how `schema` went.
    pub async fn run_all(&self, schema: &MigrationSource, seed: &MigrationSource) -> MigrationReport {
        let schema = self.run_set(schema).await;
        let seed = self.run_set(seed).await;
        MigrationReport { schema, seed }
    }

    /// Apply the pending units of one set in order, stopping at the first failure.
    pub async fn run_set(&self, source: &MigrationSource) -> MigrationRunResult {
        let set = source.set;
        let mut result = MigrationRunResult::default();

        if let Err(error) = self.apply_pending(source, &mut result.applied_count).await {
            tracing::error!(
                set = %set,
                applied = result.applied_count,
                error = %error,
                "Failed to migrate {}", set
            );
            metrics::record_migration_failure(set.as_str());
            result.error = Some(error);
        } else {
            tracing::info!(set = %set, applied = result.applied_count, "{} successfully migrated", set);
        }

        metrics::record_migrations_applied(set.as_str(), result.applied_count);
        result
    }

    async fn apply_pending(
        &self,
        source: &MigrationSource,
        applied_count: &mut usize,
    ) -> Result<(), MigrationError> {
        let set = source.set;
        let units = load_units(&source.dir).map_err(|e| MigrationError::Source {
            set,
            dir: source.dir.clone(),
            source: e,
        })?;

        let ledger_error = |e: StoreError| MigrationError::Ledger {
            set,
            ledger: source.ledger.clone(),
            source: e,
        };
        self.store
            .prepare_ledger(&source.ledger)
            .await
            .map_err(ledger_error)?;
        let applied = self
            .store
            .applied_units(&source.ledger)
            .await
            .map_err(ledger_error)?;

        for unit in units.iter().filter(|u| !applied.contains(&u.name)) {
            match self.store.apply_unit(&source.ledger, unit).await {
                Ok(()) => {
                    *applied_count += 1;
                    tracing::debug!(set = %set, unit = %unit.name, "Applied migration");
                }
                Err(ApplyError::Script(cause)) => {
                    return Err(MigrationError::Failure {
                        set,
                        unit: unit.name.clone(),
                        cause,
                    })
                }
                Err(ApplyError::Record(cause)) => {
                    return Err(MigrationError::Unrecorded {
                        set,
                        unit: unit.name.clone(),
                        cause,
                    })
                }
            }
        }

        Ok(())
    }
}

/// Run both sets from their directories with the default ledgers.
pub async fn run_all(schema_dir: &Path, seed_dir: &Path, store: &dyn MigrationStore) -> MigrationReport {
    MigrationRunner::new(store)
        .run_all(&MigrationSource::schema(schema_dir), &MigrationSource::seed(seed_dir))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::fs;

    fn write(dir: &Path, name: &str) {
        fs::write(dir.join(name), format!("-- +migrate Up\nSELECT '{}';\n", name)).unwrap();
    }

    #[tokio::test]
    async fn stops_set_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["1_a.sql", "2_b.sql", "3_c.sql"] {
            write(dir.path(), name);
        }
        let store = MemoryStore::new();
        store.fail_script("2_b.sql");

        let result = MigrationRunner::new(&store)
            .run_set(&MigrationSource::schema(dir.path()))
            .await;

        assert_eq!(result.applied_count, 1);
        let error = result.error.unwrap();
        assert_eq!(error.set(), MigrationSet::Schema);
        assert_eq!(error.unit(), Some("2_b.sql"));
        assert!(matches!(error, MigrationError::Failure { .. }));
        assert_eq!(store.recorded("gorp_schema"), vec!["1_a.sql"]);
        assert!(store.journal().iter().all(|a| a.unit != "3_c.sql"));
    }

    #[tokio::test]
    async fn failed_unit_is_retried_on_next_run() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1_a.sql");
        write(dir.path(), "2_b.sql");
        let store = MemoryStore::new();
        store.fail_script("1_a.sql");
        let source = MigrationSource::schema(dir.path());

        let first = MigrationRunner::new(&store).run_set(&source).await;
        assert_eq!(first.applied_count, 0);

        store.heal("1_a.sql");
        let second = MigrationRunner::new(&store).run_set(&source).await;
        assert!(second.is_success());
        assert_eq!(second.applied_count, 2);
    }

    #[tokio::test]
    async fn unrecorded_unit_is_an_inconsistency() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1_a.sql");
        let store = MemoryStore::new();
        store.fail_record("1_a.sql");

        let result = MigrationRunner::new(&store)
            .run_set(&MigrationSource::seed(dir.path()))
            .await;

        assert!(matches!(result.error, Some(MigrationError::Unrecorded { set: MigrationSet::Seed, .. })));
        assert_eq!(store.journal().len(), 1);
    }

    #[tokio::test]
    async fn missing_directory_is_reported_not_raised() {
        let store = MemoryStore::new();
        let result = MigrationRunner::new(&store)
            .run_set(&MigrationSource::schema("/nonexistent/schema"))
            .await;

        assert!(matches!(result.error, Some(MigrationError::Source { .. })));
        assert_eq!(result.applied_count, 0);
    }

    #[tokio::test]
    async fn unavailable_ledger_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1_a.sql");
        let store = MemoryStore::new();
        store.make_unavailable("custom");

        let result = MigrationRunner::new(&store)
            .run_set(&MigrationSource::schema(dir.path()).with_ledger("custom"))
            .await;

        assert!(matches!(result.error, Some(MigrationError::Ledger { ref ledger, .. }) if ledger == "custom"));
    }

    #[test]
    fn sources_from_config() {
        let config = MigrationConfig {
            schema_table: "s_ledger".into(),
            ..MigrationConfig::default()
        };
        let (schema, seed) = MigrationSource::from_config(&config);
        assert_eq!(schema.set, MigrationSet::Schema);
        assert_eq!(schema.ledger, "s_ledger");
        assert_eq!(seed.ledger, "gorp_seed");
        assert_eq!(seed.dir, config.seed);
    }
}
