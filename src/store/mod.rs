//! Data store seam used by the migration runner.
//!
//! # Data Flow
//! ```text
//! MigrationRunner
//!     → MigrationStore::prepare_ledger / applied_units / apply_unit
//!     → postgres.rs (sqlx pool, one transaction per unit)
//!     → memory.rs (in-process, for tests and dry runs)
//! ```
//!
//! # Design Decisions
//! - Applying a unit and recording it in the ledger is one store call
//! - A ledger is a table of applied unit names, one per migration set

pub mod memory;
pub mod postgres;

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::migration::MigrationUnit;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors reported by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Rejected(String),
}

/// Outcome of a failed [`MigrationStore::apply_unit`].
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The script itself failed; nothing was recorded.
    #[error("script failed: {0}")]
    Script(#[source] StoreError),

    /// The script ran but the ledger entry could not be written.
    #[error("recording failed: {0}")]
    Record(#[source] StoreError),
}

/// Opaque handle on the data store: execute scripts, keep the ledger.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Create the ledger if it does not exist yet.
    async fn prepare_ledger(&self, ledger: &str) -> Result<(), StoreError>;

    /// Names of units already recorded in `ledger`.
    async fn applied_units(&self, ledger: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Run the unit's script and record it in `ledger` as one step.
    async fn apply_unit(&self, ledger: &str, unit: &MigrationUnit) -> Result<(), ApplyError>;
}
