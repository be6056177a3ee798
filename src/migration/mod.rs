//! Schema and seed migrations.
//!
//! # Data Flow
//! ```text
//! migration.schema dir ─┐
//!                       ├→ unit.rs (parse Up sections, order by prefix)
//! migration.seed dir ───┘    → runner.rs (schema set, then seed set)
//!                               → MigrationStore (apply + record per unit)
//!                               → MigrationReport (logged, never fatal)
//! ```
//!
//! # Design Decisions
//! - A failing unit aborts the remaining units of its set, not the other set
//! - Units already in the ledger are skipped, so re-running is a no-op

pub mod runner;
pub mod unit;

pub use runner::{
    run_all, MigrationError, MigrationReport, MigrationRunResult, MigrationRunner,
    MigrationSet, MigrationSource,
};
pub use unit::{load_units, MigrationUnit};
