//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle (single writer)
//!     → state.rs (atomic Ready/NotReady)
//!     → HealthProbe handle (shared, read-only)
//!     → probe.rs (GET /healthz → 204 / 503)
//! ```

pub mod probe;
pub mod state;

pub use probe::{probe_router, HEALTH_PATH};
pub use state::{HealthProbe, HealthState, Readiness};
