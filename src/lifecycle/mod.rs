//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Metrics → Store connect → ServiceLifecycle
//!
//! ServiceLifecycle (service.rs, state.rs):
//!     Migrate → Bind → Ready → Serve → Not ready → Drain → Stop
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT or LifecycleHandle::terminate → first trigger wins
//! ```
//!
//! # Design Decisions
//! - Migrations finish before the listener is bound
//! - Readiness flips before the drain starts
//! - Shutdown has timeout: forced exit after deadline

pub mod service;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use service::{LifecycleError, LifecycleOptions, ServiceLifecycle};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::spawn_signal_watcher;
pub use startup::start;
pub use state::{LifecycleHandle, LifecycleState, MigrationOutcome};
