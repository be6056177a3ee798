//! Lifecycle state and the handle used to observe and stop a running service.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;

use crate::health::{HealthProbe, HealthState};
use crate::lifecycle::shutdown::Shutdown;
use crate::migration::MigrationReport;

/// Phases of a service run. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Init,
    Migrating,
    Starting,
    Serving,
    Draining,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Init => "init",
            LifecycleState::Migrating => "migrating",
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of the migration phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub schema_applied: usize,
    pub seed_applied: usize,
    /// One message per set that stopped early.
    pub failures: Vec<String>,
}

impl From<&MigrationReport> for MigrationOutcome {
    fn from(report: &MigrationReport) -> Self {
        Self {
            schema_applied: report.schema.applied_count,
            seed_applied: report.seed.applied_count,
            failures: report.errors().map(ToString::to_string).collect(),
        }
    }
}

/// State shared between a lifecycle and its handles.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: watch::Sender<LifecycleState>,
    pub(crate) local_addr: OnceLock<SocketAddr>,
    pub(crate) outcome: OnceLock<MigrationOutcome>,
    pub(crate) health: Arc<HealthState>,
    pub(crate) shutdown: Shutdown,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Init);
        Self {
            state,
            local_addr: OnceLock::new(),
            outcome: OnceLock::new(),
            health: Arc::new(HealthState::new()),
            shutdown: Shutdown::new(),
        }
    }

    pub(crate) fn publish(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(from = %previous, to = %next, "Lifecycle state changed");
        }
    }
}

/// Cloneable view of a running [`ServiceLifecycle`](crate::lifecycle::ServiceLifecycle).
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    shared: Arc<Shared>,
}

impl LifecycleHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn state(&self) -> LifecycleState {
        *self.shared.state.borrow()
    }

    /// Wait until the lifecycle has reached `target` or any later state.
    ///
    /// Returns the state observed, which may be past `target`.
    pub async fn wait_for(&self, target: LifecycleState) -> LifecycleState {
        let mut rx = self.shared.state.subscribe();
        // `shared` owns the sender, so the channel stays open while we wait.
        rx.wait_for(|state| *state >= target)
            .await
            .map(|state| *state)
            .unwrap_or_else(|_| *self.shared.state.borrow())
    }

    /// Address the listener is bound to, once it is bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.local_addr.get().copied()
    }

    /// Read-only access to readiness.
    pub fn health(&self) -> HealthProbe {
        HealthProbe::new(Arc::clone(&self.shared.health))
    }

    /// Migration results, once the migration phase has finished.
    pub fn migration_outcome(&self) -> Option<MigrationOutcome> {
        self.shared.outcome.get().cloned()
    }

    /// Request a graceful shutdown. Returns `false` if one was already requested.
    pub fn trigger_shutdown(&self) -> bool {
        let triggered = self.shared.shutdown.trigger();
        if !triggered {
            tracing::debug!("Shutdown already in progress, ignoring request");
        }
        triggered
    }

    /// Request shutdown and wait until the service has stopped accepting.
    pub async fn terminate(&self) -> LifecycleState {
        self.trigger_shutdown();
        self.wait_for(LifecycleState::Draining).await
    }
}
