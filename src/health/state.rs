//! Process readiness state.
//!
//! # States
//! - NotReady: probe answers 503 (initial state, and from the first termination signal on)
//! - Ready: probe answers 204
//!
//! # State Transitions
//! ```text
//! NotReady → Ready: lifecycle is about to accept connections
//! Ready → NotReady: termination signal received, before the drain starts
//! ```
//!
//! Only the lifecycle writes the state; probes read it through [`HealthProbe`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Readiness as seen by the probe endpoint.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady = 0,
    Ready = 1,
}

impl From<u8> for Readiness {
    fn from(val: u8) -> Self {
        match val {
            1 => Readiness::Ready,
            _ => Readiness::NotReady,
        }
    }
}

/// Atomic readiness flag owned by the lifecycle.
#[derive(Debug)]
pub struct HealthState {
    state: AtomicU8,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(Readiness::NotReady as u8),
        }
    }

    pub fn readiness(&self) -> Readiness {
        Readiness::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    pub(crate) fn mark_ready(&self) {
        self.set(Readiness::Ready);
    }

    pub(crate) fn mark_not_ready(&self) {
        self.set(Readiness::NotReady);
    }

    fn set(&self, readiness: Readiness) {
        let previous = Readiness::from(self.state.swap(readiness as u8, Ordering::SeqCst));
        if previous != readiness {
            tracing::info!(from = ?previous, to = ?readiness, "Readiness changed");
        }
        metrics::record_readiness(readiness == Readiness::Ready);
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only handle on the lifecycle's [`HealthState`].
#[derive(Debug, Clone)]
pub struct HealthProbe {
    state: Arc<HealthState>,
}

impl HealthProbe {
    pub(crate) fn new(state: Arc<HealthState>) -> Self {
        Self { state }
    }

    pub fn readiness(&self) -> Readiness {
        self.state.readiness()
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_ready() {
        let state = HealthState::new();
        assert_eq!(state.readiness(), Readiness::NotReady);
    }

    #[test]
    fn probe_sees_transitions() {
        let state = Arc::new(HealthState::new());
        let probe = HealthProbe::new(Arc::clone(&state));

        state.mark_ready();
        assert!(probe.is_ready());

        state.mark_not_ready();
        assert_eq!(probe.readiness(), Readiness::NotReady);
    }

    #[test]
    fn unknown_values_read_as_not_ready() {
        assert_eq!(Readiness::from(7), Readiness::NotReady);
    }
}
