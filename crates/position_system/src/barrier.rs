//! # Startup Barrier
//!
//! One-shot readiness gate for a client plugin instance. The barrier starts
//! `Pending` and settles exactly once: `Released` when the client's first
//! position is written, or `Failed` when the area cannot be obtained or the
//! session ends first. Settled barriers never change again, so later position
//! writes are no-ops as far as readiness is concerned.
//!
//! Waiting has no built-in timeout; callers wrap [`StartupBarrier::wait`] in
//! their own `tokio::time::timeout` when they need one.

use crate::error::{PositionError, PositionResult};
use crate::types::ClientId;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Why a barrier failed instead of releasing.
#[derive(Debug, Clone, PartialEq)]
pub enum BarrierFailure {
    ConfigUnavailable(String),
    SessionClosed(ClientId),
}

impl From<BarrierFailure> for PositionError {
    fn from(failure: BarrierFailure) -> Self {
        match failure {
            BarrierFailure::ConfigUnavailable(reason) => PositionError::ConfigUnavailable(reason),
            BarrierFailure::SessionClosed(client_id) => PositionError::SessionClosed(client_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BarrierState {
    Pending,
    Released,
    Failed(BarrierFailure),
}

impl BarrierState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, BarrierState::Pending)
    }
}

/// Cloneable handle to a single-fire readiness signal.
#[derive(Debug, Clone)]
pub struct StartupBarrier {
    state: Arc<watch::Sender<BarrierState>>,
}

impl StartupBarrier {
    pub fn new() -> Self {
        let (state, _) = watch::channel(BarrierState::Pending);
        Self {
            state: Arc::new(state),
        }
    }

    /// Releases the barrier. Returns `true` only for the call that settled it.
    pub fn release(&self) -> bool {
        let released = self.settle(BarrierState::Released);
        if released {
            debug!("Startup barrier released");
        }
        released
    }

    /// Fails the barrier if it is still pending.
    pub fn fail(&self, failure: BarrierFailure) -> bool {
        let failed = self.settle(BarrierState::Failed(failure.clone()));
        if failed {
            debug!("Startup barrier failed: {:?}", failure);
        }
        failed
    }

    fn settle(&self, next: BarrierState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_settled() {
                return false;
            }
            *state = next;
            true
        })
    }

    pub fn state(&self) -> BarrierState {
        self.state.borrow().clone()
    }

    pub fn is_released(&self) -> bool {
        *self.state.borrow() == BarrierState::Released
    }

    /// Suspends until the barrier settles.
    pub async fn wait(&self) -> PositionResult<()> {
        let mut receiver = self.state.subscribe();
        let settled = receiver
            .wait_for(BarrierState::is_settled)
            .await
            .map_err(|_| PositionError::ServiceStopped)?
            .clone();

        match settled {
            BarrierState::Released => Ok(()),
            BarrierState::Failed(failure) => Err(failure.into()),
            BarrierState::Pending => Err(PositionError::ServiceStopped),
        }
    }
}

impl Default for StartupBarrier {
    fn default() -> Self {
        Self::new()
    }
}
