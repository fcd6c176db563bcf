//! # Client Position Plugin
//!
//! Client-side counterpart of the [`PositionStore`]. A plugin instance waits
//! for the server's area, attaches its own record, and only reports ready once
//! a first position has been supplied:
//!
//! ```text
//! new() ──► start() ──► attached ──► set_position() ──► ready
//!             │
//!             └─ no area in time ──► barrier fails with ConfigUnavailable
//! ```
//!
//! Positions given before `start()` completes are buffered; the last one is
//! written as soon as the record exists. An [`InitialPosition`] strategy can
//! supply the first position automatically.

use crate::barrier::{BarrierFailure, StartupBarrier};
use crate::error::{PositionError, PositionResult};
use crate::store::{ClientHandle, PositionStore};
use crate::types::{AbsolutePosition, AreaConfig, ClientId, NormalizedPosition, Point};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default time a client waits for the server's area
pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Initial position strategies
// ============================================================================

/// Produces a normalized starting position for a freshly attached client.
pub trait InitialPosition: Send + Sync + std::fmt::Debug {
    fn normalized_position(&self) -> Point;
}

/// Uniformly random position over the whole area.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPosition;

impl InitialPosition for RandomPosition {
    fn normalized_position(&self) -> Point {
        let mut rng = rand::thread_rng();
        Point::new(rng.gen::<f64>(), rng.gen::<f64>())
    }
}

/// Always the same normalized position.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Point);

impl InitialPosition for FixedPosition {
    fn normalized_position(&self) -> Point {
        self.0
    }
}

// ============================================================================
// Plugin
// ============================================================================

#[derive(Debug, Clone)]
pub struct PluginOptions {
    /// Position assigned right after attaching, if any.
    pub initial_position: Option<Arc<dyn InitialPosition>>,
    /// How long `start` waits for the server's area.
    pub attach_timeout: Duration,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            initial_position: None,
            attach_timeout: DEFAULT_ATTACH_TIMEOUT,
        }
    }
}

impl PluginOptions {
    pub fn with_initial_position(mut self, strategy: impl InitialPosition + 'static) -> Self {
        self.initial_position = Some(Arc::new(strategy));
        self
    }

    pub fn with_attach_timeout(mut self, timeout: Duration) -> Self {
        self.attach_timeout = timeout;
        self
    }
}

/// Position set before the plugin attached
#[derive(Debug, Clone, PartialEq)]
enum PendingPosition {
    Absolute { x: f64, y: f64, label: Option<String> },
    Normalized { norm_x: f64, norm_y: f64, label: Option<String> },
}

#[derive(Debug)]
pub struct PositionPlugin {
    client_id: ClientId,
    options: PluginOptions,
    barrier: StartupBarrier,
    handle: Option<ClientHandle>,
    pending: Option<PendingPosition>,
}

impl PositionPlugin {
    pub fn new(client_id: ClientId, options: PluginOptions) -> Self {
        Self {
            client_id,
            options,
            barrier: StartupBarrier::new(),
            handle: None,
            pending: None,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// A handle on this plugin's readiness signal.
    pub fn barrier(&self) -> StartupBarrier {
        self.barrier.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    /// Area received from the server, once attached.
    pub fn area(&self) -> Option<&AreaConfig> {
        self.handle.as_ref().map(ClientHandle::area)
    }

    /// Waits for the area, attaches the client's record and applies any
    /// buffered or strategy-provided position.
    ///
    /// Failing to obtain the area fails the barrier with `ConfigUnavailable`
    /// so that waiters on [`ready`](Self::ready) do not hang.
    pub async fn start(&mut self, store: &Arc<PositionStore>) -> PositionResult<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        if let Err(e) = store.wait_for_area(self.options.attach_timeout).await {
            warn!("🛰️ Client {} could not obtain the area: {}", self.client_id, e);
            self.barrier
                .fail(BarrierFailure::ConfigUnavailable(e.to_string()));
            return Err(e);
        }

        let handle = store.attach_with_barrier(self.client_id, self.barrier.clone())?;
        info!("🛰️ Client {} started", self.client_id);
        self.handle = Some(handle);

        if let Some(pending) = self.pending.take() {
            debug!("🛰️ Replaying position buffered before start for {}", self.client_id);
            match pending {
                PendingPosition::Absolute { x, y, label } => self.set_position(x, y, label)?,
                PendingPosition::Normalized { norm_x, norm_y, label } => {
                    self.set_normalized_position(norm_x, norm_y, label)?
                }
            }
        } else if let Some(strategy) = self.options.initial_position.clone() {
            let initial = strategy.normalized_position();
            self.set_normalized_position(initial.x, initial.y, None)?;
        }

        Ok(())
    }

    /// Suspends until the first position has been set.
    pub async fn ready(&self) -> PositionResult<()> {
        self.barrier.wait().await
    }

    /// Sets the position in area units. Buffered if not yet attached.
    pub fn set_position(&mut self, x: f64, y: f64, label: Option<String>) -> PositionResult<()> {
        match &self.handle {
            Some(handle) => handle.set_position(x, y, label).map(|_| ()),
            None => {
                self.pending = Some(PendingPosition::Absolute { x, y, label });
                Ok(())
            }
        }
    }

    /// Sets the position in normalized units. Buffered if not yet attached.
    pub fn set_normalized_position(
        &mut self,
        norm_x: f64,
        norm_y: f64,
        label: Option<String>,
    ) -> PositionResult<()> {
        match &self.handle {
            Some(handle) => handle
                .set_normalized_position(norm_x, norm_y, label)
                .map(|_| ()),
            None => {
                self.pending = Some(PendingPosition::Normalized {
                    norm_x,
                    norm_y,
                    label,
                });
                Ok(())
            }
        }
    }

    pub fn get_position(&self) -> PositionResult<AbsolutePosition> {
        self.attached().map(ClientHandle::get_position)
    }

    pub fn get_normalized_position(&self) -> PositionResult<NormalizedPosition> {
        self.attached().map(ClientHandle::get_normalized_position)
    }

    fn attached(&self) -> PositionResult<&ClientHandle> {
        self.handle
            .as_ref()
            .ok_or(PositionError::NotConfigured(self.client_id))
    }

    /// Ends the session. A barrier still pending fails with `SessionClosed`.
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => handle.detach(),
            None => self
                .barrier
                .fail(BarrierFailure::SessionClosed(self.client_id)),
        }
    }
}
