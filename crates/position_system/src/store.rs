//! # Position State Store
//!
//! Server-side home of the area configuration and of one [`PositionRecord`]
//! per attached client.
//!
//! ## Ownership
//!
//! Each record has exactly one writer, the client that attached it, and any
//! number of readers. Writes replace the whole record under the map's shard
//! lock, so observers never see the absolute and normalized pairs out of step.
//! Proximity results live beside the record and are written only by the
//! proximity service.
//!
//! ## Observation
//!
//! Every change is announced on a broadcast channel as a [`StoreEvent`].
//! Observers that fall behind get `Lagged` from tokio and should resync from
//! [`PositionStore::snapshot`].

use crate::barrier::{BarrierFailure, StartupBarrier};
use crate::error::{PositionError, PositionResult};
use crate::proximity::Proximity;
use crate::range::RangeMapper;
use crate::schema;
use crate::types::{
    AbsolutePosition, AreaConfig, ClientId, NormalizedPosition, Point, PositionRecord,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Capacity of the store's change feed
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Change notifications emitted by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Attached(ClientId),
    Updated {
        client_id: ClientId,
        record: PositionRecord,
    },
    ProximityChanged {
        client_id: ClientId,
        proximity: Proximity,
    },
    Detached(ClientId),
}

/// The published area together with its mapper.
#[derive(Debug, Clone)]
pub struct PublishedArea {
    pub config: Arc<AreaConfig>,
    pub mapper: RangeMapper,
}

/// Everything the server knows about one client
#[derive(Debug)]
struct ClientSlot {
    record: PositionRecord,
    proximity: Option<Proximity>,
    barrier: StartupBarrier,
}

/// Point-in-time copy of one client's state.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSnapshot {
    pub client_id: ClientId,
    pub record: PositionRecord,
    pub proximity: Option<Proximity>,
}

pub struct PositionStore {
    area: watch::Sender<Option<PublishedArea>>,
    clients: DashMap<ClientId, ClientSlot>,
    events: broadcast::Sender<StoreEvent>,
}

impl std::fmt::Debug for PositionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionStore")
            .field("configured", &self.is_configured())
            .field("clients", &self.clients.len())
            .finish()
    }
}

impl PositionStore {
    pub fn new() -> Self {
        let (area, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            area,
            clients: DashMap::new(),
            events,
        }
    }

    // ------------------------------------------------------------------------
    // Area configuration
    // ------------------------------------------------------------------------

    /// Validates raw options and publishes the resulting area.
    ///
    /// Called once per deployment. Errors are returned before anything is
    /// published, so a store that failed to configure stays unconfigured.
    ///
    /// # Arguments
    ///
    /// * `options` - Raw JSON area options. Missing keys take their defaults,
    ///   `null` means all defaults and unknown keys are ignored.
    ///
    /// # Returns
    ///
    /// The published [`AreaConfig`], shared with every later reader.
    ///
    /// # Errors
    ///
    /// * [`PositionError::InvalidConfig`] if the options fail validation
    /// * [`PositionError::AlreadyConfigured`] if an area was already published
    ///
    /// # Examples
    ///
    /// ```rust
    /// use position_system::{PositionStore, Range};
    /// use serde_json::json;
    ///
    /// let store = PositionStore::new();
    /// let area = store.configure(&json!({ "xRange": [0, 10] })).unwrap();
    /// assert_eq!(area.x_range, Range::new(0.0, 10.0));
    /// assert!(store.configure(&json!(null)).is_err());
    /// ```
    pub fn configure(&self, options: &Value) -> PositionResult<Arc<AreaConfig>> {
        let config = schema::validate_area_options(options)?;
        self.publish(config)
    }

    /// Typed variant of [`configure`](Self::configure).
    pub fn configure_area(&self, config: AreaConfig) -> PositionResult<Arc<AreaConfig>> {
        schema::validate_area(&config)?;
        self.publish(config)
    }

    fn publish(&self, config: AreaConfig) -> PositionResult<Arc<AreaConfig>> {
        let mapper = RangeMapper::from_area(&config)?;
        let config = Arc::new(config);
        let published = PublishedArea {
            config: Arc::clone(&config),
            mapper,
        };

        let accepted = self.area.send_if_modified(|area| {
            if area.is_some() {
                return false;
            }
            *area = Some(published);
            true
        });

        if !accepted {
            return Err(PositionError::AlreadyConfigured);
        }

        info!(
            "📐 Area configured: x {:?}, y {:?}, background image: {}",
            <[f64; 2]>::from(config.x_range),
            <[f64; 2]>::from(config.y_range),
            config.background_image.is_some()
        );
        Ok(config)
    }

    pub fn is_configured(&self) -> bool {
        self.area.borrow().is_some()
    }

    /// Current area snapshot, if one has been published.
    pub fn area(&self) -> Option<Arc<AreaConfig>> {
        self.area.borrow().as_ref().map(|area| Arc::clone(&area.config))
    }

    pub(crate) fn published(&self) -> Option<PublishedArea> {
        self.area.borrow().clone()
    }

    /// Waits until an area is published or `timeout` elapses.
    pub async fn wait_for_area(&self, timeout: Duration) -> PositionResult<PublishedArea> {
        let mut receiver = self.area.subscribe();
        let waited = tokio::time::timeout(timeout, receiver.wait_for(Option::is_some)).await;

        match waited {
            Ok(Ok(area)) => area.clone().ok_or_else(|| {
                PositionError::ConfigUnavailable("area vanished while attaching".to_string())
            }),
            Ok(Err(_)) => Err(PositionError::ConfigUnavailable(
                "store closed before an area was published".to_string(),
            )),
            Err(_) => Err(PositionError::ConfigUnavailable(format!(
                "no area published within {timeout:?}"
            ))),
        }
    }

    // ------------------------------------------------------------------------
    // Client lifecycle
    // ------------------------------------------------------------------------

    /// Creates an empty record for `client_id` and returns the client's handle.
    ///
    /// The record is visible to observers immediately, even while empty.
    ///
    /// # Arguments
    ///
    /// * `client_id` - Id of the joining client. Attaching an id that is
    ///   already attached supersedes the previous session, see
    ///   [`attach_with_barrier`](Self::attach_with_barrier).
    ///
    /// # Returns
    ///
    /// A [`ClientHandle`] with a fresh, pending startup barrier. The barrier
    /// releases on the first position write.
    ///
    /// # Errors
    ///
    /// [`PositionError::NotConfigured`] if no area has been published yet.
    pub fn attach_client(self: &Arc<Self>, client_id: ClientId) -> PositionResult<ClientHandle> {
        self.attach_with_barrier(client_id, StartupBarrier::new())
    }

    /// Attaches using a barrier owned by the caller.
    ///
    /// Re-attaching an id supersedes the previous session: its barrier fails
    /// with `SessionClosed` if still pending, the record is kept.
    pub fn attach_with_barrier(
        self: &Arc<Self>,
        client_id: ClientId,
        barrier: StartupBarrier,
    ) -> PositionResult<ClientHandle> {
        let area = self
            .published()
            .ok_or(PositionError::NotConfigured(client_id))?;

        match self.clients.entry(client_id) {
            Entry::Occupied(mut occupied) => {
                warn!("🔁 Client {} attached twice, superseding previous session", client_id);
                let slot = occupied.get_mut();
                let previous = std::mem::replace(&mut slot.barrier, barrier.clone());
                previous.fail(BarrierFailure::SessionClosed(client_id));
                if slot.record.is_set() {
                    barrier.release();
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ClientSlot {
                    record: PositionRecord::default(),
                    proximity: None,
                    barrier: barrier.clone(),
                });
            }
        }

        info!("🔗 Client {} attached", client_id);
        let _ = self.events.send(StoreEvent::Attached(client_id));

        Ok(ClientHandle {
            client_id,
            area,
            store: Arc::clone(self),
            barrier,
        })
    }

    /// Removes the client's record and notifies observers.
    ///
    /// A barrier still pending fails with `SessionClosed`. Returns `false` if
    /// the client was not attached.
    pub fn detach_client(&self, client_id: ClientId) -> bool {
        let Some((_, slot)) = self.clients.remove(&client_id) else {
            return false;
        };

        slot.barrier.fail(BarrierFailure::SessionClosed(client_id));
        info!("🔌 Client {} detached", client_id);
        let _ = self.events.send(StoreEvent::Detached(client_id));
        true
    }

    // ------------------------------------------------------------------------
    // Position writes
    // ------------------------------------------------------------------------

    /// Sets the absolute position; normalized coordinates are derived.
    pub fn set_position(
        &self,
        client_id: ClientId,
        x: f64,
        y: f64,
        label: Option<String>,
    ) -> PositionResult<PositionRecord> {
        let area = self
            .published()
            .ok_or(PositionError::NotConfigured(client_id))?;
        let absolute = Point::new(x, y);
        let normalized = area.mapper.to_normalized(absolute);
        self.write_record(client_id, PositionRecord::populated(absolute, normalized, label))
    }

    /// Sets the normalized position; absolute coordinates are derived.
    pub fn set_normalized_position(
        &self,
        client_id: ClientId,
        norm_x: f64,
        norm_y: f64,
        label: Option<String>,
    ) -> PositionResult<PositionRecord> {
        let area = self
            .published()
            .ok_or(PositionError::NotConfigured(client_id))?;
        let normalized = Point::new(norm_x, norm_y);
        let absolute = area.mapper.from_normalized(normalized);
        self.write_record(client_id, PositionRecord::populated(absolute, normalized, label))
    }

    fn write_record(
        &self,
        client_id: ClientId,
        record: PositionRecord,
    ) -> PositionResult<PositionRecord> {
        let barrier = {
            let mut slot = self
                .clients
                .get_mut(&client_id)
                .ok_or(PositionError::NotConfigured(client_id))?;
            slot.record = record.clone();
            slot.barrier.clone()
        };

        barrier.release();
        debug!(
            "📍 Client {} at ({:?}, {:?}) / normalized ({:?}, {:?})",
            client_id, record.x, record.y, record.norm_x, record.norm_y
        );
        let _ = self.events.send(StoreEvent::Updated {
            client_id,
            record: record.clone(),
        });
        Ok(record)
    }

    /// Records a proximity result for a client. Server-side only.
    pub fn set_proximity(&self, client_id: ClientId, proximity: Proximity) -> PositionResult<()> {
        {
            let mut slot = self
                .clients
                .get_mut(&client_id)
                .ok_or(PositionError::NotConfigured(client_id))?;
            slot.proximity = Some(proximity);
        }

        let _ = self.events.send(StoreEvent::ProximityChanged {
            client_id,
            proximity,
        });
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn record(&self, client_id: ClientId) -> Option<PositionRecord> {
        self.clients.get(&client_id).map(|slot| slot.record.clone())
    }

    pub fn proximity(&self, client_id: ClientId) -> Option<Proximity> {
        self.clients.get(&client_id).and_then(|slot| slot.proximity)
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        self.clients.contains_key(&client_id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Absolute positions of every attached client, `None` where unset.
    pub fn positions(&self) -> Vec<(ClientId, Option<Point>)> {
        self.clients
            .iter()
            .map(|entry| (*entry.key(), entry.value().record.position()))
            .collect()
    }

    pub fn snapshot(&self) -> Vec<ClientSnapshot> {
        self.clients
            .iter()
            .map(|entry| ClientSnapshot {
                client_id: *entry.key(),
                record: entry.value().record.clone(),
                proximity: entry.value().proximity,
            })
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

impl Default for PositionStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Client handle
// ============================================================================

/// A client's view of the store: the area snapshot plus write access to its
/// own record.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    client_id: ClientId,
    area: PublishedArea,
    store: Arc<PositionStore>,
    barrier: StartupBarrier,
}

impl ClientHandle {
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn area(&self) -> &AreaConfig {
        &self.area.config
    }

    pub fn barrier(&self) -> &StartupBarrier {
        &self.barrier
    }

    pub fn set_position(&self, x: f64, y: f64, label: Option<String>) -> PositionResult<PositionRecord> {
        self.store.set_position(self.client_id, x, y, label)
    }

    pub fn set_normalized_position(
        &self,
        norm_x: f64,
        norm_y: f64,
        label: Option<String>,
    ) -> PositionResult<PositionRecord> {
        self.store
            .set_normalized_position(self.client_id, norm_x, norm_y, label)
    }

    /// The client's record, empty if it has been detached.
    pub fn record(&self) -> PositionRecord {
        self.store.record(self.client_id).unwrap_or_default()
    }

    pub fn get_position(&self) -> AbsolutePosition {
        self.record().absolute_view()
    }

    pub fn get_normalized_position(&self) -> NormalizedPosition {
        self.record().normalized_view()
    }

    pub fn proximity(&self) -> Option<Proximity> {
        self.store.proximity(self.client_id)
    }

    pub fn detach(&self) -> bool {
        self.store.detach_client(self.client_id)
    }
}
