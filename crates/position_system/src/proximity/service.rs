//! # Proximity Service
//!
//! Runs the [`ProximityEngine`] as a background task next to a
//! [`PositionStore`].
//!
//! Trigger set changes arrive through a bounded channel and are handled one at
//! a time in arrival order: each change produces a complete new trigger set
//! and one full pass before the next change is read, so writers never observe
//! half-applied updates. Results are written back into the store as
//! proximity state for each affected player.
//!
//! The same task follows the store's change feed so that detached players are
//! dropped from the engine. A player detaching while a pass is in flight is
//! simply skipped when its result is written back.

use super::{PassReport, ProximityEngine, ProximityPolicy};
use crate::error::{PositionError, PositionResult};
use crate::store::{PositionStore, StoreEvent};
use crate::types::{Point, TriggerSet};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the trigger command queue
const COMMAND_QUEUE_CAPACITY: usize = 256;

/// A change to the shared trigger set.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerCommand {
    /// Replace the whole trigger set.
    Replace(TriggerSet),
    /// Replace the trigger points, keeping the radius.
    SetTriggers(Vec<Point>),
    /// Replace the radius, keeping the trigger points.
    SetRadius(f64),
    /// Remove every trigger point.
    Clear,
}

impl TriggerCommand {
    /// Builds the trigger set that results from applying this command.
    pub fn apply_to(self, current: &TriggerSet) -> PositionResult<TriggerSet> {
        let next = match self {
            TriggerCommand::Replace(trigger_set) => trigger_set,
            TriggerCommand::SetTriggers(triggers) => current.clone().with_triggers(triggers),
            TriggerCommand::SetRadius(radius) => TriggerSet {
                radius,
                ..current.clone()
            },
            TriggerCommand::Clear => current.clone().with_triggers(Vec::new()),
        };
        next.validate()?;
        Ok(next)
    }
}

struct TriggerRequest {
    command: TriggerCommand,
    reply: Option<oneshot::Sender<PositionResult<PassReport>>>,
}

/// Cloneable sender side of a running proximity service.
#[derive(Debug, Clone)]
pub struct ProximityHandle {
    commands: mpsc::Sender<TriggerRequest>,
    trigger_set: watch::Receiver<TriggerSet>,
}

impl std::fmt::Debug for TriggerRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerRequest")
            .field("command", &self.command)
            .field("reply", &self.reply.is_some())
            .finish()
    }
}

impl ProximityHandle {
    /// Applies a change and waits for the pass it triggers.
    pub async fn apply(&self, command: TriggerCommand) -> PositionResult<PassReport> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(TriggerRequest {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| PositionError::ServiceStopped)?;
        response.await.map_err(|_| PositionError::ServiceStopped)?
    }

    /// Queues a change without waiting for its pass.
    pub async fn submit(&self, command: TriggerCommand) -> PositionResult<()> {
        self.commands
            .send(TriggerRequest {
                command,
                reply: None,
            })
            .await
            .map_err(|_| PositionError::ServiceStopped)
    }

    /// The trigger set as of the last completed pass.
    pub fn trigger_set(&self) -> TriggerSet {
        self.trigger_set.borrow().clone()
    }

    /// Waits for the next completed trigger set change.
    pub async fn changed(&mut self) -> PositionResult<TriggerSet> {
        self.trigger_set
            .changed()
            .await
            .map_err(|_| PositionError::ServiceStopped)?;
        Ok(self.trigger_set.borrow_and_update().clone())
    }
}

struct ProximityService {
    store: Arc<PositionStore>,
    engine: ProximityEngine,
    trigger_set: watch::Sender<TriggerSet>,
}

impl ProximityService {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<TriggerRequest>,
        mut store_events: tokio::sync::broadcast::Receiver<StoreEvent>,
    ) {
        info!(
            "🎯 Proximity service started (radius {}, policy {:?})",
            self.trigger_set.borrow().radius,
            self.engine.policy()
        );

        loop {
            tokio::select! {
                request = commands.recv() => {
                    let Some(request) = request else { break };
                    let result = self.handle(request.command);
                    if let Err(e) = &result {
                        warn!("🎯 Rejected trigger update: {}", e);
                    }
                    if let Some(reply) = request.reply {
                        let _ = reply.send(result);
                    }
                }
                event = store_events.recv() => match event {
                    Ok(StoreEvent::Detached(client_id)) => {
                        if self.engine.forget(client_id) {
                            debug!("🎯 Stopped tracking detached player {}", client_id);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("🎯 Proximity service lagged {} store events, resyncing", skipped);
                        let store = Arc::clone(&self.store);
                        self.engine.retain(|client_id| store.contains(client_id));
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        info!("🎯 Proximity service stopped");
    }

    fn handle(&mut self, command: TriggerCommand) -> PositionResult<PassReport> {
        let next = command.apply_to(&self.trigger_set.borrow())?;
        let players = self.store.positions();
        let report = self.engine.run_pass(&next, &players)?;

        for update in &report.updates {
            if let Err(e) = self.store.set_proximity(update.client_id, update.current) {
                debug!("🎯 Skipping update for {}: {}", update.client_id, e);
            }
        }

        self.trigger_set.send_replace(next);
        Ok(report)
    }
}

/// Starts a proximity service over `store`.
///
/// Commands sent through the returned handle are applied one at a time, each
/// followed by a full pass whose results are written to the store.
///
/// # Arguments
///
/// * `store` - Store the service reads positions from and writes results to
/// * `initial` - Starting trigger set. It is validated, but no pass runs
///   until the first command arrives.
/// * `policy` - How several triggers combine for one player
///
/// # Returns
///
/// The [`ProximityHandle`] used to send commands, and the task's
/// `JoinHandle`. The task ends once every handle is dropped.
///
/// # Errors
///
/// [`PositionError::InvalidTriggerSet`] if `initial` has an invalid radius.
/// Nothing is spawned in that case.
///
/// Must be called from within a tokio runtime.
pub fn spawn_proximity_service(
    store: Arc<PositionStore>,
    initial: TriggerSet,
    policy: ProximityPolicy,
) -> PositionResult<(ProximityHandle, JoinHandle<()>)> {
    initial.validate()?;

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (trigger_tx, trigger_rx) = watch::channel(initial);
    let store_events = store.subscribe();

    let service = ProximityService {
        store,
        engine: ProximityEngine::new(policy),
        trigger_set: trigger_tx,
    };
    let task = tokio::spawn(service.run(command_rx, store_events));

    Ok((
        ProximityHandle {
            commands: command_tx,
            trigger_set: trigger_rx,
        },
        task,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proximity::Proximity;
    use crate::types::ClientId;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn setup(radius: f64) -> (Arc<PositionStore>, ProximityHandle) {
        let store = Arc::new(PositionStore::new());
        store
            .configure(&json!({ "xRange": [-10, 10], "yRange": [-10, 10] }))
            .unwrap();
        let initial = TriggerSet::new(&store.area().unwrap(), radius);
        let (handle, _task) =
            spawn_proximity_service(Arc::clone(&store), initial, ProximityPolicy::LastWins).unwrap();
        (store, handle)
    }

    #[test]
    fn test_commands_build_whole_trigger_sets() {
        let current = TriggerSet::new(&Default::default(), 0.5);

        let moved = TriggerCommand::SetTriggers(vec![Point::new(0.2, 0.2)])
            .apply_to(&current)
            .unwrap();
        assert_eq!(moved.radius, 0.5);
        assert_eq!(moved.triggers, vec![Point::new(0.2, 0.2)]);

        let widened = TriggerCommand::SetRadius(1.0).apply_to(&moved).unwrap();
        assert_eq!(widened.triggers, moved.triggers);
        assert_eq!(widened.radius, 1.0);

        assert!(TriggerCommand::Clear.apply_to(&widened).unwrap().triggers.is_empty());
        assert!(TriggerCommand::SetRadius(-1.0).apply_to(&widened).is_err());
    }

    #[tokio::test]
    async fn test_pass_results_reach_the_store() {
        let (store, handle) = setup(1.0);
        let player = store.attach_client(ClientId::new()).unwrap();
        player.set_position(0.5, 0.0, None).unwrap();

        let report = handle
            .apply(TriggerCommand::SetTriggers(vec![Point::new(0.0, 0.0)]))
            .await
            .unwrap();
        assert_eq!(report.activated, 1);
        assert_eq!(player.proximity(), Some(Proximity::Active { distance: 0.5 }));

        player.set_position(2.0, 0.0, None).unwrap();
        handle
            .apply(TriggerCommand::SetTriggers(vec![Point::new(0.0, 0.0)]))
            .await
            .unwrap();
        assert_eq!(player.proximity(), Some(Proximity::Inactive));
    }

    #[tokio::test]
    async fn test_new_players_have_no_proximity_until_next_update() {
        let (store, handle) = setup(1.0);
        handle
            .apply(TriggerCommand::SetTriggers(vec![Point::new(0.0, 0.0)]))
            .await
            .unwrap();

        let player = store.attach_client(ClientId::new()).unwrap();
        player.set_position(0.0, 0.0, None).unwrap();
        assert_eq!(player.proximity(), None);

        handle.apply(TriggerCommand::SetRadius(2.0)).await.unwrap();
        assert_eq!(player.proximity(), Some(Proximity::Active { distance: 0.0 }));
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_previous_trigger_set() {
        let (_store, handle) = setup(1.0);
        handle
            .apply(TriggerCommand::SetTriggers(vec![Point::new(1.0, 1.0)]))
            .await
            .unwrap();

        let result = handle.apply(TriggerCommand::SetRadius(f64::NAN)).await;
        assert!(matches!(result, Err(PositionError::InvalidTriggerSet(_))));
        assert_eq!(handle.trigger_set().radius, 1.0);
        assert_eq!(handle.trigger_set().triggers, vec![Point::new(1.0, 1.0)]);
    }

    #[tokio::test]
    async fn test_detached_players_are_skipped() {
        let (store, handle) = setup(1.0);
        let staying = store.attach_client(ClientId::new()).unwrap();
        let leaving = store.attach_client(ClientId::new()).unwrap();
        staying.set_position(0.0, 0.0, None).unwrap();
        leaving.set_position(0.1, 0.0, None).unwrap();

        let report = handle
            .apply(TriggerCommand::SetTriggers(vec![Point::new(0.0, 0.0)]))
            .await
            .unwrap();
        assert_eq!(report.activated, 2);

        leaving.detach();
        let report = handle.apply(TriggerCommand::Clear).await.unwrap();
        assert!(report
            .updates
            .iter()
            .all(|update| update.client_id != leaving.client_id()));
        assert_eq!(staying.proximity(), Some(Proximity::Inactive));
    }

    #[tokio::test]
    async fn test_submitted_updates_apply_in_order() {
        let (_store, mut handle) = setup(1.0);
        handle
            .submit(TriggerCommand::SetTriggers(vec![Point::new(1.0, 0.0)]))
            .await
            .unwrap();
        handle.submit(TriggerCommand::SetRadius(3.0)).await.unwrap();

        let first = timeout(Duration::from_secs(1), handle.changed()).await.unwrap().unwrap();
        assert_eq!(first.triggers, vec![Point::new(1.0, 0.0)]);

        handle.apply(TriggerCommand::SetRadius(4.0)).await.unwrap();
        let latest = handle.trigger_set();
        assert_eq!(latest.radius, 4.0);
        assert_eq!(latest.triggers, vec![Point::new(1.0, 0.0)]);
    }

    #[tokio::test]
    async fn test_stopped_service_is_reported() {
        let store = Arc::new(PositionStore::new());
        store.configure(&json!({})).unwrap();
        let initial = TriggerSet::new(&store.area().unwrap(), 0.5);
        let (handle, task) =
            spawn_proximity_service(store, initial, ProximityPolicy::Nearest).unwrap();

        task.abort();
        let _ = task.await;

        assert!(matches!(
            handle.apply(TriggerCommand::Clear).await,
            Err(PositionError::ServiceStopped)
        ));
    }

    #[tokio::test]
    async fn test_invalid_initial_radius_is_rejected() {
        let rejected = spawn_proximity_service(
            Arc::new(PositionStore::new()),
            TriggerSet::new(&Default::default(), 0.0),
            ProximityPolicy::LastWins,
        );
        assert!(matches!(rejected, Err(PositionError::InvalidTriggerSet(_))));
    }
}
