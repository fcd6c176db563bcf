//! # Proximity Engine
//!
//! Decides which players are inside the radius of a set of moving triggers.
//!
//! Each pass takes a [`TriggerSet`] and the current player positions and
//! updates a tagged per-player state:
//!
//! - `Active { distance }` - inside a trigger, `distance` is the Euclidean
//!   distance divided by the radius (so always `<= 1`)
//! - `Inactive` - has been inside a trigger and has since left, possibly
//!   within the same pass
//!
//! Players that were never inside a trigger have no state at all. A pass only
//! reports a player when its state actually changes, which gives the
//! hysteresis: inactive players that stay outside are never re-emitted.
//!
//! ## Policies
//!
//! With several triggers the outcome depends on [`ProximityPolicy`]:
//!
//! - [`ProximityPolicy::LastWins`] walks the triggers in order and keeps the
//!   running state after the last one. A player inside the first trigger but
//!   outside the last one ends up `Inactive`.
//! - [`ProximityPolicy::Nearest`] keeps the closest trigger.

pub mod service;

pub use service::{spawn_proximity_service, ProximityHandle, TriggerCommand};

use crate::error::PositionResult;
use crate::types::{ClientId, Point, TriggerSet};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Proximity state of one player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Proximity {
    Inactive,
    Active { distance: f64 },
}

impl Proximity {
    pub fn is_active(&self) -> bool {
        matches!(self, Proximity::Active { .. })
    }

    pub fn distance(&self) -> Option<f64> {
        match self {
            Proximity::Active { distance } => Some(*distance),
            Proximity::Inactive => None,
        }
    }
}

/// How multiple triggers combine for a single player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProximityPolicy {
    #[default]
    #[serde(rename = "last")]
    LastWins,
    #[serde(rename = "nearest")]
    Nearest,
}

impl std::str::FromStr for ProximityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last" => Ok(ProximityPolicy::LastWins),
            "nearest" => Ok(ProximityPolicy::Nearest),
            other => Err(format!(
                "Unknown proximity policy: {other}. Must be one of: [\"last\", \"nearest\"]"
            )),
        }
    }
}

/// A state change produced by a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityUpdate {
    pub client_id: ClientId,
    pub previous: Option<Proximity>,
    pub current: Proximity,
}

/// Summary of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub evaluated: usize,
    pub activated: usize,
    pub deactivated: usize,
    pub skipped_triggers: usize,
    pub updates: Vec<ProximityUpdate>,
}

impl PassReport {
    fn record(&mut self, client_id: ClientId, previous: Option<Proximity>, current: Proximity) {
        let was_active = previous.is_some_and(|state| state.is_active());
        match (was_active, current.is_active()) {
            (false, true) => self.activated += 1,
            (true, false) => self.deactivated += 1,
            _ => {}
        }
        self.updates.push(ProximityUpdate {
            client_id,
            previous,
            current,
        });
    }
}

/// Normalized distance between a trigger and a player.
pub fn normalized_distance(trigger: &Point, player: &Point, radius: f64) -> f64 {
    trigger.distance_to(player) / radius
}

#[derive(Debug, Default)]
pub struct ProximityEngine {
    policy: ProximityPolicy,
    states: HashMap<ClientId, Proximity>,
}

impl ProximityEngine {
    pub fn new(policy: ProximityPolicy) -> Self {
        Self {
            policy,
            states: HashMap::new(),
        }
    }

    pub fn policy(&self) -> ProximityPolicy {
        self.policy
    }

    pub fn state(&self, client_id: ClientId) -> Option<Proximity> {
        self.states.get(&client_id).copied()
    }

    pub fn is_active(&self, client_id: ClientId) -> bool {
        self.state(client_id).is_some_and(|state| state.is_active())
    }

    /// Players currently inside a trigger.
    pub fn active_players(&self) -> Vec<ClientId> {
        self.states
            .iter()
            .filter(|(_, state)| state.is_active())
            .map(|(client_id, _)| *client_id)
            .collect()
    }

    /// Stops tracking a player without emitting anything.
    pub fn forget(&mut self, client_id: ClientId) -> bool {
        self.states.remove(&client_id).is_some()
    }

    /// Keeps only the players for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(ClientId) -> bool) {
        self.states.retain(|client_id, _| keep(*client_id));
    }

    /// Runs one full pass over `players`.
    ///
    /// # Arguments
    ///
    /// * `trigger_set` - Triggers and radius for this pass. An empty trigger
    ///   list deactivates every active player.
    /// * `players` - The full set of tracked players. State held for anyone
    ///   missing from it is dropped silently; players without a finite
    ///   position are skipped.
    ///
    /// # Returns
    ///
    /// A [`PassReport`] holding one [`ProximityUpdate`] per player whose state
    /// changed, plus counters. Trigger points with non-finite coordinates are
    /// skipped and counted in `skipped_triggers`; the rest of the pass runs.
    ///
    /// # Errors
    ///
    /// [`PositionError::InvalidTriggerSet`](crate::PositionError::InvalidTriggerSet)
    /// if the radius is not a positive finite number. No state changes then.
    pub fn run_pass(
        &mut self,
        trigger_set: &TriggerSet,
        players: &[(ClientId, Option<Point>)],
    ) -> PositionResult<PassReport> {
        trigger_set.validate()?;
        let mut report = PassReport::default();

        let present: HashSet<ClientId> = players.iter().map(|(client_id, _)| *client_id).collect();
        self.states.retain(|client_id, _| present.contains(client_id));

        if trigger_set.triggers.is_empty() {
            for (client_id, state) in self.states.iter_mut() {
                if state.is_active() {
                    report.record(*client_id, Some(*state), Proximity::Inactive);
                    *state = Proximity::Inactive;
                }
            }
            debug!("🎯 Triggers cleared, {} players deactivated", report.deactivated);
            return Ok(report);
        }

        let triggers: Vec<Point> = trigger_set
            .triggers
            .iter()
            .filter(|trigger| {
                if trigger.is_finite() {
                    true
                } else {
                    warn!("🎯 Skipping malformed trigger {:?}", trigger);
                    false
                }
            })
            .copied()
            .collect();
        report.skipped_triggers = trigger_set.triggers.len() - triggers.len();

        for (client_id, position) in players {
            let Some(position) = (*position).filter(Point::is_finite) else {
                continue;
            };
            report.evaluated += 1;

            let previous = self.states.get(client_id).copied();
            let was_active = previous.is_some_and(|state| state.is_active());
            let next = match self.policy {
                ProximityPolicy::LastWins => {
                    last_wins(was_active, &triggers, &position, trigger_set.radius)
                }
                ProximityPolicy::Nearest => {
                    nearest(was_active, &triggers, &position, trigger_set.radius)
                }
            };

            if let Some(next) = next {
                if Some(next) != previous {
                    self.states.insert(*client_id, next);
                    report.record(*client_id, previous, next);
                }
            }
        }

        debug!(
            "🎯 Pass over {} players: {} activated, {} deactivated, {} updates",
            report.evaluated,
            report.activated,
            report.deactivated,
            report.updates.len()
        );
        Ok(report)
    }
}

/// Walks triggers in order; the running state after the last one is final.
fn last_wins(was_active: bool, triggers: &[Point], player: &Point, radius: f64) -> Option<Proximity> {
    let mut active = was_active;
    let mut outcome = None;

    for trigger in triggers {
        let distance = normalized_distance(trigger, player, radius);
        if distance <= 1.0 {
            active = true;
            outcome = Some(Proximity::Active { distance });
        } else if active {
            active = false;
            outcome = Some(Proximity::Inactive);
        }
    }

    outcome
}

/// The closest trigger decides.
fn nearest(was_active: bool, triggers: &[Point], player: &Point, radius: f64) -> Option<Proximity> {
    if triggers.is_empty() {
        return None;
    }
    let closest = triggers
        .iter()
        .map(|trigger| normalized_distance(trigger, player, radius))
        .fold(f64::INFINITY, f64::min);

    if closest <= 1.0 {
        Some(Proximity::Active { distance: closest })
    } else if was_active {
        Some(Proximity::Inactive)
    } else {
        None
    }
}
