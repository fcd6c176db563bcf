//! # Position System
//!
//! Shared positional state for a distributed interactive session: a server
//! publishes a rectangular area, every connected client places itself in it,
//! and a proximity engine tells each player how close they are to a set of
//! externally controlled trigger points.
//!
//! ## Core Features
//!
//! - **Range mapping**: absolute area coordinates to and from `[0, 1]`
//! - **Option validation**: area options checked and merged over defaults
//! - **Per-client records**: one writer per record, any number of readers
//! - **Startup barrier**: a client is ready once its first position is set
//! - **Proximity passes**: trigger set changes applied serially, whole-set
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use position_system::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> PositionResult<()> {
//!     let store = create_position_store();
//!     store.configure(&json!({ "xRange": [-1, 1], "yRange": [-1, 1] }))?;
//!
//!     let area = store.area().unwrap_or_default();
//!     let (proximity, _task) = spawn_proximity_service(
//!         store.clone(),
//!         TriggerSet::new(&area, 0.2),
//!         ProximityPolicy::default(),
//!     )?;
//!
//!     let mut plugin = PositionPlugin::new(ClientId::new(), PluginOptions::default());
//!     plugin.start(&store).await?;
//!     plugin.set_position(0.0, 0.0, None)?;
//!     plugin.ready().await?;
//!
//!     proximity
//!         .apply(TriggerCommand::SetTriggers(vec![Point::new(0.5, 0.5)]))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod barrier;
pub mod client;
pub mod control;
pub mod error;
pub mod proximity;
pub mod range;
pub mod schema;
pub mod store;
pub mod types;
pub mod utils;

pub use barrier::{BarrierFailure, BarrierState, StartupBarrier};
pub use client::{
    FixedPosition, InitialPosition, PluginOptions, PositionPlugin, RandomPosition,
    DEFAULT_ATTACH_TIMEOUT,
};
pub use control::ControlMessage;
pub use error::{PositionError, PositionResult};
pub use proximity::{
    normalized_distance, spawn_proximity_service, PassReport, Proximity, ProximityEngine,
    ProximityHandle, ProximityPolicy, ProximityUpdate, TriggerCommand,
};
pub use range::RangeMapper;
pub use store::{ClientHandle, ClientSnapshot, PositionStore, PublishedArea, StoreEvent};
pub use types::{
    AbsolutePosition, AreaConfig, ClientId, NormalizedPosition, Point, PositionRecord, Range,
    TriggerSet,
};
pub use utils::{create_position_store, encode_data_uri, mime_for_path};
