//! Error types for the position system

use crate::types::ClientId;
use thiserror::Error;

/// Errors raised by configuration, position writes and the proximity service.
#[derive(Debug, Error)]
pub enum PositionError {
    /// Malformed area options; fatal to the plugin instance being configured.
    #[error("Invalid option: {0}")]
    InvalidConfig(String),

    /// The client has no record in a configured store.
    #[error("Client {0} is not attached to a configured area")]
    NotConfigured(ClientId),

    #[error("Area configuration has already been published")]
    AlreadyConfigured,

    /// The area could not be obtained while starting a client.
    #[error("Area configuration unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("Degenerate range [{min}, {max}]")]
    DegenerateRange { min: f64, max: f64 },

    #[error("Invalid trigger set: {0}")]
    InvalidTriggerSet(String),

    #[error("Unknown control address: {0}")]
    UnknownControlAddress(String),

    #[error("Invalid control message: {0}")]
    InvalidControlMessage(String),

    /// The client session ended before a first position was set.
    #[error("Session for client {0} closed before a position was set")]
    SessionClosed(ClientId),

    #[error("Proximity service has stopped")]
    ServiceStopped,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type PositionResult<T> = Result<T, PositionError>;
