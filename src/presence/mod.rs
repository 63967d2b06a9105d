//! Presence tracking for moments and mood rooms.
//!
//! Participants are opaque ephemeral ids. All shared state lives in a
//! [`PresenceStore`](crate::store::PresenceStore); correctness across replicas
//! rests on the store's atomic batches and conditional writes, never on
//! in-process locks.

pub mod hub;
pub mod keys;
pub mod simulator;
pub mod tracker;
pub mod window;

use std::time::Duration;
use thiserror::Error;

use crate::store::StoreError;

pub use hub::PresenceHub;
pub use simulator::{PresenceSimulator, SimulationConfig};
pub use tracker::PresenceTracker;

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("participant id must not be empty")]
    InvalidParticipant,

    #[error("room id must be non-empty and must not contain ':'")]
    InvalidRoom,
}

#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// TTL of the presence set and of each member heartbeat
    pub presence_ttl: Duration,
    /// Length of an analytics window
    pub window_period: Duration,
    /// TTL of peak and unique-visitor windows
    pub analytics_retention: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            presence_ttl: Duration::from_secs(75),
            window_period: Duration::from_secs(60),
            analytics_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Room ids become a key segment, so the separator would let one room alias another's keys.
pub(crate) fn ensure_room(room: &str) -> Result<(), PresenceError> {
    if room.trim().is_empty() || room.contains(keys::SEPARATOR) {
        return Err(PresenceError::InvalidRoom);
    }
    Ok(())
}
