use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Fan-out of fresh counts to WebSocket subscribers of this process.
#[derive(Default)]
pub struct PresenceHub {
    rooms: RwLock<HashMap<String, broadcast::Sender<u64>>>,
}

impl PresenceHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the broadcast channel for a room
    pub async fn subscribe(&self, room: &str) -> broadcast::Receiver<u64> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel::<u64>(32);
                tx
            })
            .subscribe()
    }

    /// Relay a count to local subscribers; rooms nobody watches are skipped.
    pub async fn publish(&self, room: &str, count: u64) {
        let rooms = self.rooms.read().await;
        if let Some(tx) = rooms.get(room) {
            // No receivers left is fine
            let _ = tx.send(count);
        }
    }

    /// Drop the channel once its last subscriber is gone.
    pub async fn release(&self, room: &str) {
        let mut rooms = self.rooms.write().await;
        if rooms.get(room).is_some_and(|tx| tx.receiver_count() == 0) {
            rooms.remove(room);
            debug!("Released presence channel for {}", room);
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
