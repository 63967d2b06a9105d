use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::presence::{PresenceHub, PresenceSimulator, PresenceTracker};
use crate::store::{MemoryStore, RedisStore, StoreBackend, StoreError};

/// Shared handles passed to every handler.
pub struct AppState {
    pub config: Config,
    pub tracker: PresenceTracker<StoreBackend>,
    pub simulator: PresenceSimulator<StoreBackend>,
    pub hub: PresenceHub,
    /// Last count served per room, used when the store is unreachable
    pub last_counts: Cache<String, u64>,
}

impl AppState {
    pub fn new(config: Config, store: StoreBackend) -> Arc<Self> {
        let store = Arc::new(store);
        let tracker = PresenceTracker::new(store.clone(), config.presence());
        let simulator = PresenceSimulator::new(store, config.simulation(), config.presence());
        let last_counts = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(Duration::from_secs(5 * 60))
            .build();

        Arc::new(Self {
            config,
            tracker,
            simulator,
            hub: PresenceHub::new(),
            last_counts,
        })
    }

    /// Remember a fresh count and relay it to local subscribers
    pub async fn record_count(&self, room: &str, count: u64) {
        self.last_counts.insert(room.to_string(), count);
        self.hub.publish(room, count).await;
    }
}

/// Connect the configured store, falling back to process memory
pub async fn connect_store(config: &Config) -> Result<StoreBackend, StoreError> {
    match &config.redis_url {
        Some(url) => {
            let store = RedisStore::connect(url).await?;
            Ok(StoreBackend::Redis(store))
        }
        None => {
            warn!("No REDIS_URL configured - presence is kept in memory and not shared between replicas");
            info!("Using in-memory presence store");
            Ok(StoreBackend::Memory(MemoryStore::new()))
        }
    }
}
