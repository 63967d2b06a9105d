//! Synthetic presence for rooms without real traffic.
//!
//! A simulation writes the same keys a real join does, so readers cannot tell
//! synthetic members from real ones. At most one driver runs per room across
//! all replicas: starting requires creating the room's simulation lock, whose
//! TTL equals the maximum run time so a crashed driver frees the room.

use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::window;
use super::{ensure_room, keys, PresenceConfig, PresenceError};
use crate::store::{PresenceStore, StoreOp};

/// Prefix marking synthetic participant ids.
pub const SYNTHETIC_PREFIX: &str = "sim:";

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub enabled: bool,
    /// Lower bound of the target band
    pub min: u64,
    /// Upper bound of the target band
    pub max: u64,
    pub tick: Duration,
    /// Ramp length; afterwards the count decays toward `min`
    pub decay_after: Duration,
    /// Hard stop, also the lock TTL
    pub max_duration: Duration,
    /// TTL applied to the presence set on every tick
    pub presence_ttl: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min: 3,
            max: 19,
            tick: Duration::from_millis(4_000),
            decay_after: Duration::from_millis(180_000),
            max_duration: Duration::from_millis(600_000),
            presence_ttl: Duration::from_secs(75),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationStart {
    Started,
    /// The room's lock is held by this or another replica
    AlreadyRunning,
    Disabled,
}

impl SimulationStart {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationStart::Started => "started",
            SimulationStart::AlreadyRunning => "already_running",
            SimulationStart::Disabled => "disabled",
        }
    }
}

/// Per-room parameters, kept in the driver task only.
#[derive(Debug, Clone)]
struct SimulationState {
    ceiling: u64,
    started_at: Instant,
}

struct Driver {
    token: String,
    task: JoinHandle<()>,
}

struct Inner<S> {
    store: Arc<S>,
    config: SimulationConfig,
    presence: PresenceConfig,
    drivers: Mutex<HashMap<String, Driver>>,
}

/// Owns the local simulation drivers, one cancellable task per room.
pub struct PresenceSimulator<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for PresenceSimulator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: PresenceStore> PresenceSimulator<S> {
    pub fn new(store: Arc<S>, config: SimulationConfig, presence: PresenceConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                presence,
                drivers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub async fn start_for_moment(&self, room: &str) -> Result<SimulationStart, PresenceError> {
        ensure_room(room)?;
        let config = &self.inner.config;
        if !config.enabled {
            debug!("Simulation disabled, not starting {}", room);
            return Ok(SimulationStart::Disabled);
        }

        let token = Uuid::new_v4().to_string();
        let acquired = self
            .inner
            .store
            .set_if_absent(&keys::simulation_lock(room), &token, config.max_duration)
            .await?;
        if !acquired {
            debug!("Simulation for {} already owned elsewhere", room);
            return Ok(SimulationStart::AlreadyRunning);
        }

        let state = SimulationState {
            ceiling: rand::thread_rng().gen_range(config.min..=config.max),
            started_at: Instant::now(),
        };
        info!("Starting presence simulation for {} (ceiling {})", room, state.ceiling);

        let mut drivers = self.inner.drivers();
        let task = tokio::spawn(run(self.inner.clone(), room.to_string(), token.clone(), state));
        if let Some(stale) = drivers.insert(room.to_string(), Driver { token, task }) {
            // Our previous lock lapsed while the driver was still registered
            warn!("Replacing stale simulation driver for {}", room);
            stale.task.abort();
        }
        Ok(SimulationStart::Started)
    }

    /// Cancel the local driver, if any, and release the room's lock.
    pub async fn stop_for_moment(&self, room: &str) -> Result<(), PresenceError> {
        ensure_room(room)?;
        let driver = self.inner.drivers().remove(room);
        if let Some(driver) = driver {
            driver.task.abort();
            info!("Stopped presence simulation for {}", room);
        }
        self.inner.store.delete(&keys::simulation_lock(room)).await?;
        Ok(())
    }

    /// Stop every local driver; used on shutdown.
    pub async fn stop_all(&self) {
        let drained: Vec<(String, Driver)> = self.inner.drivers().drain().collect();
        for (room, driver) in drained {
            driver.task.abort();
            if let Err(e) = self
                .inner
                .store
                .delete_if_equals(&keys::simulation_lock(&room), &driver.token)
                .await
            {
                error!("Failed to release simulation lock for {}: {}", room, e);
            }
        }
    }

    /// Whether this process currently drives the room.
    pub fn is_running(&self, room: &str) -> bool {
        self.inner
            .drivers()
            .get(room)
            .is_some_and(|driver| !driver.task.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .drivers()
            .values()
            .filter(|driver| !driver.task.is_finished())
            .count()
    }
}

impl<S: PresenceStore> Inner<S> {
    fn drivers(&self) -> MutexGuard<'_, HashMap<String, Driver>> {
        self.drivers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop the room's driver entry if it still belongs to this run.
    fn unregister(&self, room: &str, token: &str) {
        let mut drivers = self.drivers();
        if drivers.get(room).is_some_and(|d| d.token == token) {
            drivers.remove(room);
        }
    }

    async fn owns_lock(&self, room: &str, token: &str) -> Result<bool, PresenceError> {
        let holder = self.store.get(&keys::simulation_lock(room)).await?;
        Ok(holder.as_deref() == Some(token))
    }

    async fn finish(&self, room: &str, token: &str) {
        self.unregister(room, token);
        // The lock may already belong to another replica
        match self.store.delete_if_equals(&keys::simulation_lock(room), token).await {
            Ok(_) => info!("Presence simulation for {} reached its maximum duration", room),
            Err(e) => error!("Failed to release simulation lock for {}: {}", room, e),
        }
    }

    async fn tick(&self, room: &str, state: &SimulationState, elapsed: Duration) -> Result<u64, PresenceError> {
        let label = window::window_label(window::window_start(Utc::now(), self.presence.window_period));
        let presence_key = keys::presence(room);
        let unique_key = keys::unique(room, &label);

        let current = self.store.set_card(&presence_key).await?;
        let jitter = rand::thread_rng().gen_range(-1..=1);
        let target = next_target(&self.config, state.ceiling, elapsed, current, jitter);

        if target > current {
            let members: Vec<String> = (current..target)
                .map(|_| format!("{}{}", SYNTHETIC_PREFIX, Uuid::new_v4()))
                .collect();
            self.store
                .exec_atomic(vec![
                    StoreOp::SetAdd {
                        key: presence_key.clone(),
                        members: members.clone(),
                    },
                    StoreOp::Expire {
                        key: presence_key.clone(),
                        ttl: self.config.presence_ttl,
                    },
                    StoreOp::DistinctAdd {
                        key: unique_key.clone(),
                        members,
                    },
                    StoreOp::Expire {
                        key: unique_key,
                        ttl: self.presence.analytics_retention,
                    },
                ])
                .await?;
        } else {
            if target < current {
                let excess = (current - target) as usize;
                let synthetic: Vec<String> = self
                    .store
                    .set_members(&presence_key)
                    .await?
                    .into_iter()
                    .filter(|member| member.starts_with(SYNTHETIC_PREFIX))
                    .take(excess)
                    .collect();
                if !synthetic.is_empty() {
                    self.store.set_remove(&presence_key, &synthetic).await?;
                }
            }
            self.store.expire(&presence_key, self.config.presence_ttl).await?;
        }

        let count = self.store.set_card(&presence_key).await?;
        window::update_peak(
            self.store.as_ref(),
            &keys::peak(room, &label),
            count,
            self.presence.analytics_retention,
        )
        .await?;
        Ok(count)
    }
}

async fn run<S: PresenceStore>(inner: Arc<Inner<S>>, room: String, token: String, state: SimulationState) {
    let tick = inner.config.tick;
    let mut ticker = interval_at(state.started_at + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let elapsed = state.started_at.elapsed();
        if elapsed > inner.config.max_duration {
            inner.finish(&room, &token).await;
            return;
        }
        // A stop racing the start, or a lapsed lock, leaves this driver without ownership
        match inner.owns_lock(&room, &token).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Simulation lock for {} is no longer ours, stopping driver", room);
                inner.unregister(&room, &token);
                return;
            }
            Err(e) => {
                warn!("Could not verify simulation lock for {}: {}", room, e);
                continue;
            }
        }
        match inner.tick(&room, &state, elapsed).await {
            Ok(count) => debug!("Simulation tick for {}: {} present", room, count),
            // Transient store errors must not end the run
            Err(e) => warn!("Simulation tick for {} failed: {}", room, e),
        }
    }
}

/// Target room size for the next tick.
///
/// Ramp phase: sub-linear ease (`t^0.6`) from `min` toward the ceiling.
/// Afterwards: 95% of the current count, never below `min`. Jitter is
/// applied last and the result clamped to `[min, ceiling]`.
pub(crate) fn next_target(
    config: &SimulationConfig,
    ceiling: u64,
    elapsed: Duration,
    current: u64,
    jitter: i64,
) -> u64 {
    let min = config.min.min(ceiling);
    let base = if elapsed < config.decay_after {
        let t = elapsed.as_secs_f64() / config.decay_after.as_secs_f64();
        let eased = t.min(1.0).powf(0.6);
        (min as f64 + (ceiling - min) as f64 * eased).floor() as u64
    } else {
        ((current as f64 * 0.95).floor() as u64).max(min)
    };
    (base as i64 + jitter).clamp(min as i64, ceiling as i64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceTracker;
    use crate::store::{MemoryStore, StoreError};
    use tokio::time::sleep;

    fn fast_config() -> SimulationConfig {
        SimulationConfig {
            enabled: true,
            min: 3,
            max: 19,
            tick: Duration::from_millis(50),
            decay_after: Duration::from_millis(1_000),
            max_duration: Duration::from_millis(10_000),
            presence_ttl: Duration::from_secs(75),
        }
    }

    /// Memory store whose lock acquisition yields before reporting back.
    struct SlowLockStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl PresenceStore for SlowLockStore {
        async fn exec_atomic(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
            self.inner.exec_atomic(ops).await
        }

        async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
            self.inner.set_remove(key, members).await
        }

        async fn set_card(&self, key: &str) -> Result<u64, StoreError> {
            self.inner.set_card(key).await
        }

        async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
            self.inner.set_members(key).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
            self.inner.expire(key, ttl).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn compare_and_set(
            &self,
            key: &str,
            expected: Option<&str>,
            value: &str,
            ttl: Option<Duration>,
        ) -> Result<bool, StoreError> {
            self.inner.compare_and_set(key, expected, value, ttl).await
        }

        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
            let acquired = self.inner.set_if_absent(key, value, ttl).await?;
            sleep(self.delay).await;
            Ok(acquired)
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }

        async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
            self.inner.delete_if_equals(key, value).await
        }

        async fn distinct_count(&self, key: &str) -> Result<u64, StoreError> {
            self.inner.distinct_count(key).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }
    }

    fn simulator(config: SimulationConfig) -> (Arc<MemoryStore>, PresenceSimulator<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let sim = PresenceSimulator::new(store.clone(), config, PresenceConfig::default());
        (store, sim)
    }

    #[test]
    fn ramp_eases_from_min_to_ceiling() {
        let config = fast_config();
        assert_eq!(next_target(&config, 15, Duration::ZERO, 0, 0), 3);
        assert_eq!(next_target(&config, 15, Duration::from_millis(999), 0, 0), 14);
        // Sub-linear curve: a quarter of the way in is well past a quarter of the range
        let quarter = next_target(&config, 15, Duration::from_millis(250), 0, 0);
        assert!(quarter > 6, "eased target {quarter}");
    }

    #[test]
    fn decay_pulls_toward_min() {
        let config = fast_config();
        let late = Duration::from_millis(2_000);
        assert_eq!(next_target(&config, 15, late, 10, 0), 9);
        assert_eq!(next_target(&config, 15, late, 3, 0), 3);
        assert_eq!(next_target(&config, 15, late, 0, 0), 3);
    }

    #[test]
    fn jitter_is_clamped_to_band() {
        let config = fast_config();
        assert_eq!(next_target(&config, 15, Duration::ZERO, 0, -1), 3);
        assert_eq!(next_target(&config, 15, Duration::from_millis(2_000), 40, 1), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_a_no_op() {
        let (_store, sim) = simulator(fast_config());
        assert_eq!(sim.start_for_moment("abc").await.unwrap(), SimulationStart::Started);
        assert_eq!(sim.start_for_moment("abc").await.unwrap(), SimulationStart::AlreadyRunning);
        assert_eq!(sim.active_count(), 1);
        sim.stop_for_moment("abc").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn another_replica_cannot_double_drive() {
        let store = Arc::new(MemoryStore::new());
        let a = PresenceSimulator::new(store.clone(), fast_config(), PresenceConfig::default());
        let b = PresenceSimulator::new(store.clone(), fast_config(), PresenceConfig::default());
        assert_eq!(a.start_for_moment("abc").await.unwrap(), SimulationStart::Started);
        assert_eq!(b.start_for_moment("abc").await.unwrap(), SimulationStart::AlreadyRunning);
        assert!(a.is_running("abc"));
        assert!(!b.is_running("abc"));
        a.stop_for_moment("abc").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_simulation_never_locks() {
        let (store, sim) = simulator(SimulationConfig {
            enabled: false,
            ..fast_config()
        });
        assert_eq!(sim.start_for_moment("abc").await.unwrap(), SimulationStart::Disabled);
        assert_eq!(store.get(&keys::simulation_lock("abc")).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn simulation_populates_the_room() {
        let (store, sim) = simulator(fast_config());
        sim.start_for_moment("abc").await.unwrap();
        sleep(Duration::from_millis(80)).await;

        let count = store.set_card(&keys::presence("abc")).await.unwrap();
        assert!(count >= 3, "count {count}");
        let members = store.set_members(&keys::presence("abc")).await.unwrap();
        assert!(members.iter().all(|m| m.starts_with(SYNTHETIC_PREFIX)));
        sim.stop_for_moment("abc").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn count_stays_within_band_while_running() {
        let config = fast_config();
        let (store, sim) = simulator(config.clone());
        sim.start_for_moment("abc").await.unwrap();

        sleep(Duration::from_millis(25)).await;
        for _ in 0..150 {
            sleep(config.tick).await;
            let count = store.set_card(&keys::presence("abc")).await.unwrap();
            assert!((config.min..=config.max).contains(&count), "count {count}");
        }
        sim.stop_for_moment("abc").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_then_start_restarts() {
        let (store, sim) = simulator(fast_config());
        sim.start_for_moment("abc").await.unwrap();
        sleep(Duration::from_millis(120)).await;
        sim.stop_for_moment("abc").await.unwrap();
        assert!(!sim.is_running("abc"));
        assert_eq!(store.get(&keys::simulation_lock("abc")).await.unwrap(), None);

        assert_eq!(sim.start_for_moment("abc").await.unwrap(), SimulationStart::Started);
        sim.stop_for_moment("abc").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_an_idle_room_is_harmless() {
        let (_store, sim) = simulator(fast_config());
        sim.stop_for_moment("idle").await.unwrap();
        sim.stop_for_moment("idle").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn real_members_are_never_removed() {
        let config = SimulationConfig {
            min: 1,
            max: 2,
            ..fast_config()
        };
        let (store, sim) = simulator(config);
        let tracker = PresenceTracker::new(store.clone(), PresenceConfig::default());
        for id in ["u1", "u2", "u3"] {
            tracker.join("abc", id).await.unwrap();
        }

        sim.start_for_moment("abc").await.unwrap();
        sleep(Duration::from_millis(1_000)).await;

        let members = store.set_members(&keys::presence("abc")).await.unwrap();
        for id in ["u1", "u2", "u3"] {
            assert!(members.iter().any(|m| m == id), "{id} was removed");
        }
        assert_eq!(members.len(), 3);
        sim.stop_for_moment("abc").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_ends_after_max_duration() {
        let (store, sim) = simulator(SimulationConfig {
            max_duration: Duration::from_millis(500),
            ..fast_config()
        });
        sim.start_for_moment("abc").await.unwrap();
        sleep(Duration::from_millis(600)).await;

        assert!(!sim.is_running("abc"));
        assert_eq!(store.get(&keys::simulation_lock("abc")).await.unwrap(), None);
        assert_eq!(sim.start_for_moment("abc").await.unwrap(), SimulationStart::Started);
        sim.stop_for_moment("abc").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn expired_driver_leaves_a_foreign_lock_alone() {
        let (store, sim) = simulator(SimulationConfig {
            max_duration: Duration::from_millis(200),
            ..fast_config()
        });
        sim.start_for_moment("abc").await.unwrap();

        sleep(Duration::from_millis(210)).await;
        let lock = keys::simulation_lock("abc");
        assert!(store.set_if_absent(&lock, "other-replica", Duration::from_secs(10)).await.unwrap());

        sleep(Duration::from_millis(100)).await;
        assert!(!sim.is_running("abc"));
        assert_eq!(store.get(&lock).await.unwrap().as_deref(), Some("other-replica"));
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_members_feed_window_analytics() {
        let (store, sim) = simulator(fast_config());
        sim.start_for_moment("abc").await.unwrap();
        sleep(Duration::from_millis(80)).await;
        sim.stop_for_moment("abc").await.unwrap();

        let tracker = PresenceTracker::new(store.clone(), PresenceConfig::default());
        let count = tracker.count("abc").await.unwrap();
        let stats = tracker.stats("abc", None).await.unwrap();
        assert!(stats.peak >= count);
        assert!(stats.unique >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_start_leaves_no_unlocked_driver() {
        let store = Arc::new(SlowLockStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(10),
        });
        let a = PresenceSimulator::new(store.clone(), fast_config(), PresenceConfig::default());
        let b = PresenceSimulator::new(store.clone(), fast_config(), PresenceConfig::default());

        let starting = tokio::spawn({
            let a = a.clone();
            async move { a.start_for_moment("abc").await }
        });
        sleep(Duration::from_millis(5)).await;
        a.stop_for_moment("abc").await.unwrap();
        assert_eq!(starting.await.unwrap().unwrap(), SimulationStart::Started);

        assert_eq!(b.start_for_moment("abc").await.unwrap(), SimulationStart::Started);
        sleep(Duration::from_millis(200)).await;

        assert!(!a.is_running("abc"));
        assert!(b.is_running("abc"));
        let count = store.set_card(&keys::presence("abc")).await.unwrap();
        assert!(count <= fast_config().max, "count {count}");
        b.stop_for_moment("abc").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_ticks_do_not_end_the_run() {
        let (store, sim) = simulator(fast_config());
        let presence_key = keys::presence("abc");
        assert!(store.compare_and_set(&presence_key, None, "blocked", None).await.unwrap());

        sim.start_for_moment("abc").await.unwrap();
        sleep(Duration::from_millis(220)).await;
        assert!(sim.is_running("abc"));
        assert_eq!(store.get(&presence_key).await.unwrap().as_deref(), Some("blocked"));

        store.delete(&presence_key).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        let count = store.set_card(&presence_key).await.unwrap();
        assert!(count >= 3, "count {count}");
        sim.stop_for_moment("abc").await.unwrap();
    }
}
