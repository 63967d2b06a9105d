use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use super::window::{self, WindowStats};
use super::{ensure_room, keys, PresenceConfig, PresenceError};
use crate::store::{PresenceStore, StoreOp};

/// Join/leave/count protocol plus per-window peak and unique-visitor bookkeeping.
pub struct PresenceTracker<S> {
    store: Arc<S>,
    config: PresenceConfig,
}

impl<S> Clone for PresenceTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: PresenceStore> PresenceTracker<S> {
    pub fn new(store: Arc<S>, config: PresenceConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    /// Add a participant and return the room's fresh count.
    ///
    /// Membership, both TTL refreshes and the unique-visitor feed go out as one
    /// atomic batch. Joining twice with the same id does not change the count.
    pub async fn join(&self, room: &str, participant: &str) -> Result<u64, PresenceError> {
        self.join_at(room, participant, Utc::now()).await
    }

    pub async fn join_at(
        &self,
        room: &str,
        participant: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, PresenceError> {
        ensure_room(room)?;
        if participant.trim().is_empty() {
            return Err(PresenceError::InvalidParticipant);
        }

        let label = window::window_label(window::window_start(now, self.config.window_period));
        let presence_key = keys::presence(room);
        let unique_key = keys::unique(room, &label);

        self.store
            .exec_atomic(vec![
                StoreOp::SetAdd {
                    key: presence_key.clone(),
                    members: vec![participant.to_string()],
                },
                StoreOp::Expire {
                    key: presence_key.clone(),
                    ttl: self.config.presence_ttl,
                },
                StoreOp::SetValue {
                    key: keys::heartbeat(room, participant),
                    value: now.timestamp_millis().to_string(),
                    ttl: self.config.presence_ttl,
                },
                StoreOp::DistinctAdd {
                    key: unique_key.clone(),
                    members: vec![participant.to_string()],
                },
                StoreOp::Expire {
                    key: unique_key,
                    ttl: self.config.analytics_retention,
                },
            ])
            .await?;

        let count = self.store.set_card(&presence_key).await?;
        window::update_peak(
            self.store.as_ref(),
            &keys::peak(room, &label),
            count,
            self.config.analytics_retention,
        )
        .await?;

        debug!("{} joined {} ({} present)", participant, room, count);
        Ok(count)
    }

    /// Remove a participant. Unknown participants are not an error.
    pub async fn leave(&self, room: &str, participant: &str) -> Result<u64, PresenceError> {
        ensure_room(room)?;
        let presence_key = keys::presence(room);
        let removed = self
            .store
            .set_remove(&presence_key, &[participant.to_string()])
            .await?;
        let count = self.store.set_card(&presence_key).await?;
        if removed > 0 {
            debug!("{} left {} ({} present)", participant, room, count);
        }
        Ok(count)
    }

    /// Current count; 0 for unknown or expired rooms.
    pub async fn count(&self, room: &str) -> Result<u64, PresenceError> {
        ensure_room(room)?;
        Ok(self.store.set_card(&keys::presence(room)).await?)
    }

    /// Peak and approximate unique visitors of a window (default: the current one).
    pub async fn stats(
        &self,
        room: &str,
        window_start: Option<DateTime<Utc>>,
    ) -> Result<WindowStats, PresenceError> {
        ensure_room(room)?;
        let start = window_start
            .unwrap_or_else(|| window::window_start(Utc::now(), self.config.window_period));
        Ok(window::read_stats(self.store.as_ref(), room, start).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use futures_util::future::join_all;
    use std::time::Duration;

    fn tracker() -> PresenceTracker<MemoryStore> {
        PresenceTracker::new(Arc::new(MemoryStore::new()), PresenceConfig::default())
    }

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + chrono::Duration::seconds(secs as i64)
    }

    #[tokio::test]
    async fn join_leave_count_scenario() {
        let tracker = tracker();
        assert_eq!(tracker.join("room1", "u1").await.unwrap(), 1);
        assert_eq!(tracker.join("room1", "u2").await.unwrap(), 2);
        assert_eq!(tracker.count("room1").await.unwrap(), 2);
        assert_eq!(tracker.leave("room1", "u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn joining_twice_counts_once() {
        let tracker = tracker();
        assert_eq!(tracker.join("room1", "u1").await.unwrap(), 1);
        assert_eq!(tracker.join("room1", "u1").await.unwrap(), 1);
        assert_eq!(tracker.count("room1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn leaving_without_joining_keeps_count() {
        let tracker = tracker();
        tracker.join("room1", "u1").await.unwrap();
        assert_eq!(tracker.leave("room1", "stranger").await.unwrap(), 1);
        assert_eq!(tracker.leave("empty-room", "stranger").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_room_counts_zero() {
        assert_eq!(tracker().count("nowhere").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_ids_are_rejected() {
        let tracker = tracker();
        assert!(matches!(
            tracker.join("room1", " ").await,
            Err(PresenceError::InvalidParticipant)
        ));
        assert!(matches!(tracker.count("").await, Err(PresenceError::InvalidRoom)));
    }

    #[tokio::test]
    async fn room_ids_cannot_alias_another_rooms_keys() {
        let tracker = tracker();
        assert!(matches!(
            tracker.join("a:sim:lock", "u1").await,
            Err(PresenceError::InvalidRoom)
        ));
        assert!(matches!(tracker.count("a:hll:x").await, Err(PresenceError::InvalidRoom)));
        assert!(!tracker.store().contains(&keys::presence("a:sim:lock")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_count_every_participant() {
        let tracker = tracker();
        let joins = (0..64).map(|i| {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.join_at("busy", &format!("u{i}"), at(15)).await })
        });
        for result in join_all(joins).await {
            result.unwrap().unwrap();
        }
        assert_eq!(tracker.count("busy").await.unwrap(), 64);

        let stats = tracker.stats("busy", Some(at(0))).await.unwrap();
        assert_eq!(stats.peak, 64);
    }

    #[tokio::test]
    async fn peak_survives_members_leaving() {
        let tracker = tracker();
        for id in ["a", "b", "c"] {
            tracker.join_at("room1", id, at(5)).await.unwrap();
        }
        tracker.leave("room1", "a").await.unwrap();
        tracker.leave("room1", "b").await.unwrap();
        tracker.join_at("room1", "d", at(30)).await.unwrap();

        let stats = tracker.stats("room1", Some(at(0))).await.unwrap();
        assert_eq!(stats.peak, 3);
        assert_eq!(stats.unique, 4);
    }

    #[tokio::test]
    async fn new_window_starts_a_fresh_peak() {
        let tracker = tracker();
        for id in ["a", "b", "c"] {
            tracker.join_at("room1", id, at(10)).await.unwrap();
        }
        tracker.leave("room1", "a").await.unwrap();
        tracker.leave("room1", "b").await.unwrap();
        tracker.join_at("room1", "c", at(70)).await.unwrap();

        let next = tracker.stats("room1", Some(at(60))).await.unwrap();
        assert_eq!(next.peak, 1);
        assert_eq!(next.unique, 1);
        assert_eq!(tracker.stats("room1", Some(at(0))).await.unwrap().peak, 3);
    }

    #[tokio::test]
    async fn join_writes_member_heartbeat() {
        let tracker = tracker();
        tracker.join_at("room1", "u1", at(1)).await.unwrap();
        let stamp = tracker.store().get(&keys::heartbeat("room1", "u1")).await.unwrap();
        assert_eq!(stamp, Some(at(1).timestamp_millis().to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_room_expires_as_a_whole() {
        let tracker = PresenceTracker::new(
            Arc::new(MemoryStore::new()),
            PresenceConfig {
                presence_ttl: Duration::from_secs(75),
                ..PresenceConfig::default()
            },
        );
        tracker.join("room1", "u1").await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        tracker.join("room1", "u2").await.unwrap();

        // u1 never left, but the whole set lives on while anyone joins
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(tracker.count("room1").await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(tracker.count("room1").await.unwrap(), 0);
    }
}
