use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;
use tracing::{debug, warn};

use super::keys;
use crate::store::{PresenceStore, StoreError};

/// Compare-and-set attempts before a peak update is dropped.
pub const PEAK_UPDATE_ATTEMPTS: usize = 5;

/// Start of the UTC-aligned window containing `now`.
pub fn window_start(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let period_ms = (period.as_millis() as i64).max(1);
    let ms = now.timestamp_millis();
    DateTime::from_timestamp_millis(ms - ms.rem_euclid(period_ms)).unwrap_or(now)
}

/// Window identity shared by every replica, e.g. `2024-05-01T10:00:00.000Z`.
pub fn window_label(start: DateTime<Utc>) -> String {
    start.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp and snap it to its window.
pub fn parse_window(raw: &str, period: Duration) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| window_start(t.with_timezone(&Utc), period))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowStats {
    pub window_start: DateTime<Utc>,
    pub peak: u64,
    pub unique: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakUpdate {
    Raised,
    Unchanged,
    Abandoned,
}

/// Raise the stored peak to `count` if it is higher.
///
/// Optimistic: read, compare, then compare-and-set against the value read.
/// A lost race re-reads; after [`PEAK_UPDATE_ATTEMPTS`] losses the update is
/// dropped and the next join or tick corrects it.
pub async fn update_peak<S: PresenceStore>(
    store: &S,
    key: &str,
    count: u64,
    retention: Duration,
) -> Result<PeakUpdate, StoreError> {
    for attempt in 1..=PEAK_UPDATE_ATTEMPTS {
        let raw = store.get(key).await?;
        let current = match raw.as_deref() {
            None => 0,
            Some(value) => value.parse::<u64>().unwrap_or_else(|_| {
                warn!("Overwriting unparsable peak '{}' at {}", value, key);
                0
            }),
        };
        if count <= current {
            return Ok(PeakUpdate::Unchanged);
        }
        if store
            .compare_and_set(key, raw.as_deref(), &count.to_string(), Some(retention))
            .await?
        {
            return Ok(PeakUpdate::Raised);
        }
        debug!("Peak update for {} lost race (attempt {})", key, attempt);
    }
    warn!("Giving up peak update for {} after {} attempts", key, PEAK_UPDATE_ATTEMPTS);
    Ok(PeakUpdate::Abandoned)
}

pub async fn read_stats<S: PresenceStore>(
    store: &S,
    room: &str,
    start: DateTime<Utc>,
) -> Result<WindowStats, StoreError> {
    let label = window_label(start);
    let peak_key = keys::peak(room, &label);
    let peak = match store.get(&peak_key).await? {
        None => 0,
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| StoreError::InvalidValue { key: peak_key.clone(), value })?,
    };
    let unique = store.distinct_count(&keys::unique(room, &label)).await?;
    Ok(WindowStats {
        window_start: start,
        peak,
        unique,
    })
}
