use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::hll::HyperLogLog;
use super::{PresenceStore, StoreError, StoreOp};

#[derive(Debug)]
enum Value {
    Text(String),
    Set(HashSet<String>),
    Distinct(HyperLogLog),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Set,
    Distinct,
}

impl Value {
    fn kind(&self) -> Kind {
        match self {
            Value::Text(_) => Kind::Text,
            Value::Set(_) => Kind::Set,
            Value::Distinct(_) => Kind::Distinct,
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process store guarded by one mutex.
///
/// Every operation takes the lock once, so each call (and each atomic batch)
/// is serialized against all others. Expired keys are dropped lazily when
/// touched. Time comes from the tokio clock, which lets paused-time tests
/// drive TTL expiry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // Batches are validated before they mutate, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        let mut entries = self.lock();
        live(&mut entries, key).is_some()
    }
}

fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
        return None;
    }
    entries.get_mut(key)
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType { key: key.to_string() }
}

fn check_batch(entries: &mut HashMap<String, Entry>, ops: &[StoreOp]) -> Result<(), StoreError> {
    // Types as they will be once earlier ops in the batch have run
    let mut planned: HashMap<&str, Kind> = HashMap::new();
    for op in ops {
        let (key, wanted) = match op {
            StoreOp::SetAdd { key, .. } => (key.as_str(), Some(Kind::Set)),
            StoreOp::DistinctAdd { key, .. } => (key.as_str(), Some(Kind::Distinct)),
            StoreOp::SetValue { key, .. } => {
                planned.insert(key.as_str(), Kind::Text);
                continue;
            }
            StoreOp::Expire { .. } => continue,
        };
        let current = match planned.get(key) {
            Some(kind) => Some(*kind),
            None => live(entries, key).map(|e| e.value.kind()),
        };
        match (current, wanted) {
            (Some(have), Some(want)) if have != want => return Err(wrong_type(key)),
            (_, Some(want)) => {
                planned.insert(key, want);
            }
            _ => {}
        }
    }
    Ok(())
}

impl PresenceStore for MemoryStore {
    async fn exec_atomic(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        let mut entries = self.lock();
        check_batch(&mut entries, &ops)?;

        for op in ops {
            match op {
                StoreOp::SetAdd { key, members } => {
                    let entry = entries
                        .entry(key)
                        .or_insert_with(|| Entry::new(Value::Set(HashSet::new()), None));
                    if let Value::Set(set) = &mut entry.value {
                        set.extend(members);
                    }
                }
                StoreOp::DistinctAdd { key, members } => {
                    let entry = entries
                        .entry(key)
                        .or_insert_with(|| Entry::new(Value::Distinct(HyperLogLog::new()), None));
                    if let Value::Distinct(hll) = &mut entry.value {
                        for member in &members {
                            hll.insert(member.as_bytes());
                        }
                    }
                }
                StoreOp::SetValue { key, value, ttl } => {
                    entries.insert(key, Entry::new(Value::Text(value), Some(ttl)));
                }
                StoreOp::Expire { key, ttl } => {
                    if let Some(entry) = live(&mut entries, &key) {
                        entry.expires_at = Some(Instant::now() + ttl);
                    }
                }
            }
        }
        Ok(())
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
        let mut entries = self.lock();
        let Some(entry) = live(&mut entries, key) else {
            return Ok(0);
        };
        let Value::Set(set) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        let removed = members.iter().filter(|m| set.remove(m.as_str())).count() as u64;
        if set.is_empty() {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn set_card(&self, key: &str) -> Result<u64, StoreError> {
        let mut entries = self.lock();
        match live(&mut entries, key).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::Set(set)) => Ok(set.len() as u64),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.lock();
        match live(&mut entries, key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.lock();
        if let Some(entry) = live(&mut entries, key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock();
        match live(&mut entries, key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Text(text)) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.lock();
        let current = match live(&mut entries, key).map(|e| &e.value) {
            None => None,
            Some(Value::Text(text)) => Some(text.as_str()),
            Some(_) => return Err(wrong_type(key)),
        };
        if current != expected {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::new(Value::Text(value.to_string()), ttl));
        Ok(true)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut entries = self.lock();
        if live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::new(Value::Text(value.to_string()), Some(ttl)));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock();
        let matches = matches!(
            live(&mut entries, key).map(|e| &e.value),
            Some(Value::Text(text)) if text == value
        );
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn distinct_count(&self, key: &str) -> Result<u64, StoreError> {
        let mut entries = self.lock();
        match live(&mut entries, key).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::Distinct(hll)) => Ok(hll.count()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
