//! Shared keyed store used for presence.
//!
//! The tracker and the simulator only talk to [`PresenceStore`], a narrow
//! capability interface: atomic batches, TTLs, sets, an approximate distinct
//! counter and conditional writes. Any backend offering those primitives
//! satisfies the contract. Two are provided:
//!
//! - [`MemoryStore`]: a single mutex-guarded map, for tests and single-replica runs
//! - [`RedisStore`]: the shared store used when several replicas serve the same rooms

pub mod hll;
pub mod memory;
pub mod redis_store;

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("key '{key}' holds a value of the wrong type")]
    WrongType { key: String },

    #[error("key '{key}' holds an unparsable value '{value}'")]
    InvalidValue { key: String, value: String },
}

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Add members to a set, creating it when missing
    SetAdd { key: String, members: Vec<String> },
    /// Reset the TTL of an existing key
    Expire { key: String, ttl: Duration },
    /// Overwrite a plain value and give it a TTL
    SetValue { key: String, value: String, ttl: Duration },
    /// Feed members into an approximate distinct counter
    DistinctAdd { key: String, members: Vec<String> },
}

pub trait PresenceStore: Send + Sync + 'static {
    /// Apply every op or none of them; readers never see a partial batch.
    fn exec_atomic(&self, ops: Vec<StoreOp>) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove members from a set and return how many were present.
    fn set_remove(&self, key: &str, members: &[String]) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Cardinality of a set, 0 when the key is missing or expired.
    fn set_card(&self, key: &str) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn set_members(&self, key: &str) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Reset a key's TTL. Missing keys are left alone.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Write `value` only if the key currently holds `expected` (`None` = absent).
    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Create the key only if it is absent.
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete the key only if it still holds `value`.
    fn delete_if_equals(&self, key: &str, value: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Approximate number of distinct members fed to a counter.
    fn distinct_count(&self, key: &str) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Backend chosen at startup from configuration.
pub enum StoreBackend {
    Memory(MemoryStore),
    Redis(RedisStore),
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory(_) => "memory",
            StoreBackend::Redis(_) => "redis",
        }
    }
}

impl PresenceStore for StoreBackend {
    async fn exec_atomic(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(s) => s.exec_atomic(ops).await,
            StoreBackend::Redis(s) => s.exec_atomic(ops).await,
        }
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.set_remove(key, members).await,
            StoreBackend::Redis(s) => s.set_remove(key, members).await,
        }
    }

    async fn set_card(&self, key: &str) -> Result<u64, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.set_card(key).await,
            StoreBackend::Redis(s) => s.set_card(key).await,
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.set_members(key).await,
            StoreBackend::Redis(s) => s.set_members(key).await,
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(s) => s.expire(key, ttl).await,
            StoreBackend::Redis(s) => s.expire(key, ttl).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.get(key).await,
            StoreBackend::Redis(s) => s.get(key).await,
        }
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.compare_and_set(key, expected, value, ttl).await,
            StoreBackend::Redis(s) => s.compare_and_set(key, expected, value, ttl).await,
        }
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.set_if_absent(key, value, ttl).await,
            StoreBackend::Redis(s) => s.set_if_absent(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(s) => s.delete(key).await,
            StoreBackend::Redis(s) => s.delete(key).await,
        }
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.delete_if_equals(key, value).await,
            StoreBackend::Redis(s) => s.delete_if_equals(key, value).await,
        }
    }

    async fn distinct_count(&self, key: &str) -> Result<u64, StoreError> {
        match self {
            StoreBackend::Memory(s) => s.distinct_count(key).await,
            StoreBackend::Redis(s) => s.distinct_count(key).await,
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(s) => s.ping().await,
            StoreBackend::Redis(s) => s.ping().await,
        }
    }
}
