use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

mod memory;

pub use memory::{MemoryStore, MemoryStoreBuilder};


/// Errors returned by a [`KeyValueStore`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store could not be reached or the connection broke mid-request
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The operation timed out
    #[error("store operation timed out")]
    Timeout,

    /// The key holds a value of a different kind than the operation expects
    #[error("wrong type: {0}")]
    WrongType(String),

    /// The store answered with something we could not interpret
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Shared key-value store used as the only synchronization medium between
/// process instances (the shape of the contract follows redis).
///
/// Every method is a potential network round trip. Implementations must make
/// each call atomic with respect to concurrent callers; in particular
/// [`compare_and_delete`](KeyValueStore::compare_and_delete) must never be
/// split into a read followed by a delete.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Set `key` to `value` with a TTL, only if the key does not exist
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Delete `key` only if its current value equals `expected`.
    ///
    /// Returns the number of deleted keys (0 or 1).
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<i64, StoreError>;

    /// Get a string value
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a string value, replacing any previous value and TTL
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Delete a key of any type
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Set the TTL of an existing key. Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Set the TTL of an existing key only if it has none yet
    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remaining TTL, `None` when the key is absent or has no expiry
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Set a field of a hash, creating the hash if needed
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Get a field of a hash
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Get every field of a hash (empty when the hash does not exist)
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Delete a field of a hash
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    /// Atomically add `n` to an integer counter, creating it at 0 if absent
    async fn incr_by(&self, key: &str, n: i64) -> Result<i64, StoreError>;
}
