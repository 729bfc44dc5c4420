use super::{KeyValueStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

// Configuration constants
const DEFAULT_CAPACITY: usize = 1000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

enum Value {
    Str(String),
    Hash(std::collections::HashMap<String, String>),
}

struct Entry {
    value: Value,
    /// `None` also when the TTL lies beyond what `Instant` can represent
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|exp| exp > now)
    }
}

struct Inner {
    data: HashMap<String, Entry>,
    // Track when next cleanup is needed
    next_cleanup: Instant,
    cleanup_interval: Duration,
    // Number of entries removed by the last sweep
    expired_count: usize,
}

impl Inner {
    fn live(&self, key: &str, now: Instant) -> Option<&Entry> {
        self.data.get(key).filter(|entry| entry.is_live(now))
    }

    fn live_mut(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self.data.get(key).is_some_and(|entry| !entry.is_live(now)) {
            self.data.remove(key);
        }
        self.data.get_mut(key)
    }

    fn maybe_clean_expired(&mut self, now: Instant) {
        // Clean periodically based on time, not on every write
        if now >= self.next_cleanup {
            let before_count = self.data.len();
            self.data.retain(|_, entry| entry.is_live(now));
            self.expired_count = before_count.saturating_sub(self.data.len());
            self.next_cleanup = now + self.cleanup_interval;
        }
    }
}

fn wrong_type() -> StoreError {
    StoreError::WrongType("operation against a key holding the wrong kind of value".into())
}

/// In-process [`KeyValueStore`]
///
/// Keeps strings and hashes in a single map guarded by a mutex. Expired
/// entries are invisible to reads immediately and physically removed by a
/// sweep that runs on writes at most once per cleanup interval.
///
/// Suitable for tests, development and single-instance deployments: nothing
/// is shared between processes.
///
/// # Example
///
/// ```
/// use lockcrab::{KeyValueStore, MemoryStore};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::builder()
///     .cleanup_interval(Duration::from_secs(30))
///     .build();
/// assert!(store.set_if_absent("k", "v", Duration::from_secs(5)).await.unwrap());
/// assert!(!store.set_if_absent("k", "w", Duration::from_secs(5)).await.unwrap());
/// # });
/// ```
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

/// Builder for configuring a [`MemoryStore`]
pub struct MemoryStoreBuilder {
    capacity: usize,
    cleanup_interval: Duration,
}

impl MemoryStore {
    /// Create a store with default capacity and a 60 second cleanup interval
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new builder for configuring a MemoryStore
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    fn with_config(capacity: usize, cleanup_interval: Duration) -> Self {
        MemoryStore {
            inner: Mutex::new(Inner {
                // Pre-allocate with overhead to avoid rehashing
                data: HashMap::with_capacity(
                    (capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize,
                ),
                next_cleanup: Instant::now() + cleanup_interval,
                cleanup_interval,
                expired_count: 0,
            }),
        }
    }

    /// Number of physically stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn expired_count(&self) -> usize {
        self.inner.lock().expired_count
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.maybe_clean_expired(now);

        if inner.live(key, now).is_some() {
            return Ok(false);
        }
        inner.data.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let matches = matches!(
            inner.live(key, now),
            Some(Entry { value: Value::Str(current), .. }) if current == expected
        );
        if matches {
            inner.data.remove(key);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let inner = self.inner.lock();
        match inner.live(key, now) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type()),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.maybe_clean_expired(now);

        inner.data.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        if inner.live_mut(key, now).is_none() {
            return Ok(false);
        }
        Ok(inner.data.remove(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.live_mut(key, now) {
            Some(entry) => {
                entry.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.live_mut(key, now) {
            Some(entry) if entry.expires_at.is_none() => {
                entry.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let inner = self.inner.lock();
        Ok(inner
            .live(key, now)
            .and_then(|entry| entry.expires_at)
            .map(|exp| exp.saturating_duration_since(now)))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.maybe_clean_expired(now);

        match inner.live_mut(key, now) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => {
                fields.insert(field.to_string(), value.to_string());
            }
            Some(_) => return Err(wrong_type()),
            None => {
                let mut fields = std::collections::HashMap::new();
                fields.insert(field.to_string(), value.to_string());
                inner.data.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Hash(fields),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let inner = self.inner.lock();
        match inner.live(key, now) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.get(field).cloned()),
            Some(_) => Err(wrong_type()),
            None => Ok(None),
        }
    }

    async fn hget_all(
        &self,
        key: &str,
    ) -> Result<std::collections::HashMap<String, String>, StoreError> {
        let now = Instant::now();
        let inner = self.inner.lock();
        match inner.live(key, now) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.clone()),
            Some(_) => Err(wrong_type()),
            None => Ok(std::collections::HashMap::new()),
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let (removed, now_empty) = match inner.live_mut(key, now) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => (fields.remove(field).is_some(), fields.is_empty()),
            Some(_) => return Err(wrong_type()),
            None => return Ok(false),
        };
        // An empty hash does not exist
        if now_empty {
            inner.data.remove(key);
        }
        Ok(removed)
    }

    async fn incr_by(&self, key: &str, n: i64) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.maybe_clean_expired(now);

        match inner.live_mut(key, now) {
            Some(Entry {
                value: Value::Str(current),
                ..
            }) => {
                let count = current
                    .parse::<i64>()
                    .ok()
                    .and_then(|c| c.checked_add(n))
                    .ok_or_else(|| {
                        StoreError::WrongType("value is not an integer or out of range".into())
                    })?;
                *current = count.to_string();
                Ok(count)
            }
            Some(_) => Err(wrong_type()),
            None => {
                inner.data.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Str(n.to_string()),
                        expires_at: None,
                    },
                );
                Ok(n)
            }
        }
    }
}

impl Default for MemoryStoreBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

impl MemoryStoreBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected capacity (number of unique keys)
    ///
    /// The store will allocate 30% more space to reduce hash collisions.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the minimum interval between sweeps of expired entries
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Build the MemoryStore with the configured settings
    pub fn build(self) -> MemoryStore {
        MemoryStore::with_config(self.capacity, self.cleanup_interval)
    }
}
