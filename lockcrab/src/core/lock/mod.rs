//! Distributed mutual exclusion over a shared [`KeyValueStore`]
//!
//! A lock is a single key created with set-if-absent and a TTL. The value
//! written is a random fencing value; only a holder presenting the same
//! value can release the key, and the release is a single atomic
//! compare-and-delete on the store.
//!
//! The lock is advisory. There is no lease renewal: once the TTL elapses
//! another process may acquire it while the original holder is still
//! running, so the TTL must be sized above the critical section.

use super::id::{generate_id, random_duration};
use super::store::{KeyValueStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests;

const DEFAULT_TTL: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_COUNT: u32 = 50;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const FENCING_PREFIX: &str = "lok";
const FENCING_BYTES: usize = 32;

/// Errors from lock operations
///
/// Failing to acquire under contention is not an error: [`Mutex::lock`]
/// returns `Ok(false)` for that.
#[derive(Error, Debug)]
pub enum LockError {
    /// The store call failed; acquisition was abandoned
    #[error("lock store failure: {0}")]
    Store(#[from] StoreError),

    /// The key was absent or held under another fencing value
    #[error("lock unlock failed")]
    UnlockFailed,

    /// Acquisition aborted by the caller's cancellation token
    #[error("lock acquisition cancelled")]
    Cancelled,

    /// Acquisition aborted because the caller's deadline passed
    #[error("lock acquisition deadline elapsed")]
    DeadlineElapsed,
}

/// Factory for [`Mutex`] instances sharing one store
///
/// # Example
///
/// ```
/// use lockcrab::{Locker, MemoryStore};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let locker = Locker::new(Arc::new(MemoryStore::new()));
/// let mutex = locker
///     .mutex("job")
///     .ttl(Duration::from_secs(30))
///     .retry_count(3)
///     .build();
///
/// if mutex.lock().await? {
///     // critical section
///     mutex.unlock().await?;
/// }
/// # Ok::<(), lockcrab::LockError>(())
/// # });
/// ```
#[derive(Clone)]
pub struct Locker {
    store: Arc<dyn KeyValueStore>,
}

impl Locker {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Start configuring a mutex named `name`
    ///
    /// Defaults: ttl 10s, 50 attempts, up to 1s of random delay between attempts.
    pub fn mutex(&self, name: impl Into<String>) -> MutexBuilder {
        MutexBuilder {
            store: self.store.clone(),
            name: name.into(),
            ttl: DEFAULT_TTL,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
            value: None,
        }
    }
}

/// Builder for a [`Mutex`]
pub struct MutexBuilder {
    store: Arc<dyn KeyValueStore>,
    name: String,
    ttl: Duration,
    retry_count: u32,
    retry_delay: Duration,
    value: Option<String>,
}

impl MutexBuilder {
    /// How long the lock key lives in the store
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Number of acquisition attempts before giving up
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Upper bound of the random pause between attempts
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Use a known fencing value instead of generating one.
    ///
    /// This lets ownership of a held lock be handed to another call site,
    /// which can then release it.
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn build(self) -> Mutex {
        let value = self
            .value
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| generate_id(FENCING_PREFIX, FENCING_BYTES));
        Mutex {
            store: self.store,
            name: self.name,
            value,
            ttl: self.ttl,
            retry_count: self.retry_count,
            retry_delay: self.retry_delay,
        }
    }
}

/// A named, TTL-bound distributed lock
pub struct Mutex {
    store: Arc<dyn KeyValueStore>,
    name: String,
    value: String,
    ttl: Duration,
    retry_count: u32,
    retry_delay: Duration,
}

impl Mutex {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fencing value this mutex writes into the lock key
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to acquire the lock, retrying with random backoff.
    ///
    /// Returns `Ok(true)` once acquired and `Ok(false)` when every attempt
    /// found the lock held. A store failure aborts immediately.
    pub async fn lock(&self) -> Result<bool, LockError> {
        self.acquire_loop(None, None).await
    }

    /// Like [`lock`](Self::lock), aborting with [`LockError::Cancelled`]
    /// as soon as `cancel` fires, including during a backoff sleep.
    pub async fn lock_with_cancel(&self, cancel: &CancellationToken) -> Result<bool, LockError> {
        self.acquire_loop(Some(cancel), None).await
    }

    /// Like [`lock`](Self::lock), aborting with
    /// [`LockError::DeadlineElapsed`] once `deadline` is reached.
    pub async fn lock_until(&self, deadline: Instant) -> Result<bool, LockError> {
        self.acquire_loop(None, Some(deadline)).await
    }

    async fn acquire_loop(
        &self,
        cancel: Option<&CancellationToken>,
        deadline: Option<Instant>,
    ) -> Result<bool, LockError> {
        for attempt in 0..self.retry_count {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                return Err(LockError::Cancelled);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(LockError::DeadlineElapsed);
            }

            if self.acquire().await? {
                tracing::debug!(lock = %self.name, attempt, "lock acquired");
                return Ok(true);
            }
            if attempt + 1 == self.retry_count {
                break;
            }

            let delay = random_duration(self.retry_delay);
            let sleep = tokio::time::sleep(delay);
            let cancelled = async {
                match cancel {
                    Some(c) => c.cancelled().await,
                    None => std::future::pending().await,
                }
            };
            let expired = async {
                match deadline {
                    Some(d) => tokio::time::sleep_until(d).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = sleep => {}
                _ = cancelled => return Err(LockError::Cancelled),
                _ = expired => return Err(LockError::DeadlineElapsed),
            }
        }

        tracing::debug!(lock = %self.name, attempts = self.retry_count, "lock contended");
        Ok(false)
    }

    async fn acquire(&self) -> Result<bool, StoreError> {
        self.store
            .set_if_absent(&self.name, &self.value, self.ttl)
            .await
    }

    /// Release the lock if this mutex's fencing value still owns it.
    ///
    /// Returns [`LockError::UnlockFailed`] if the key already expired or
    /// was re-acquired by someone else; their lock is left untouched.
    pub async fn unlock(&self) -> Result<(), LockError> {
        let deleted = self
            .store
            .compare_and_delete(&self.name, &self.value)
            .await?;
        if deleted == 0 {
            return Err(LockError::UnlockFailed);
        }
        Ok(())
    }
}
