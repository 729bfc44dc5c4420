//! Fixed-window rate limiter
//!
//! This module provides the [`RateLimiter`] struct which counts requests per
//! key in windows of fixed length. A window opens with the first request for
//! a key and closes when the counter's TTL in the store runs out, so it is
//! anchored to first use rather than to wall-clock minutes.

use super::store::{KeyValueStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_PREFIX: &str = "ratelimit::";

/// Errors that can occur during rate limiting operations
#[derive(Error, Debug)]
pub enum RateLimitError {
    /// The quantity parameter was negative
    #[error("negative quantity: {0}")]
    NegativeQuantity(i64),

    /// The limit was zero or negative
    #[error("invalid rate limit parameters")]
    InvalidRateLimit,

    /// The counter could not be updated; the caller decides whether to fail open or closed
    #[error("rate limit store failure: {0}")]
    Store(#[from] StoreError),
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitResult {
    /// Whether the request fits in the current window
    pub allowed: bool,
    /// The number of requests allowed per window
    pub limit: i64,
    /// The number of requests remaining in the current window
    pub remaining: i64,
    /// Time to wait before the next request will be allowed (0 if request was allowed)
    pub retry_after: Duration,
    /// Time until the current window closes
    pub reset_after: Duration,
}

/// Fixed-window rate limiter over a shared [`KeyValueStore`]
///
/// # Example
///
/// ```
/// use lockcrab::{MemoryStore, RateLimiter};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
///
/// // 100 requests per minute for this account
/// let result = limiter.allow("account:123", 100).await?;
/// if result.allowed {
///     println!("Request allowed! {} remaining", result.remaining);
/// } else {
///     println!("Rate limited! Retry after {} seconds", result.retry_after.as_secs());
/// }
/// # Ok::<(), lockcrab::RateLimitError>(())
/// # });
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    window: Duration,
    prefix: String,
}

impl RateLimiter {
    /// Create a rate limiter with a 60 second window and the `ratelimit::` key prefix
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::builder(store).build()
    }

    pub fn builder(store: Arc<dyn KeyValueStore>) -> RateLimiterBuilder {
        RateLimiterBuilder {
            store,
            window: DEFAULT_WINDOW,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request for `key`
    pub async fn allow(&self, key: &str, limit: i64) -> Result<RateLimitResult, RateLimitError> {
        self.allow_n(key, limit, 1).await
    }

    /// Count `n` requests for `key` against `limit` per window
    ///
    /// # Errors
    ///
    /// - [`RateLimitError::NegativeQuantity`]: If `n` is negative
    /// - [`RateLimitError::InvalidRateLimit`]: If `limit` is not positive
    /// - [`RateLimitError::Store`]: If the counter could not be updated
    pub async fn allow_n(
        &self,
        key: &str,
        limit: i64,
        n: i64,
    ) -> Result<RateLimitResult, RateLimitError> {
        if n < 0 {
            return Err(RateLimitError::NegativeQuantity(n));
        }
        if limit <= 0 {
            return Err(RateLimitError::InvalidRateLimit);
        }

        let key = format!("{}{}", self.prefix, key);
        let count = self.store.incr_by(&key, n).await?;

        // The first increment opens the window, unless a zero-quantity call
        // already created the counter and its expiry
        let opened =
            n > 0 && count == n && self.store.expire_if_unset(&key, self.window).await?;
        let reset_after = if opened {
            self.window
        } else {
            match self.store.ttl(&key).await? {
                Some(ttl) => ttl,
                None => {
                    // A zero-quantity call on an unseen key lands here too
                    if count > 0 {
                        // The process that opened the window died before setting its expiry
                        tracing::warn!(key = %key, "rate limit counter without expiry");
                    }
                    self.store.expire_if_unset(&key, self.window).await?;
                    self.window
                }
            }
        };

        let allowed = count <= limit;
        let result = RateLimitResult {
            allowed,
            limit,
            remaining: (limit - count).max(0),
            retry_after: if allowed { Duration::ZERO } else { reset_after },
            reset_after,
        };

        if !allowed {
            tracing::debug!(key = %key, count, limit, "rate limit exceeded");
        }
        Ok(result)
    }
}

/// Builder for [`RateLimiter`]
pub struct RateLimiterBuilder {
    store: Arc<dyn KeyValueStore>,
    window: Duration,
    prefix: String,
}

impl RateLimiterBuilder {
    /// Length of each counting window
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Prefix prepended to every counter key
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn build(self) -> RateLimiter {
        RateLimiter {
            store: self.store,
            window: self.window,
            prefix: self.prefix,
        }
    }
}
