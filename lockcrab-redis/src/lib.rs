//! Redis backend for lockcrab
//!
//! This crate implements [`lockcrab::KeyValueStore`] on the `redis` client
//! over one multiplexed, self-healing connection, so locks, durable sessions
//! and rate limit counters are shared by every instance pointing at the same
//! server.
//!
//! ```no_run
//! use lockcrab::Locker;
//! use lockcrab_redis::RedisStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisStore::builder()
//!     .password("secret")
//!     .database(1)
//!     .build("127.0.0.1:6379")
//!     .await?;
//!
//! let locker = Locker::new(Arc::new(store));
//! let mutex = locker.mutex("db_migrate").build();
//! if mutex.lock().await? {
//!     mutex.unlock().await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! `expire_if_unset` relies on `PEXPIRE .. NX`, available from redis 7.

pub mod client;
pub mod error;

pub use client::{RedisStore, RedisStoreBuilder};
pub use error::Result;
