//! # LockCrab
//!
//! Coordination primitives for services that run as several identical
//! instances sharing nothing but a key-value store (typically redis).
//!
//! ## Overview
//!
//! - **Distributed lock**: a named, TTL-bound [`Mutex`] protected by a random
//!   fencing value, so only the holder can release it
//! - **Sessions**: a [`TokenManager`] resolving sessions from a request header,
//!   backed by either a process-local [`VolatileProvider`] or a store-backed
//!   [`DurableProvider`]
//! - **Rate limiting**: a fixed-window [`RateLimiter`] counting requests per key
//!
//! Everything is built on the [`KeyValueStore`] trait. [`MemoryStore`] implements
//! it in process; the `lockcrab-redis` crate implements it over the network.
//!
//! ## Quick Start
//!
//! ```
//! use lockcrab::{Locker, MemoryStore, RateLimiter};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::new());
//!
//! // Only one instance runs the nightly job
//! let locker = Locker::new(store.clone());
//! let mutex = locker.mutex("nightly").ttl(Duration::from_secs(60)).build();
//! if mutex.lock().await? {
//!     // ...
//!     mutex.unlock().await?;
//! }
//!
//! // 100 requests per minute per account
//! let limiter = RateLimiter::new(store);
//! let result = limiter.allow("account:42", 100).await?;
//! assert!(result.allowed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
//!
//! ## Sessions
//!
//! ```
//! use lockcrab::{MemoryStore, ProviderType, Token, TokenConfig, TokenManager};
//! use http::HeaderMap;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = TokenConfig {
//!     provider: ProviderType::Store,
//!     ..Default::default()
//! };
//! let manager = TokenManager::from_config(&config, Arc::new(MemoryStore::new()))?;
//!
//! // Issue a session; its id is written into the X-Access-Token header
//! let mut headers = HeaderMap::new();
//! let session = manager.init(&mut headers).await?;
//! session.set("account_id", "42").await?;
//!
//! // Later requests carry the header back
//! let session = manager.get(&headers).await?.expect("session exists");
//! assert_eq!(session.get("account_id").await?.as_deref(), Some("42"));
//! # Ok::<(), lockcrab::SessionError>(())
//! # }).unwrap();
//! ```
//!
//! ## Features
//!
//! - `ahash` (default): Use AHash for faster hashing in [`MemoryStore`]

pub mod core;

pub use core::{
    DEFAULT_TOKEN_HEADER, DEFAULT_TOKEN_LIFETIME, DurableProvider, DurableToken, KeyValueStore,
    LockError, Locker, MemoryStore, MemoryStoreBuilder, MigrateError, Migrator, Mutex,
    MutexBuilder, Provider, ProviderType, RateLimitError, RateLimitResult, RateLimiter,
    RateLimiterBuilder, Session, SessionError, SessionProvider, StoreError, Token, TokenConfig,
    TokenManager, VolatileProvider, VolatileToken, generate_id, run_migrations,
};

// Re-export the store module so other backends can implement the contract
pub use crate::core::store;
