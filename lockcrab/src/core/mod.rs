//! Core components of the lockcrab coordination library
//!
//! This module contains the fundamental building blocks:
//! - [`store`]: The shared key-value store contract and the in-process [`MemoryStore`]
//! - [`lock`]: Distributed mutual exclusion with fencing values
//! - [`migrate`]: Running schema migrations under a distributed lock
//! - [`session`]: Session tokens, their providers and the [`TokenManager`]
//! - [`rate_limiter`]: The fixed-window rate limiter
//! - [`id`]: Random identifiers

pub mod id;
pub mod lock;
pub mod migrate;
pub mod rate_limiter;
pub mod session;
pub mod store;
#[cfg(test)]
mod testutil;

pub use id::generate_id;
pub use lock::{LockError, Locker, Mutex, MutexBuilder};
pub use migrate::{MigrateError, Migrator, run_migrations};
pub use rate_limiter::{RateLimitError, RateLimitResult, RateLimiter, RateLimiterBuilder};
pub use session::{
    DEFAULT_TOKEN_HEADER, DEFAULT_TOKEN_LIFETIME, DurableProvider, DurableToken, Provider,
    ProviderType, Session, SessionError, SessionProvider, Token, TokenConfig, TokenManager,
    VolatileProvider, VolatileToken,
};
pub use store::{KeyValueStore, MemoryStore, MemoryStoreBuilder, StoreError};
