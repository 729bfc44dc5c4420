//! Store factory
//!
//! Builds the shared [`KeyValueStore`] every component of the server runs on.
//!
//! ## Memory Store
//! - Lives inside the process, nothing is shared between instances
//! - Best for: development and single instance deployments
//!
//! ## Redis Store
//! - Locks, durable sessions and rate limit counters are visible to every
//!   instance pointing at the same server
//! - Best for: horizontally scaled deployments

use crate::config::{StoreConfig, StoreType};
use anyhow::{Context, Result};
use lockcrab::{KeyValueStore, MemoryStore};
use lockcrab_redis::RedisStore;
use std::sync::Arc;
use std::time::Duration;

/// Create the configured store
///
/// The redis store is contacted once, so an unreachable server fails startup
/// instead of the first request.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>> {
    match config.store_type {
        StoreType::Memory => {
            let store = MemoryStore::builder()
                .capacity(config.capacity)
                .cleanup_interval(Duration::from_secs(config.cleanup_interval))
                .build();
            Ok(Arc::new(store))
        }
        StoreType::Redis => {
            let redis = &config.redis;
            let mut builder = RedisStore::builder()
                .database(redis.database)
                .connection_retries(redis.connection_retries)
                .request_timeout(Duration::from_millis(redis.request_timeout));
            if let Some(password) = &redis.password {
                builder = builder.password(password.as_str());
            }
            let store = builder
                .build(redis.address.as_str())
                .await
                .with_context(|| format!("failed to connect to redis at {}", redis.address))?;
            Ok(Arc::new(store))
        }
    }
}
