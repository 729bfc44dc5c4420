use async_trait::async_trait;
use lockcrab::store::{KeyValueStore, StoreError};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo, Script};
use std::collections::HashMap;
use std::net::ToSocketAddrs;
use std::time::Duration;

use crate::error::{Result, store_error};

/// Deletes KEYS[1] only while it still holds ARGV[1]
pub const COMPARE_AND_DELETE_SCRIPT: &str = r#"if redis.call("get",KEYS[1]) == ARGV[1] then return redis.call("del",KEYS[1]) else return 0 end"#;

/// Builder for creating a [`RedisStore`]
pub struct RedisStoreBuilder {
    password: Option<String>,
    database: i64,
    connect_timeout: Duration,
    request_timeout: Duration,
    connection_retries: usize,
}

impl Default for RedisStoreBuilder {
    fn default() -> Self {
        Self {
            password: None,
            database: 0,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            connection_retries: 6,
        }
    }
}

impl RedisStoreBuilder {
    /// Create a new store builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Password sent with `AUTH` whenever a connection is established
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into()).filter(|p| !p.is_empty());
        self
    }

    /// Logical database selected whenever a connection is established
    pub fn database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Attempts to (re)connect before a request fails with
    /// [`StoreError::Unavailable`]
    pub fn connection_retries(mut self, retries: usize) -> Self {
        self.connection_retries = retries;
        self
    }

    /// Build the store for the given address and check it answers `PING`
    pub async fn build(self, addr: impl ToSocketAddrs) -> Result<RedisStore> {
        let addr = addr
            .to_socket_addrs()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .next()
            .ok_or_else(|| StoreError::Unavailable("invalid address".to_string()))?;

        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(addr.ip().to_string(), addr.port()),
            redis: RedisConnectionInfo {
                db: self.database,
                password: self.password,
                ..Default::default()
            },
        };
        let client = redis::Client::open(info).map_err(store_error)?;

        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(self.connect_timeout)
            .set_response_timeout(self.request_timeout)
            .set_number_of_retries(self.connection_retries);
        let conn = ConnectionManager::new_with_config(client, config)
            .await
            .map_err(store_error)?;

        let store = RedisStore {
            conn,
            compare_and_delete: Script::new(COMPARE_AND_DELETE_SCRIPT),
        };
        store.ping().await?;
        tracing::info!(%addr, "connected to redis");
        Ok(store)
    }
}

/// [`KeyValueStore`] backed by a redis server
///
/// Clones share one multiplexed connection, re-established in the
/// background when it breaks.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    compare_and_delete: Script,
}

impl RedisStore {
    /// Connect with default configuration
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        RedisStoreBuilder::new().build(addr).await
    }

    /// Create a new store builder for advanced configuration
    pub fn builder() -> RedisStoreBuilder {
        RedisStoreBuilder::new()
    }

    pub async fn ping(&self) -> Result<()> {
        let reply: String = self.query(&mut redis::cmd("PING")).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Protocol(format!("unexpected reply to PING: {reply}")))
        }
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: &mut redis::Cmd) -> Result<T> {
        let mut conn = self.conn.clone();
        cmd.query_async(&mut conn).await.map_err(store_error)
    }
}

/// Milliseconds for PX/PEXPIRE; redis rejects 0
fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let reply: Option<String> = self
            .query(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(millis(ttl))
                    .arg("NX"),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        self.compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        self.query(&mut cmd).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let deleted: i64 = self.query(redis::cmd("DEL").arg(key)).await?;
        Ok(deleted > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let set: i64 = self
            .query(redis::cmd("PEXPIRE").arg(key).arg(millis(ttl)))
            .await?;
        Ok(set == 1)
    }

    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<bool> {
        // NX needs redis 7
        let set: i64 = self
            .query(redis::cmd("PEXPIRE").arg(key).arg(millis(ttl)).arg("NX"))
            .await?;
        Ok(set == 1)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        // -2: no such key, -1: no expiry
        let ms: i64 = self.query(redis::cmd("PTTL").arg(key)).await?;
        Ok(u64::try_from(ms).ok().map(Duration::from_millis))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let _: i64 = self
            .query(redis::cmd("HSET").arg(key).arg(field).arg(value))
            .await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.query(redis::cmd("HGET").arg(key).arg(field)).await
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>> {
        self.query(redis::cmd("HGETALL").arg(key)).await
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        let deleted: i64 = self.query(redis::cmd("HDEL").arg(key).arg(field)).await?;
        Ok(deleted > 0)
    }

    async fn incr_by(&self, key: &str, n: i64) -> Result<i64> {
        self.query(redis::cmd("INCRBY").arg(key).arg(n)).await
    }
}
