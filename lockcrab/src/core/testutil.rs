use super::store::{KeyValueStore, MemoryStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Store whose every call fails as if the connection were down
#[derive(Default)]
pub struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn compare_and_delete(&self, _: &str, _: &str) -> Result<i64, StoreError> {
        self.fail()
    }

    async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        self.fail()
    }

    async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> Result<(), StoreError> {
        self.fail()
    }

    async fn delete(&self, _: &str) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn expire(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn expire_if_unset(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn ttl(&self, _: &str) -> Result<Option<Duration>, StoreError> {
        self.fail()
    }

    async fn hset(&self, _: &str, _: &str, _: &str) -> Result<(), StoreError> {
        self.fail()
    }

    async fn hget(&self, _: &str, _: &str) -> Result<Option<String>, StoreError> {
        self.fail()
    }

    async fn hget_all(&self, _: &str) -> Result<HashMap<String, String>, StoreError> {
        self.fail()
    }

    async fn hdel(&self, _: &str, _: &str) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn incr_by(&self, _: &str, _: i64) -> Result<i64, StoreError> {
        self.fail()
    }
}

/// Memory store that refuses to set expiries
#[derive(Default)]
pub struct ExpireOutage {
    pub inner: MemoryStore,
}

#[async_trait]
impl KeyValueStore for ExpireOutage {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<i64, StoreError> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn expire(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
        Err(StoreError::Timeout)
    }

    async fn expire_if_unset(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
        Err(StoreError::Timeout)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.inner.ttl(key).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.inner.hset(key, field, value).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.inner.hget(key, field).await
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.inner.hget_all(key).await
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.inner.hdel(key, field).await
    }

    async fn incr_by(&self, key: &str, n: i64) -> Result<i64, StoreError> {
        self.inner.incr_by(key, n).await
    }
}
