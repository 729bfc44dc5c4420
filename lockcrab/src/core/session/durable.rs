use super::{Provider, SessionError, Token};
use crate::core::store::KeyValueStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Prefix of every session hash in the store
pub const TOKEN_KEY_PREFIX: &str = "token_v1::";

const ACTIVE_FIELD: &str = "active";
const ACTIVE_VALUE: &str = "1";

fn session_key(id: &str) -> String {
    format!("{TOKEN_KEY_PREFIX}{id}")
}

/// Store-backed session provider
///
/// A session is a hash carrying an `active` marker plus the session fields.
/// Its lifetime is the hash's TTL in the store, so sessions are visible to
/// every instance sharing the store and [`gc`](Provider::gc) has nothing to do.
#[derive(Clone)]
pub struct DurableProvider {
    store: Arc<dyn KeyValueStore>,
    lifetime: Duration,
}

impl DurableProvider {
    pub fn new(store: Arc<dyn KeyValueStore>, lifetime: Duration) -> Self {
        Self { store, lifetime }
    }

    fn token(&self, id: &str) -> DurableToken {
        DurableToken {
            id: id.to_string(),
            key: session_key(id),
            store: self.store.clone(),
            lifetime: self.lifetime,
        }
    }
}

#[async_trait]
impl Provider for DurableProvider {
    type Token = DurableToken;

    async fn init(&self, id: &str) -> Result<DurableToken, SessionError> {
        let key = session_key(id);
        self.store.hset(&key, ACTIVE_FIELD, ACTIVE_VALUE).await?;
        if let Err(e) = self.store.expire(&key, self.lifetime).await {
            // A session hash without a TTL would never go away
            if let Err(cleanup) = self.store.delete(&key).await {
                tracing::warn!(key, error = %cleanup, "failed to remove session without expiry");
            }
            return Err(e.into());
        }
        Ok(self.token(id))
    }

    async fn read(&self, id: &str) -> Result<Option<DurableToken>, SessionError> {
        match self.store.hget(&session_key(id), ACTIVE_FIELD).await? {
            Some(_) => Ok(Some(self.token(id))),
            None => Ok(None),
        }
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.store.delete(&session_key(id)).await?;
        Ok(())
    }

    async fn gc(&self, _max_lifetime: Duration) -> Result<usize, SessionError> {
        Ok(0)
    }
}

/// Handle to one session hash
#[derive(Clone)]
pub struct DurableToken {
    id: String,
    key: String,
    store: Arc<dyn KeyValueStore>,
    lifetime: Duration,
}

#[async_trait]
impl Token for DurableToken {
    async fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.store.hset(&self.key, key, value).await?;
        // If the hash expired under us, hset recreated it without a TTL
        self.store.expire_if_unset(&self.key, self.lifetime).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.store.hget(&self.key, key).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.store.hdel(&self.key, key).await?;
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, String>, SessionError> {
        let mut fields = self.store.hget_all(&self.key).await?;
        fields.remove(ACTIVE_FIELD);
        Ok(fields)
    }

    fn token_id(&self) -> &str {
        &self.id
    }
}
