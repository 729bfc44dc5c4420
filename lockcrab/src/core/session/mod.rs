//! Session tokens and their storage providers
//!
//! A session is a small string map identified by a random id carried in a
//! request header. Two providers implement storage:
//!
//! - [`VolatileProvider`]: process-local, recency ordered, swept by [`Provider::gc`]
//! - [`DurableProvider`]: a hash in the shared store whose expiry the store enforces
//!
//! [`SessionProvider`] and [`Session`] wrap the two so the choice can be made
//! once from configuration, and [`TokenManager`] resolves sessions from
//! request headers.

use super::store::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod durable;
mod manager;
mod volatile;

pub use durable::{DurableProvider, DurableToken, TOKEN_KEY_PREFIX};
pub use manager::{DEFAULT_TOKEN_HEADER, DEFAULT_TOKEN_LIFETIME, TokenConfig, TokenManager};
pub use volatile::{VolatileProvider, VolatileToken};

use super::store::KeyValueStore;


#[derive(Error, Debug)]
pub enum SessionError {
    /// The session was destroyed or swept while a handle to it was still held
    #[error("session not found")]
    NotFound,

    #[error("session store failure: {0}")]
    Store(#[from] StoreError),

    #[error("invalid token configuration: {0}")]
    InvalidConfig(String),
}

/// Operations on one session's fields
#[async_trait]
pub trait Token: Send + Sync {
    /// Set a field
    async fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;

    /// Get a field; `Ok(None)` when the field is not set
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError>;

    /// Remove a field
    async fn delete(&self, key: &str) -> Result<(), SessionError>;

    /// All fields of the session
    async fn get_all(&self) -> Result<HashMap<String, String>, SessionError>;

    /// The session id
    fn token_id(&self) -> &str;
}

/// Session storage backend
#[async_trait]
pub trait Provider: Send + Sync {
    type Token: Token;

    /// Create and register a new empty session
    async fn init(&self, id: &str) -> Result<Self::Token, SessionError>;

    /// Resolve a live session; `Ok(None)` when it does not exist (anymore)
    async fn read(&self, id: &str) -> Result<Option<Self::Token>, SessionError>;

    /// Remove a session. Removing an unknown id is not an error.
    async fn destroy(&self, id: &str) -> Result<(), SessionError>;

    /// Remove sessions idle for longer than `max_lifetime`, returning how many
    async fn gc(&self, max_lifetime: Duration) -> Result<usize, SessionError>;
}

/// Which provider backs sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    /// Process-local sessions
    Memory,
    /// Sessions kept in the shared key-value store
    Store,
}

impl std::str::FromStr for ProviderType {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(ProviderType::Memory),
            "store" => Ok(ProviderType::Store),
            _ => Err(SessionError::InvalidConfig(format!(
                "unknown token provider {s:?}, valid options are: memory, store"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Memory => f.write_str("memory"),
            ProviderType::Store => f.write_str("store"),
        }
    }
}

/// The provider selected at startup
#[derive(Clone)]
pub enum SessionProvider {
    Volatile(VolatileProvider),
    Durable(DurableProvider),
}

impl SessionProvider {
    /// Build the provider for `kind`. The store is only used by the durable variant.
    pub fn new(kind: ProviderType, store: Arc<dyn KeyValueStore>, lifetime: Duration) -> Self {
        match kind {
            ProviderType::Memory => SessionProvider::Volatile(VolatileProvider::new(lifetime)),
            ProviderType::Store => {
                SessionProvider::Durable(DurableProvider::new(store, lifetime))
            }
        }
    }

    pub fn kind(&self) -> ProviderType {
        match self {
            SessionProvider::Volatile(_) => ProviderType::Memory,
            SessionProvider::Durable(_) => ProviderType::Store,
        }
    }
}

#[async_trait]
impl Provider for SessionProvider {
    type Token = Session;

    async fn init(&self, id: &str) -> Result<Session, SessionError> {
        match self {
            SessionProvider::Volatile(p) => p.init(id).await.map(Session::Volatile),
            SessionProvider::Durable(p) => p.init(id).await.map(Session::Durable),
        }
    }

    async fn read(&self, id: &str) -> Result<Option<Session>, SessionError> {
        match self {
            SessionProvider::Volatile(p) => Ok(p.read(id).await?.map(Session::Volatile)),
            SessionProvider::Durable(p) => Ok(p.read(id).await?.map(Session::Durable)),
        }
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        match self {
            SessionProvider::Volatile(p) => p.destroy(id).await,
            SessionProvider::Durable(p) => p.destroy(id).await,
        }
    }

    async fn gc(&self, max_lifetime: Duration) -> Result<usize, SessionError> {
        match self {
            SessionProvider::Volatile(p) => p.gc(max_lifetime).await,
            SessionProvider::Durable(p) => p.gc(max_lifetime).await,
        }
    }
}

/// A session handle from either provider
#[derive(Clone)]
pub enum Session {
    Volatile(VolatileToken),
    Durable(DurableToken),
}

#[async_trait]
impl Token for Session {
    async fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        match self {
            Session::Volatile(t) => t.set(key, value).await,
            Session::Durable(t) => t.set(key, value).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        match self {
            Session::Volatile(t) => t.get(key).await,
            Session::Durable(t) => t.get(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        match self {
            Session::Volatile(t) => t.delete(key).await,
            Session::Durable(t) => t.delete(key).await,
        }
    }

    async fn get_all(&self) -> Result<HashMap<String, String>, SessionError> {
        match self {
            Session::Volatile(t) => t.get_all().await,
            Session::Durable(t) => t.get_all().await,
        }
    }

    fn token_id(&self) -> &str {
        match self {
            Session::Volatile(t) => t.token_id(),
            Session::Durable(t) => t.token_id(),
        }
    }
}
