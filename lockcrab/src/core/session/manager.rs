use super::{Provider, ProviderType, Session, SessionError, SessionProvider};
use crate::core::id::generate_id;
use crate::core::store::KeyValueStore;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TOKEN_HEADER: &str = "X-Access-Token";
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(86400);
const TOKEN_ID_PREFIX: &str = "tok";
const TOKEN_ID_BYTES: usize = 32;

/// Settings for [`TokenManager::from_config`]
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub provider: ProviderType,
    pub header_name: String,
    pub lifetime: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::Memory,
            header_name: DEFAULT_TOKEN_HEADER.to_string(),
            lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }
}

/// Resolves sessions from request headers
///
/// The provider is fixed at construction. Provider calls are serialized by a
/// manager-wide lock; the manager itself holds no session state.
pub struct TokenManager {
    provider: SessionProvider,
    header_name: HeaderName,
    lifetime: Duration,
    guard: Mutex<()>,
}

impl TokenManager {
    pub fn new(provider: SessionProvider, header_name: HeaderName, lifetime: Duration) -> Self {
        Self {
            provider,
            header_name,
            lifetime,
            guard: Mutex::new(()),
        }
    }

    pub fn from_config(
        config: &TokenConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, SessionError> {
        if config.lifetime.is_zero() {
            return Err(SessionError::InvalidConfig(
                "token lifetime must be positive".to_string(),
            ));
        }
        let header_name = HeaderName::from_bytes(config.header_name.as_bytes()).map_err(|e| {
            SessionError::InvalidConfig(format!("invalid header name {:?}: {e}", config.header_name))
        })?;
        let provider = SessionProvider::new(config.provider, store, config.lifetime);
        Ok(Self::new(provider, header_name, config.lifetime))
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn provider(&self) -> &SessionProvider {
        &self.provider
    }

    /// Resolve the session named by the request header.
    ///
    /// A missing header, one that does not decode, or an unknown id all
    /// yield `Ok(None)`.
    pub async fn get(&self, headers: &HeaderMap) -> Result<Option<Session>, SessionError> {
        let Some(id) = self.token_id(headers) else {
            return Ok(None);
        };
        let _guard = self.guard.lock().await;
        self.provider.read(&id).await
    }

    /// Start a new session and write its id into `headers`
    pub async fn init(&self, headers: &mut HeaderMap) -> Result<Session, SessionError> {
        let id = generate_id(TOKEN_ID_PREFIX, TOKEN_ID_BYTES);
        let value = HeaderValue::from_str(&id)
            .map_err(|e| SessionError::InvalidConfig(format!("invalid token id: {e}")))?;

        let session = {
            let _guard = self.guard.lock().await;
            self.provider.init(&id).await?
        };
        headers.insert(self.header_name.clone(), value);
        tracing::debug!(provider = %self.provider.kind(), "session started");
        Ok(session)
    }

    /// Remove the session named by the request header, if any
    pub async fn destroy(&self, headers: &HeaderMap) -> Result<(), SessionError> {
        let Some(id) = self.token_id(headers) else {
            return Ok(());
        };
        let _guard = self.guard.lock().await;
        self.provider.destroy(&id).await
    }

    /// Run one sweep of sessions idle for longer than the lifetime
    pub async fn gc(&self) -> Result<usize, SessionError> {
        let _guard = self.guard.lock().await;
        self.provider.gc(self.lifetime).await
    }

    /// Sweep now and then once per lifetime until `shutdown` is cancelled
    pub fn spawn_gc(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            // The first tick completes immediately
            let mut interval = tokio::time::interval(self.lifetime);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("session gc stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        match self.gc().await {
                            Ok(removed) => tracing::trace!(removed, "session gc pass"),
                            Err(e) => tracing::error!(error = %e, "session gc failed"),
                        }
                    }
                }
            }
        })
    }

    fn token_id(&self, headers: &HeaderMap) -> Option<String> {
        let raw = headers.get(&self.header_name)?.to_str().ok()?;
        let id = urlencoding::decode(raw).ok()?;
        if id.is_empty() {
            return None;
        }
        Some(id.into_owned())
    }
}
