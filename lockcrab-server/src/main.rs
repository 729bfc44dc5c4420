use anyhow::Result;
use lockcrab::{ProviderType, RateLimiter, TokenManager};
use lockcrab_server::config::{Config, StoreType};
use lockcrab_server::http::{self, AppState};
use lockcrab_server::store;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("lockcrab={}", config.log_level).parse()?),
        )
        .init();

    let store = store::create_store(&config.store).await?;
    if config.tokens.provider == ProviderType::Store && config.store.store_type == StoreType::Memory
    {
        tracing::warn!(
            "store token provider over the memory store does not share sessions between instances"
        );
    }

    let tokens = Arc::new(TokenManager::from_config(&config.tokens, store.clone())?);
    let limiter = RateLimiter::new(store);
    let state = Arc::new(AppState::new(tokens.clone(), limiter, config.rate_limit));

    let shutdown = CancellationToken::new();
    let gc = tokens.spawn_gc(shutdown.clone());

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown signal received");
                signal.cancel();
            }
            Err(e) => tracing::error!("failed to listen for shutdown signal: {}", e),
        }
    });

    tracing::info!(
        "Lockcrab server started with store type: {:?}, token provider: {}",
        config.store.store_type,
        config.tokens.provider
    );
    tracing::info!(
        "Token lifetime: {}s, rate limit: {} per minute",
        config.tokens.lifetime.as_secs(),
        config.rate_limit
    );

    let served = http::serve(&config.http.host, config.http.port, state, shutdown.clone()).await;

    // Stop the sweep even when the server failed to start
    shutdown.cancel();
    if let Err(e) = gc.await {
        tracing::error!("Session gc task panicked: {}", e);
    }

    served
}
