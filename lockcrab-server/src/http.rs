//! HTTP/JSON API
//!
//! # API Endpoints
//!
//! ## GET /ping
//!
//! Health check endpoint. Returns `{"status": "ok"}`.
//!
//! ## POST /sessions
//!
//! Start a session for an account that an upstream authenticator already
//! verified. The new token id is returned in the token header and the body.
//!
//! ```json
//! { "account_id": "42" }
//! ```
//!
//! ## GET /account/session
//!
//! Return the fields stored in the caller's session.
//!
//! ## POST /account/logout
//!
//! Destroy the caller's session.
//!
//! Every `/account` route requires a valid token and is rate limited per
//! account. Responses carry `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
//! `X-RateLimit-Policy`; a denied request gets 429 with `X-RateLimit-Reset`
//! and `Retry-After` (seconds).

use anyhow::Result;
use axum::{
    Extension, Router,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use lockcrab::{
    RateLimitError, RateLimitResult, RateLimiter, Session, SessionError, Token, TokenManager,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Session field holding the authenticated account
pub const ACCOUNT_ID_FIELD: &str = "account_id";

const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_POLICY: &str = "x-ratelimit-policy";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub account_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub account_id: String,
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    pub error: String,
}

/// Error returned by handlers and middleware, rendered as [`HttpErrorResponse`]
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    fn token_expired() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "token expired")
    }

    /// Logs the cause; clients only see a generic message
    fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!("request failed: {}", cause);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(HttpErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound => Self::token_expired(),
            e => Self::internal(e),
        }
    }
}

impl From<RateLimitError> for ApiError {
    fn from(e: RateLimitError) -> Self {
        Self::internal(e)
    }
}

/// Shared state of every request
pub struct AppState {
    pub tokens: Arc<TokenManager>,
    pub limiter: RateLimiter,
    /// Requests per account per window
    pub rate_limit: i64,
}

impl AppState {
    pub fn new(tokens: Arc<TokenManager>, limiter: RateLimiter, rate_limit: i64) -> Self {
        Self {
            tokens,
            limiter,
            rate_limit,
        }
    }
}

/// The session and account resolved by [`authenticate`]
#[derive(Clone)]
pub struct CurrentAccount {
    pub session: Session,
    pub account_id: String,
}

/// Build the router with all routes and middleware
pub fn router(state: Arc<AppState>) -> Router {
    // Layers run outside in: authenticate, then rate_limit
    let account = Router::new()
        .route("/session", get(current_session))
        .route("/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/ping", get(ping))
        .route("/sessions", post(create_session))
        .nest("/account", account)
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled, then drain open connections
pub async fn serve(
    host: &str,
    port: u16,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn ping() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, HeaderMap, Json<SessionResponse>), ApiError> {
    let account_id = req.account_id.trim();
    if account_id.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "account_id is required",
        ));
    }

    let mut headers = HeaderMap::new();
    let session = state.tokens.init(&mut headers).await?;
    session.set(ACCOUNT_ID_FIELD, account_id).await?;
    tracing::debug!(account_id, "session created");

    let body = session_response(&session, account_id).await?;
    Ok((StatusCode::CREATED, headers, Json(body)))
}

async fn current_session(
    Extension(current): Extension<CurrentAccount>,
) -> Result<Json<SessionResponse>, ApiError> {
    let body = session_response(&current.session, &current.account_id).await?;
    Ok(Json(body))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    state.tokens.destroy(&headers).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn session_response(session: &Session, account_id: &str) -> Result<SessionResponse, ApiError> {
    Ok(SessionResponse {
        token: session.token_id().to_string(),
        account_id: account_id.to_string(),
        fields: session.get_all().await?,
    })
}

/// Resolve the caller's session and account
///
/// No session is 401 "unauthorized"; a session without an account (for
/// example one whose stored fields expired) is 401 "token expired".
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = state
        .tokens
        .get(req.headers())
        .await?
        .ok_or_else(ApiError::unauthorized)?;

    let account_id = match session.get(ACCOUNT_ID_FIELD).await? {
        Some(id) if !id.is_empty() => id,
        _ => return Err(ApiError::token_expired()),
    };

    req.extensions_mut().insert(CurrentAccount {
        session,
        account_id,
    });
    Ok(next.run(req).await)
}

/// Fixed-window limit per authenticated account
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let account_id = req
        .extensions()
        .get::<CurrentAccount>()
        .map(|current| current.account_id.clone())
        .ok_or_else(ApiError::unauthorized)?;

    let result = state.limiter.allow(&account_id, state.rate_limit).await?;
    let headers = rate_limit_headers(&result, state.limiter.window().as_secs());

    if !result.allowed {
        let retry_after = retry_after_secs(&result);
        tracing::debug!(account_id, retry_after, "rate limit exceeded");

        let mut response = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            format!("exceeds rate limit, retry in {retry_after} second(s)"),
        )
        .into_response();
        response.headers_mut().extend(headers);
        let value = HeaderValue::from(retry_after);
        response
            .headers_mut()
            .insert(RATE_LIMIT_RESET, value.clone());
        response
            .headers_mut()
            .insert(axum::http::header::RETRY_AFTER, value);
        return Ok(response);
    }

    let mut response = next.run(req).await;
    response.headers_mut().extend(headers);
    Ok(response)
}

fn rate_limit_headers(result: &RateLimitResult, window_secs: u64) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(3);
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(result.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(result.remaining));
    if let Ok(policy) = HeaderValue::from_str(&format!("{};w={}", result.limit, window_secs)) {
        headers.insert(RATE_LIMIT_POLICY, policy);
    }
    headers
}

/// Whole seconds, rounded up so a client never retries too early
fn retry_after_secs(result: &RateLimitResult) -> u64 {
    let retry_after = result.retry_after;
    retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)
}
