//! # Lockcrab Server
//!
//! An HTTP service that issues access tokens and rate limits authenticated
//! accounts, built on the [`lockcrab`] primitives.
//!
//! ## Quick Start
//!
//! ```bash
//! # Show all available options
//! lockcrab --help
//!
//! # Single instance with in-process sessions
//! lockcrab --http-port 8080
//!
//! # Several instances sharing sessions and limits through redis
//! lockcrab --store redis --redis-address 127.0.0.1:6379 --token-provider store
//!
//! # List all available environment variables
//! lockcrab --list-env-vars
//! ```
//!
//! ## Using the API
//!
//! ```bash
//! # Start a session for an account verified upstream
//! curl -i -X POST http://localhost:8080/sessions \
//!   -H "Content-Type: application/json" \
//!   -d '{"account_id": "42"}'
//!
//! # Call an account route with the returned token
//! curl -i http://localhost:8080/account/session -H "X-Access-Token: tok_..."
//! ```
//!
//! ## How It Works
//!
//! - Tokens live in the configured provider: `memory` keeps them in the
//!   process and expires idle ones with a background sweep, `store` keeps
//!   them in the key-value store with a TTL
//! - Every `/account` request is counted against a fixed one minute window
//!   per account; the window opens with the account's first request
//! - Ctrl-C stops the sweep and drains in-flight requests before exiting

pub mod config;
pub mod http;
pub mod store;
