//! Server configuration and CLI argument parsing
//!
//! Every option can be given on the command line or through an environment
//! variable with the LOCKCRAB_ prefix.
//!
//! # Configuration Priority
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # Single instance, everything in process
//! lockcrab --http-port 8080
//!
//! # Several instances sharing sessions and rate limits through redis
//! export LOCKCRAB_STORE=redis
//! export LOCKCRAB_REDIS_ADDRESS=10.0.0.5:6379
//! export LOCKCRAB_TOKEN_PROVIDER=store
//! lockcrab
//! ```

use anyhow::{Result, anyhow};
use clap::Parser;
use lockcrab::{ProviderType, TokenConfig};
use std::time::Duration;

/// Main configuration structure for the server
#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub store: StoreConfig,
    pub tokens: TokenConfig,
    /// Requests per account per minute
    pub rate_limit: i64,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,
    pub port: u16,
}

/// Shared key-value store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub store_type: StoreType,
    /// Initial capacity of the in-process store
    pub capacity: usize,
    /// Expired key sweep interval of the in-process store (seconds)
    pub cleanup_interval: u64,
    pub redis: RedisConfig,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// `host:port` of the redis server
    pub address: String,
    pub password: Option<String>,
    pub database: i64,
    /// Reconnect attempts before a request fails
    pub connection_retries: usize,
    /// Per-request timeout (milliseconds)
    pub request_timeout: u64,
}

/// Available key-value stores
///
/// - **Memory**: in-process, only for a single server instance
/// - **Redis**: shared by every instance pointing at the same server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Memory,
    Redis,
}

impl std::str::FromStr for StoreType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreType::Memory),
            "redis" => Ok(StoreType::Redis),
            _ => Err(anyhow!(
                "Invalid store type: {}. Valid options are: memory, redis",
                s
            )),
        }
    }
}

/// Command-line arguments for the server
///
/// All arguments can also be set via environment variables with the
/// LOCKCRAB_ prefix. CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(
    name = "lockcrab",
    about = "Session and rate limiting server",
    long_about = "An HTTP server issuing access tokens and rate limiting authenticated accounts.\n\nEnvironment variables with LOCKCRAB_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    // HTTP
    #[arg(
        long,
        value_name = "HOST",
        help = "HTTP host",
        default_value = "127.0.0.1",
        env = "LOCKCRAB_HTTP_HOST"
    )]
    pub http_host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "HTTP port",
        default_value_t = 8080,
        env = "LOCKCRAB_HTTP_PORT"
    )]
    pub http_port: u16,

    // Store Configuration
    #[arg(
        long,
        value_name = "TYPE",
        help = "Store type: memory, redis",
        default_value = "memory",
        env = "LOCKCRAB_STORE"
    )]
    pub store: StoreType,
    #[arg(
        long,
        value_name = "SIZE",
        help = "Initial capacity of the memory store",
        default_value_t = 100_000,
        env = "LOCKCRAB_STORE_CAPACITY"
    )]
    pub store_capacity: usize,
    #[arg(
        long,
        value_name = "SECS",
        help = "Expired key sweep interval of the memory store (seconds)",
        default_value_t = 60,
        env = "LOCKCRAB_STORE_CLEANUP_INTERVAL"
    )]
    pub store_cleanup_interval: u64,

    // Redis
    #[arg(
        long,
        value_name = "ADDR",
        help = "Redis address",
        default_value = "127.0.0.1:6379",
        env = "LOCKCRAB_REDIS_ADDRESS"
    )]
    pub redis_address: String,
    #[arg(
        long,
        value_name = "PASSWORD",
        help = "Redis password",
        env = "LOCKCRAB_REDIS_PASSWORD",
        hide_env_values = true
    )]
    pub redis_password: Option<String>,
    #[arg(
        long,
        value_name = "DB",
        help = "Redis database",
        default_value_t = 0,
        env = "LOCKCRAB_REDIS_DB"
    )]
    pub redis_db: i64,
    #[arg(
        long,
        value_name = "N",
        help = "Redis reconnect attempts",
        default_value_t = 6,
        env = "LOCKCRAB_REDIS_RETRIES"
    )]
    pub redis_retries: usize,
    #[arg(
        long,
        value_name = "MS",
        help = "Redis request timeout (milliseconds)",
        default_value_t = 5_000,
        env = "LOCKCRAB_REDIS_TIMEOUT"
    )]
    pub redis_timeout: u64,

    // Tokens
    #[arg(
        long,
        value_name = "PROVIDER",
        help = "Token provider: memory, store",
        default_value = "memory",
        env = "LOCKCRAB_TOKEN_PROVIDER"
    )]
    pub token_provider: ProviderType,
    #[arg(
        long,
        value_name = "NAME",
        help = "Header carrying the access token",
        default_value = lockcrab::DEFAULT_TOKEN_HEADER,
        env = "LOCKCRAB_TOKEN_HEADER"
    )]
    pub token_header: String,
    #[arg(
        long,
        value_name = "SECS",
        help = "Token lifetime (seconds)",
        default_value_t = 86_400,
        env = "LOCKCRAB_TOKEN_LIFETIME"
    )]
    pub token_lifetime: u64,

    // General options
    #[arg(
        long,
        value_name = "N",
        help = "Requests per account per minute",
        default_value_t = 100,
        env = "LOCKCRAB_RATE_LIMIT"
    )]
    pub rate_limit: i64,
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "LOCKCRAB_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if invalid configuration values are provided.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        let config = Self::from_args(args);
        config.validate()?;
        Ok(config)
    }

    fn from_args(args: Args) -> Self {
        Config {
            http: HttpConfig {
                host: args.http_host,
                port: args.http_port,
            },
            store: StoreConfig {
                store_type: args.store,
                capacity: args.store_capacity,
                cleanup_interval: args.store_cleanup_interval,
                redis: RedisConfig {
                    address: args.redis_address,
                    password: args.redis_password.filter(|p| !p.is_empty()),
                    database: args.redis_db,
                    connection_retries: args.redis_retries,
                    request_timeout: args.redis_timeout,
                },
            },
            tokens: TokenConfig {
                provider: args.token_provider,
                header_name: args.token_header,
                lifetime: Duration::from_secs(args.token_lifetime),
            },
            rate_limit: args.rate_limit,
            log_level: args.log_level,
        }
    }

    /// Validate the configuration
    ///
    /// A `store` token provider over the `memory` store is accepted; it only
    /// makes sense for a single instance.
    pub fn validate(&self) -> Result<()> {
        if self.tokens.lifetime.is_zero() {
            return Err(anyhow!("Token lifetime must be greater than zero"));
        }
        if self.tokens.header_name.trim().is_empty() {
            return Err(anyhow!("Token header name must not be empty"));
        }
        if self.rate_limit <= 0 {
            return Err(anyhow!(
                "Rate limit must be greater than zero, got {}",
                self.rate_limit
            ));
        }
        if self.store.store_type == StoreType::Redis && self.store.redis.address.is_empty() {
            return Err(anyhow!("Redis address must be set when using the redis store"));
        }
        Ok(())
    }

    /// Print all available environment variables and their descriptions
    fn print_env_vars() {
        println!("Lockcrab Environment Variables");
        println!("==============================");
        println!();
        println!("All environment variables use the LOCKCRAB_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("HTTP Configuration:");
        println!("  LOCKCRAB_HTTP_HOST=<host>               HTTP host [default: 127.0.0.1]");
        println!("  LOCKCRAB_HTTP_PORT=<port>               HTTP port [default: 8080]");
        println!();

        println!("Store Configuration:");
        println!(
            "  LOCKCRAB_STORE=<type>                   Store type: memory, redis [default: memory]"
        );
        println!(
            "  LOCKCRAB_STORE_CAPACITY=<size>          Memory store capacity [default: 100000]"
        );
        println!(
            "  LOCKCRAB_STORE_CLEANUP_INTERVAL=<secs>  Memory store sweep interval [default: 60]"
        );
        println!();
        println!("  For redis store:");
        println!(
            "    LOCKCRAB_REDIS_ADDRESS=<addr>         Redis address [default: 127.0.0.1:6379]"
        );
        println!("    LOCKCRAB_REDIS_PASSWORD=<password>    Redis password [default: none]");
        println!("    LOCKCRAB_REDIS_DB=<db>                Redis database [default: 0]");
        println!(
            "    LOCKCRAB_REDIS_RETRIES=<n>            Reconnect attempts [default: 6]"
        );
        println!(
            "    LOCKCRAB_REDIS_TIMEOUT=<ms>           Request timeout in milliseconds [default: 5000]"
        );
        println!();

        println!("Token Configuration:");
        println!(
            "  LOCKCRAB_TOKEN_PROVIDER=<provider>      Token provider: memory, store [default: memory]"
        );
        println!(
            "  LOCKCRAB_TOKEN_HEADER=<name>            Access token header [default: X-Access-Token]"
        );
        println!(
            "  LOCKCRAB_TOKEN_LIFETIME=<secs>          Token lifetime in seconds [default: 86400]"
        );
        println!();

        println!("General Configuration:");
        println!(
            "  LOCKCRAB_RATE_LIMIT=<n>                 Requests per account per minute [default: 100]"
        );
        println!(
            "  LOCKCRAB_LOG_LEVEL=<level>              Log level: error, warn, info, debug, trace [default: info]"
        );
        println!();

        println!("Examples:");
        println!("  # Share sessions and limits between instances");
        println!("  export LOCKCRAB_STORE=redis");
        println!("  export LOCKCRAB_TOKEN_PROVIDER=store");
        println!();
        println!("  # Run server (CLI args override env vars)");
        println!("  lockcrab --http-port 9090");
    }
}
