//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `PUBLIC_URL` — externally reachable base URL used to build the
///   payment provider's redirect targets (default: `http://HOST:PORT`)
/// - `DATABASE_URL` — PostgreSQL URL; absent means in-memory stores
/// - `REDIS_URL` — Redis URL; absent means an in-memory cache
/// - `PAYMENT_API_URL` — payment provider base URL; absent means the
///   in-memory gateway (local development only)
/// - `PAYMENT_CLIENT_ID` / `PAYMENT_SECRET` — provider credentials
/// - `PAYMENT_TIMEOUT_SECS` — deadline per provider call (default: 30)
/// - `CACHE_TTL_SECS` — cached book lifetime (default: 3600)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub public_url: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub payment_api_url: Option<String>,
    pub payment_client_id: String,
    pub payment_secret: String,
    pub payment_timeout: Duration,
    pub cache_ttl: Duration,
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(default),
    )
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);
        Self {
            public_url: std::env::var("PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://{host}:{port}")),
            host,
            port,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            redis_url: std::env::var("REDIS_URL").ok(),
            payment_api_url: std::env::var("PAYMENT_API_URL").ok(),
            payment_client_id: std::env::var("PAYMENT_CLIENT_ID").unwrap_or_default(),
            payment_secret: std::env::var("PAYMENT_SECRET").unwrap_or_default(),
            payment_timeout: env_secs("PAYMENT_TIMEOUT_SECS", 30),
            cache_ttl: env_secs("CACHE_TTL_SECS", 3600),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            public_url: "http://0.0.0.0:3000".to_string(),
            database_url: None,
            redis_url: None,
            payment_api_url: None,
            payment_client_id: String::new(),
            payment_secret: String::new(),
            payment_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(3600),
        }
    }
}
