//! Server configuration read from the environment.

use std::time::Duration;

use axum::http::HeaderValue;
use tracing::warn;

use rinova_core::defaults;

/// Runtime settings for the HTTP server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Origins permitted by CORS.
    pub allowed_origins: Vec<HeaderValue>,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u64,
    pub rate_limit_period_secs: u64,
    /// Deadline for one extraction call.
    pub extraction_timeout: Duration,
    /// Failed notes with this many attempts are no longer requeued.
    pub max_extraction_attempts: i32,
    pub health_cache_ttl: Duration,
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/rinova".to_string(),
            host: defaults::SERVER_HOST.to_string(),
            port: defaults::SERVER_PORT,
            allowed_origins: default_origins(),
            rate_limit_enabled: true,
            rate_limit_requests: defaults::RATE_LIMIT_REQUESTS,
            rate_limit_period_secs: defaults::RATE_LIMIT_PERIOD_SECS,
            extraction_timeout: Duration::from_secs(defaults::EXTRACTION_TIMEOUT_SECS),
            max_extraction_attempts: defaults::MAX_EXTRACTION_ATTEMPTS,
            health_cache_ttl: Duration::from_secs(defaults::HEALTH_CACHE_TTL_SECS),
            max_body_bytes: defaults::MAX_BODY_BYTES,
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DATABASE_URL` | `postgres://localhost/rinova` |
    /// | `HOST` | `0.0.0.0` |
    /// | `PORT` | `8000` |
    /// | `ALLOWED_ORIGINS` | `http://localhost:3000` |
    /// | `RATE_LIMIT_ENABLED` | `true` |
    /// | `RATE_LIMIT_REQUESTS` | `100` |
    /// | `RATE_LIMIT_PERIOD_SECS` | `60` |
    /// | `EXTRACTION_TIMEOUT_SECS` | `30` |
    /// | `MAX_EXTRACTION_ATTEMPTS` | `5` |
    /// | `HEALTH_CACHE_TTL_SECS` | `300` |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(base.database_url),
            host: std::env::var("HOST").unwrap_or(base.host),
            port: env_parse("PORT").unwrap_or(base.port),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .map(|v| parse_allowed_origins(&v))
                .unwrap_or(base.allowed_origins),
            rate_limit_enabled: std::env::var("RATE_LIMIT_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(base.rate_limit_enabled),
            rate_limit_requests: env_parse("RATE_LIMIT_REQUESTS")
                .filter(|n| *n > 0)
                .unwrap_or(base.rate_limit_requests),
            rate_limit_period_secs: env_parse("RATE_LIMIT_PERIOD_SECS")
                .filter(|n| *n > 0)
                .unwrap_or(base.rate_limit_period_secs),
            extraction_timeout: env_parse("EXTRACTION_TIMEOUT_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(base.extraction_timeout),
            max_extraction_attempts: env_parse("MAX_EXTRACTION_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(base.max_extraction_attempts),
            health_cache_ttl: env_parse("HEALTH_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.health_cache_ttl),
            max_body_bytes: base.max_body_bytes,
        }
    }

    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn with_rate_limit(mut self, enabled: bool, requests: u64, period_secs: u64) -> Self {
        self.rate_limit_enabled = enabled;
        self.rate_limit_requests = requests.max(1);
        self.rate_limit_period_secs = period_secs.max(1);
        self
    }

    pub fn with_max_extraction_attempts(mut self, attempts: i32) -> Self {
        self.max_extraction_attempts = attempts;
        self
    }

    pub fn with_health_cache_ttl(mut self, ttl: Duration) -> Self {
        self.health_cache_ttl = ttl;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn default_origins() -> Vec<HeaderValue> {
    vec![HeaderValue::from_static("http://localhost:3000")]
}

/// Parse a comma-separated origin list, skipping invalid entries.
///
/// An empty list falls back to the local development origin.
pub fn parse_allowed_origins(raw: &str) -> Vec<HeaderValue> {
    let origins: Vec<HeaderValue> = raw
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect();

    if origins.is_empty() {
        default_origins()
    } else {
        origins
    }
}
