//! Client Options
//!
//! Defines the configuration schema for a client instance.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Root configuration structure
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Raw API token; falls back to the `token_env` variable when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the token
    pub token_env: String,

    /// Authorization scheme prefixed to the token (e.g. "Bot", "Bearer")
    pub auth_scheme: String,

    /// API base URL; routes are appended to it
    pub base_url: String,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Per-attempt request timeout in milliseconds
    pub timeout_ms: u64,

    /// Connect (TCP + TLS handshake) timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,

    /// Route used by `ping`
    pub ping_route: String,

    /// Array-typed fields whose explicit `null` is sent as `[]`
    pub null_array_fields: Vec<String>,

    pub retry: RetryConfig,

    pub rate_limit: RateLimitConfig,

    pub buffers: BufferConfig,
}

/// Retry budget settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first
    pub max_attempts: u32,

    /// Delay unit in microseconds; the n-th retry waits `n * unit`
    pub delay_unit_us: u64,
}

/// Rate limit handling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Added to every upstream `retry_after`
    pub safety_margin_ms: u64,
}

/// Body buffer pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub enabled: bool,

    /// Smallest size class in bytes (never below 4096)
    pub json_buffer_size: usize,

    /// Idle buffers retained per size class
    pub max_per_class: usize,
}

pub const DEFAULT_TOKEN_ENV: &str = "RESTGATE_TOKEN";
pub const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: None,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            auth_scheme: "Bot".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: format!("restgate/{}", env!("CARGO_PKG_VERSION")),
            timeout_ms: 3_000,
            connect_timeout_ms: 3_000,
            pool_max_idle_per_host: 10,
            ping_route: "/gateway".to_string(),
            null_array_fields: ["embeds", "components", "attachments", "sticker_ids", "roles"]
                .into_iter()
                .map(String::from)
                .collect(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            buffers: BufferConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_unit_us: 250,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            safety_margin_ms: 5_000,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            json_buffer_size: 4096,
            max_per_class: 16,
        }
    }
}

impl ClientConfig {
    /// Config for `base_url` with an explicit token
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.rate_limit.safety_margin_ms = margin.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Token from the config itself, else from the `token_env` variable
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(&self.token_env).ok())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Full `Authorization` header value, adding the scheme unless already present
    pub fn authorization(&self, token: &str) -> String {
        let scheme = self.auth_scheme.trim();
        if scheme.is_empty() {
            return token.to_string();
        }

        let prefix = format!("{} ", scheme);
        let has_prefix = token
            .get(..prefix.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(&prefix));
        if has_prefix {
            token.to_string()
        } else {
            format!("{}{}", prefix, token)
        }
    }
}

impl RetryConfig {
    pub fn delay_unit(&self) -> Duration {
        Duration::from_micros(self.delay_unit_us)
    }
}

impl RateLimitConfig {
    pub fn safety_margin(&self) -> Duration {
        Duration::from_millis(self.safety_margin_ms)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_env", &self.token_env)
            .field("auth_scheme", &self.auth_scheme)
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .field("timeout_ms", &self.timeout_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("ping_route", &self.ping_route)
            .field("null_array_fields", &self.null_array_fields)
            .field("retry", &self.retry)
            .field("rate_limit", &self.rate_limit)
            .field("buffers", &self.buffers)
            .finish()
    }
}
