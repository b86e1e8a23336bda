//! Request Executor
//!
//! Performs exactly one HTTP attempt and classifies the response.

use crate::api::{Method, RateLimitBody};
use crate::client::rate_gate::RateGate;
use crate::codec::EncodedBody;
use crate::config::ClientConfig;
use crate::error::{RestError, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Result of a single attempt
#[derive(Debug)]
pub enum AttemptOutcome {
    /// 2xx with a body
    Success(Bytes),

    /// 204 No Content
    SuccessEmpty,

    /// Transient; a later attempt may succeed
    Retryable(RetryReason),

    /// Must not be retried
    Terminal(RestError),
}

/// Why an attempt is worth repeating
#[derive(Debug, thiserror::Error)]
pub enum RetryReason {
    /// The HTTP request object could not be built
    #[error("failed to initialize new request: {0}")]
    RequestBuild(#[source] reqwest::Error),

    /// Connection, TLS or timeout failure
    #[error("failed to process request: {0}")]
    Transport(#[source] reqwest::Error),

    /// 429; the gate has already been engaged and waited out
    #[error("rate limited (retry_after {:.3}s, global: {global})", .retry_after.as_secs_f64())]
    RateLimited { retry_after: Duration, global: bool },
}

/// One-shot HTTP attempts against a fixed API base
#[derive(Clone)]
pub struct RequestExecutor {
    /// Pooled HTTP client, shared by all attempts
    http: Client,

    /// API base without trailing slash
    base_url: String,

    /// Authorization and User-Agent, sent on every attempt
    headers: HeaderMap,

    gate: Arc<RateGate>,

    /// Added to every upstream `retry_after`
    safety_margin: Duration,
}

impl RequestExecutor {
    /// Build the HTTP client and static headers from `config`
    pub fn from_config(config: &ClientConfig, gate: Arc<RateGate>) -> Result<Self> {
        let token = config.resolve_token().ok_or_else(|| {
            RestError::Config(format!(
                "No API token configured. Set {} or add \"token\" to the config file",
                config.token_env
            ))
        })?;

        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| RestError::Config(format!("Invalid base_url {:?}: {}", base_url, e)))?;

        let mut headers = HeaderMap::new();
        let mut authorization = HeaderValue::from_str(&config.authorization(&token))
            .map_err(|e| RestError::Config(format!("Invalid API token format: {}", e)))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| RestError::Config(format!("Invalid user agent: {}", e)))?,
        );

        let http = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| RestError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            headers,
            gate,
            safety_margin: config.rate_limit.safety_margin(),
        })
    }

    pub fn gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full target for a route
    pub fn url_for(&self, route: &str) -> String {
        if route.starts_with('/') {
            format!("{}{}", self.base_url, route)
        } else {
            format!("{}/{}", self.base_url, route)
        }
    }

    /// Send one attempt; never retries internally
    pub async fn attempt(&self, method: &Method, route: &str, body: &EncodedBody) -> AttemptOutcome {
        let mut builder = self
            .http
            .request(method.clone(), self.url_for(route))
            .headers(self.headers.clone())
            .body(body.bytes.clone());
        if let Some(content_type) = &body.content_type {
            builder = builder.header(CONTENT_TYPE, content_type.as_str());
        }

        let request = match builder.build() {
            Ok(request) => request,
            Err(e) => return AttemptOutcome::Retryable(RetryReason::RequestBuild(e)),
        };

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::Retryable(RetryReason::Transport(e)),
        };

        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return AttemptOutcome::SuccessEmpty;
        }

        if status.is_success() {
            return match response.bytes().await {
                Ok(bytes) => AttemptOutcome::Success(bytes),
                Err(e) => AttemptOutcome::Terminal(RestError::BodyRead(e)),
            };
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let headers = response.headers().clone();
            let raw = response.bytes().await.unwrap_or_default();
            let limit = RateLimitBody::parse(&raw);
            let retry_after = limit.retry_after(&headers);

            let deadline = self.gate.mark_unavailable(retry_after.saturating_add(self.safety_margin));
            tracing::warn!(
                %method,
                route,
                retry_after_ms = retry_after.as_millis() as u64,
                global = limit.global,
                message = %limit.message,
                "rate limited, holding requests until cool-down ends"
            );

            tokio::time::sleep_until(deadline).await;
            self.gate.await_availability().await;

            return AttemptOutcome::Retryable(RetryReason::RateLimited {
                retry_after,
                global: limit.global,
            });
        }

        let body = response.text().await.unwrap_or_default();
        AttemptOutcome::Terminal(RestError::Application {
            status: status.as_u16(),
            status_line: status.to_string(),
            body,
        })
    }
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url)
            .field("authorization", &"<redacted>")
            .field("safety_margin", &self.safety_margin)
            .finish()
    }
}
