//! Restgate - rate-limit aware REST request pipeline
//!
//! Issues requests against a rate-limited HTTP API, encodes JSON and multipart
//! payloads, and absorbs transient failures and 429 backpressure so callers
//! see either the response bytes or a single terminal error.
//!
//! ```no_run
//! use restgate::{ClientConfig, FileAttachment, Request, RestClient};
//!
//! # async fn run() -> restgate::Result<()> {
//! let client = RestClient::new(ClientConfig::new("https://discord.com/api/v10", "token"))?;
//!
//! let payload = serde_json::json!({"content": "hello", "embeds": null});
//! let mut file = tokio::fs::File::open("cat.png").await.unwrap();
//! let request = Request::post("/channels/123/messages")
//!     .with_payload(&payload)
//!     .with_file(FileAttachment::from_file("cat.png", &mut file));
//!
//! let raw = client.send(request).await?;
//! # let _ = raw;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub mod api;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;

pub use api::{FileAttachment, Method, RateLimitBody, Request};
pub use client::{AttemptOutcome, RateGate, RequestExecutor, RetryBudget, RetryReason};
pub use codec::{BufferPool, EncodedBody, NullArrayPatch, PayloadCodec};
pub use config::{ClientConfig, ConfigLoader};
pub use error::{RestError, Result};

use client::RetryScheduler;
use config::RetryConfig;

/// The main REST client
///
/// Cheap to clone; clones share the rate gate, the buffer pool and the HTTP
/// connection pool. Separately constructed clients share nothing.
#[derive(Clone)]
pub struct RestClient {
    /// Single-attempt executor, owner of the gate and the HTTP client
    executor: RequestExecutor,

    /// Body encoder
    codec: PayloadCodec,

    /// Retry budget handed to every call
    retry: RetryConfig,

    /// Route used by `ping`
    ping_route: String,
}

impl RestClient {
    /// Create a client from an explicit configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let gate = Arc::new(RateGate::new());
        let executor = RequestExecutor::from_config(&config, gate)?;

        let pool = config.buffers.enabled.then(|| {
            Arc::new(BufferPool::new(
                config.buffers.json_buffer_size,
                config.buffers.max_per_class,
            ))
        });
        let codec = PayloadCodec::new(NullArrayPatch::new(&config.null_array_fields), pool);

        tracing::debug!(base_url = executor.base_url(), "rest client created");

        Ok(Self {
            executor,
            codec,
            retry: config.retry,
            ping_route: config.ping_route,
        })
    }

    /// Create a client with configuration from default locations and the environment
    pub fn from_env() -> Result<Self> {
        Self::new(ConfigLoader::new()?.into_config()?)
    }

    /// Create a client with a custom config path
    pub fn with_config_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(ConfigLoader::from_path(path)?.into_config()?)
    }

    /// The gate shared by every request of this client
    pub fn rate_gate(&self) -> &RateGate {
        self.executor.gate()
    }

    pub fn buffer_pool(&self) -> Option<&BufferPool> {
        self.codec.pool().map(|pool| pool.as_ref())
    }

    /// Issue `method` on `route` with an optional payload and attachments
    pub async fn execute<'a, T>(
        &self,
        method: Method,
        route: &str,
        payload: Option<&'a T>,
        files: Vec<FileAttachment<'a>>,
    ) -> Result<Bytes>
    where
        T: Serialize + ?Sized,
    {
        let request = Request::new(method, route).with_files(files);
        match payload {
            Some(payload) => self.send(request.with_payload(payload)).await,
            None => self.send(request).await,
        }
    }

    /// Run a request to completion; an empty result means the API sent no content
    pub async fn send<T>(&self, request: Request<'_, T>) -> Result<Bytes>
    where
        T: Serialize + ?Sized,
    {
        let (method, route, payload, mut files) = request.into_parts();

        let body = self.codec.encode(payload, &mut files).await?;
        drop(files);

        let result = RetryScheduler::new(&self.executor, RetryBudget::from_config(&self.retry))
            .run(&method, &route, &body)
            .await;

        self.codec.reclaim(body);
        result
    }

    /// Run a request and decode the JSON response
    pub async fn send_json<T, R>(&self, request: Request<'_, T>) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let raw = self.send(request).await?;
        if raw.is_empty() {
            return Err(RestError::Decode("response had no body".to_string()));
        }

        serde_json::from_slice(&raw).map_err(|e| {
            RestError::Decode(format!(
                "failed to parse received data: {}. Body: {}",
                e,
                String::from_utf8_lossy(&raw[..raw.len().min(500)])
            ))
        })
    }

    /// Run a request until it finishes or `cancel` completes, whichever is first
    ///
    /// Cancelling drops the in-flight attempt and any rate gate wait.
    pub async fn send_with_cancel<T, F>(&self, request: Request<'_, T>, cancel: F) -> Result<Bytes>
    where
        T: Serialize + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::debug!("request cancelled by caller");
                Err(RestError::Cancelled)
            }
            result = self.send(request) => result,
        }
    }

    /// Run a request with a deadline covering every attempt and wait
    pub async fn send_with_timeout<T>(&self, request: Request<'_, T>, timeout: Duration) -> Result<Bytes>
    where
        T: Serialize + ?Sized,
    {
        tokio::time::timeout(timeout, self.send(request))
            .await
            .map_err(|_| RestError::TimedOut(timeout))?
    }

    /// Round-trip latency of a request to the ping route
    pub async fn ping(&self) -> Result<Duration> {
        let start = tokio::time::Instant::now();
        self.send(Request::get(self.ping_route.as_str())).await?;
        Ok(start.elapsed())
    }
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("executor", &self.executor)
            .field("retry", &self.retry)
            .field("ping_route", &self.ping_route)
            .finish()
    }
}
