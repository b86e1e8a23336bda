//! Retry Scheduling
//!
//! Drives repeated attempts with a bounded budget and linearly growing delay.

use crate::api::Method;
use crate::client::executor::{AttemptOutcome, RequestExecutor};
use crate::codec::EncodedBody;
use crate::config::RetryConfig;
use crate::error::{RestError, Result};
use backoff::backoff::Backoff;
use bytes::Bytes;
use std::time::Duration;

/// Attempt counter with a fixed maximum
///
/// The n-th retryable failure is followed by a `unit * n` pause; once the
/// budget is spent `next_backoff` returns `None`.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_attempts: u32,
    unit: Duration,
    failures: u32,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            unit,
            failures: 0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay_unit())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Retryable failures recorded so far
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl Backoff for RetryBudget {
    fn reset(&mut self) {
        self.failures = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.max_attempts {
            None
        } else {
            Some(self.unit * self.failures)
        }
    }
}

/// Runs one logical request to a definitive outcome
#[derive(Debug)]
pub struct RetryScheduler<'a> {
    executor: &'a RequestExecutor,
    budget: RetryBudget,
}

impl<'a> RetryScheduler<'a> {
    pub fn new(executor: &'a RequestExecutor, budget: RetryBudget) -> Self {
        Self { executor, budget }
    }

    /// Attempt until success, a terminal failure, or the budget runs out
    ///
    /// `body` is already materialized and is re-sent unchanged on every attempt.
    pub async fn run(mut self, method: &Method, route: &str, body: &EncodedBody) -> Result<Bytes> {
        self.budget.reset();

        loop {
            self.executor.gate().await_availability().await;

            let attempt = self.budget.failures() + 1;
            tracing::debug!(%method, route, attempt, "sending request");

            let reason = match self.executor.attempt(method, route, body).await {
                AttemptOutcome::Success(bytes) => return Ok(bytes),
                AttemptOutcome::SuccessEmpty => return Ok(Bytes::new()),
                AttemptOutcome::Terminal(err) => return Err(err),
                AttemptOutcome::Retryable(reason) => reason,
            };

            match self.budget.next_backoff() {
                Some(delay) => {
                    tracing::debug!(
                        %method,
                        route,
                        attempt,
                        delay_us = delay.as_micros() as u64,
                        reason = %reason,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::warn!(
                        %method,
                        route,
                        attempts = attempt,
                        reason = %reason,
                        "giving up on request"
                    );
                    return Err(RestError::ExhaustedRetries {
                        method: method.to_string(),
                        route: route.to_string(),
                        attempts: attempt,
                        last: reason,
                    });
                }
            }
        }
    }
}
