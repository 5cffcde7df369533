// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event delivery to the ingestion backend with retry and failure classification.
//!
//! ```text
//!   send(event)
//!       │
//!       v
//!   ┌─────────────┐   2xx        ┌───────────┐
//!   │ HTTP POST   │ ───────────> │ delivered │
//!   │ /metrics    │              └───────────┘
//!   └──────┬──────┘   401        ┌──────────────────────┐
//!          │ ──────────────────> │ auth hook (exit 1)   │
//!          │   bad URL / 4xx     ┌──────────────────────┐
//!          │ ──────────────────> │ dropped, no retry    │
//!          │   5xx / network     └──────────────────────┘
//!          v
//!   ┌─────────────┐  attempts left: sleep, double delay (cap 30 s)
//!   │   Retry?    │  exhausted: dropped
//!   └─────────────┘
//! ```
//!
//! Delivery is fire-and-forget for the dispatch worker: [`DeliveryClient::send`]
//! returns nothing and every outcome is logged here. The only failure that
//! escapes is a 401, since a revoked key cannot be healed by retrying.

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::config::PipelineConfig;
use crate::error::DeliveryError;
use crate::http::get_client;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Capability the dispatch worker delivers enriched events through.
pub trait DeliveryClient: Send {
    /// Best-effort delivery of one serialized event.
    fn send(&self, event: &str);
}

/// Exponential backoff bounds for a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }

    /// Sleeps taken between consecutive attempts when every attempt fails.
    #[must_use]
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let retries = self.max_attempts.saturating_sub(1) as usize;
        let mut delays = Vec::with_capacity(retries);
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 0..retries {
            delays.push(delay);
            delay = self.next_delay(delay);
        }
        delays
    }
}

/// Called when the backend answers 401.
pub type AuthRejectedHook = Arc<dyn Fn() + Send + Sync>;

fn exit_process() -> AuthRejectedHook {
    Arc::new(|| std::process::exit(1))
}

#[derive(Debug)]
enum Attempt {
    Success,
    Retryable(String),
    Fatal(DeliveryError),
    AuthRejected,
}

fn classify_status(status: StatusCode) -> Attempt {
    if status.is_success() {
        Attempt::Success
    } else if status == StatusCode::UNAUTHORIZED {
        Attempt::AuthRejected
    } else if status.is_server_error() {
        Attempt::Retryable(format!("server error {status}"))
    } else {
        Attempt::Fatal(DeliveryError::Rejected(status))
    }
}

fn classify_error(e: &reqwest::Error) -> Attempt {
    if e.is_builder() {
        Attempt::Fatal(DeliveryError::Request(e.to_string()))
    } else {
        Attempt::Retryable(e.to_string())
    }
}

/// Production [`DeliveryClient`] posting JSON to `<backend>/metrics`.
#[derive(Clone)]
pub struct HttpDeliveryClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    retry: RetryPolicy,
    on_auth_rejected: AuthRejectedHook,
}

impl std::fmt::Debug for HttpDeliveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDeliveryClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HttpDeliveryClient {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            client: get_client(config),
            endpoint: config.metrics_url(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            retry: config.retry,
            on_auth_rejected: exit_process(),
        }
    }

    /// Replaces the default 401 behavior, which exits the process.
    #[must_use]
    pub fn with_auth_rejected_hook(mut self, hook: AuthRejectedHook) -> Self {
        self.on_auth_rejected = hook;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn parse_endpoint(&self) -> Result<Url, DeliveryError> {
        let invalid = |reason: String| DeliveryError::InvalidUrl {
            url: self.endpoint.clone(),
            reason,
        };
        let url = Url::parse(&self.endpoint).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" if url.has_host() => Ok(url),
            "http" | "https" => Err(invalid("missing host".to_string())),
            scheme => Err(invalid(format!("unsupported scheme '{scheme}'"))),
        }
    }

    fn create_request(&self, url: Url, event: &str) -> RequestBuilder {
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(event.to_owned());
        match &self.api_key {
            Some(api_key) => request.header(API_KEY_HEADER, api_key),
            None => request,
        }
    }

    /// Delivers one event, retrying transient failures per the retry policy.
    ///
    /// Returns the number of attempts it took. Unlike [`DeliveryClient::send`]
    /// this reports a 401 as [`DeliveryError::AuthRejected`] without calling
    /// the auth-rejected hook.
    pub fn deliver(&self, event: &str) -> Result<u32, DeliveryError> {
        let url = self.parse_endpoint()?;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut delays = self.retry.backoff_schedule().into_iter();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let time = Instant::now();
            let outcome = match self.create_request(url.clone(), event).send() {
                Ok(resp) => classify_status(resp.status()),
                Err(e) => classify_error(&e),
            };
            let elapsed = time.elapsed();

            match outcome {
                Attempt::Success => {
                    debug!(
                        "DELIVERY | Delivered event in {} ms after {} attempt(s)",
                        elapsed.as_millis(),
                        attempt
                    );
                    return Ok(attempt);
                }
                Attempt::AuthRejected => return Err(DeliveryError::AuthRejected),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Retryable(reason) => {
                    debug!(
                        "DELIVERY | Attempt {}/{} failed after {} ms: {}",
                        attempt,
                        max_attempts,
                        elapsed.as_millis(),
                        reason
                    );
                    last_error = reason;
                }
            }

            if let Some(delay) = delays.next() {
                debug!("DELIVERY | Retrying in {} ms", delay.as_millis());
                thread::sleep(delay);
            }
        }

        Err(DeliveryError::RetriesExhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}

impl DeliveryClient for HttpDeliveryClient {
    fn send(&self, event: &str) {
        match self.deliver(event) {
            Ok(_) => {}
            Err(DeliveryError::AuthRejected) => {
                error!(
                    "Unauthorized (401). Your API key may be invalid or inactive. Rotate it and run again with --set-key."
                );
                (self.on_auth_rejected)();
            }
            Err(e) => debug!("DELIVERY | Dropping event: {}", e),
        }
    }
}
