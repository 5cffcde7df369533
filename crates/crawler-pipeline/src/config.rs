// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use crate::delivery::RetryPolicy;
use crate::error::ShipperError;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cadence of the poller loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    /// Sleep after a cycle in which any source produced lines.
    pub active_interval: Duration,
    /// Sleep after an idle cycle; upper bound when backing off adaptively.
    pub idle_interval: Duration,
    /// When set, consecutive idle cycles grow the sleep from
    /// `active_interval` by this factor until `idle_interval` is reached.
    pub adaptive_backoff: Option<f64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            active_interval: Duration::from_millis(50),
            idle_interval: Duration::from_millis(1000),
            adaptive_backoff: None,
        }
    }
}

/// Resolved settings consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL of the ingestion backend; events go to `<backend_url>/metrics`.
    pub backend_url: String,
    /// Sent as `X-API-Key` when present.
    pub api_key: Option<String>,
    /// Sources in round-robin poll order.
    pub sources: Vec<PathBuf>,
    /// Queue bound; 0 is unbounded.
    pub queue_capacity: usize,
    pub poll: PollConfig,
    pub retry: RetryPolicy,
    /// Timeout for each HTTP attempt.
    pub request_timeout: Duration,
    pub https_proxy: Option<String>,
    /// Overrides hostname detection when set.
    pub hostname: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            api_key: None,
            sources: Vec::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll: PollConfig::default(),
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            https_proxy: None,
            hostname: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ShipperError> {
        if self.backend_url.trim().is_empty() {
            return Err(ShipperError::InvalidConfig(
                "backend URL cannot be empty".to_string(),
            ));
        }

        if self.poll.active_interval.is_zero() || self.poll.idle_interval.is_zero() {
            return Err(ShipperError::InvalidConfig(
                "poll intervals must be greater than 0".to_string(),
            ));
        }

        if let Some(factor) = self.poll.adaptive_backoff {
            if !factor.is_finite() || factor < 1.0 {
                return Err(ShipperError::InvalidConfig(format!(
                    "adaptive backoff factor must be at least 1.0, got {factor}"
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ShipperError::InvalidConfig(
                "retry policy needs at least one attempt".to_string(),
            ));
        }

        Ok(())
    }

    /// Delivery endpoint derived from the backend base URL.
    #[must_use]
    pub fn metrics_url(&self) -> String {
        format!("{}/metrics", self.backend_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_capacity, 10_000);
        assert_eq!(config.poll.active_interval, Duration::from_millis(50));
        assert_eq!(config.poll.idle_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_validate_empty_backend() {
        let config = PipelineConfig {
            backend_url: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_interval() {
        let config = PipelineConfig {
            poll: PollConfig {
                active_interval: Duration::ZERO,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_backoff_factor() {
        for factor in [0.5, f64::NAN] {
            let config = PipelineConfig {
                poll: PollConfig {
                    adaptive_backoff: Some(factor),
                    ..Default::default()
                },
                ..Default::default()
            };
            assert!(config.validate().is_err(), "factor {factor} should be rejected");
        }
    }

    #[test]
    fn test_metrics_url_trims_trailing_slash() {
        let config = PipelineConfig {
            backend_url: "https://ingest.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.metrics_url(), "https://ingest.example.com/metrics");
    }
}
