// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use std::path::PathBuf;

/// Errors raised while configuring the pipeline or touching its files.
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No readable log sources were found")]
    NoSources,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ShipperError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Terminal outcome of a single delivery that did not succeed.
///
/// Only [`DeliveryError::RetriesExhausted`] is produced after backing off; every
/// other variant is decided on the attempt that observed it.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Malformed destination URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request could not be built: {0}")]
    Request(String),

    #[error("Backend rejected the event with status {0}")]
    Rejected(StatusCode),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Unauthorized (401). The API key may be invalid or inactive")]
    AuthRejected,
}

impl DeliveryError {
    /// Whether the event was dropped without any retry.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl { .. } | Self::Request(_) | Self::Rejected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ShipperError::InvalidConfig("backend URL is empty".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: backend URL is empty"
        );

        let error = ShipperError::io(
            "/var/log/gpumon_1.log",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(error.to_string(), "I/O error on /var/log/gpumon_1.log: gone");
    }

    #[test]
    fn test_delivery_error_fatality() {
        assert!(DeliveryError::Rejected(StatusCode::BAD_REQUEST).is_fatal());
        assert!(DeliveryError::InvalidUrl {
            url: "::".to_string(),
            reason: "relative URL without a base".to_string(),
        }
        .is_fatal());
        assert!(!DeliveryError::AuthRejected.is_fatal());
        assert!(!DeliveryError::RetriesExhausted {
            attempts: 10,
            last_error: "503".to_string(),
        }
        .is_fatal());
    }
}
