// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Settings resolution: command line, then environment (both via [`Cli`]),
//! then the persisted settings file, then defaults.

use anyhow::{Context, Result};
use crawler_pipeline::config::{DEFAULT_BACKEND_URL, DEFAULT_QUEUE_CAPACITY};
use crawler_pipeline::{PipelineConfig, PollConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::cli::Cli;

const SETTINGS_DIR: &str = ".gpu-crawler";
const SETTINGS_FILE: &str = "config.json";

/// Contents of `~/.gpu-crawler/config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_directory: Option<PathBuf>,
}

#[must_use]
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(SETTINGS_DIR).join(SETTINGS_FILE))
}

impl StoredSettings {
    /// Reads the settings file. A missing or unreadable file yields empty
    /// settings.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No settings loaded from {}: {}", path.display(), e);
                return Self::default();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring unreadable settings file {}: {}", path.display(), e);
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content + "\n")
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }
}

/// Fully resolved agent settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend_url: String,
    pub api_key: Option<String>,
    pub log_directory: Option<PathBuf>,
    pub queue_capacity: usize,
    pub poll: PollConfig,
    pub hostname: Option<String>,
    pub https_proxy: Option<String>,
    pub self_test: bool,
    pub set_key: bool,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Queue capacity: non-positive is unbounded (0), unparsable keeps the default.
#[must_use]
pub fn parse_queue_capacity(value: Option<&str>) -> usize {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return DEFAULT_QUEUE_CAPACITY;
    };
    match value.parse::<i64>() {
        Ok(capacity) if capacity <= 0 => 0,
        Ok(capacity) => usize::try_from(capacity).unwrap_or(usize::MAX),
        Err(e) => {
            warn!(
                "Invalid queue capacity '{}': {}, using {}",
                value, e, DEFAULT_QUEUE_CAPACITY
            );
            DEFAULT_QUEUE_CAPACITY
        }
    }
}

fn parse_interval(name: &str, value: Option<&str>, default: Duration) -> Duration {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return default;
    };
    match value.parse::<u64>() {
        Ok(ms) if ms > 0 => Duration::from_millis(ms),
        _ => {
            warn!(
                "Invalid {} '{}', using {} ms",
                name,
                value,
                default.as_millis()
            );
            default
        }
    }
}

fn parse_backoff(value: Option<&str>) -> Option<f64> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match value.parse::<f64>() {
        Ok(factor) if factor.is_finite() && factor >= 1.0 => Some(factor),
        _ => {
            warn!("Invalid poll backoff '{}', polling at fixed intervals", value);
            None
        }
    }
}

impl Settings {
    #[must_use]
    pub fn resolve(cli: &Cli, stored: StoredSettings) -> Self {
        let defaults = PollConfig::default();
        let active_interval = parse_interval(
            "active poll interval",
            cli.poll_active_ms.as_deref(),
            defaults.active_interval,
        );
        let idle_interval = parse_interval(
            "idle poll interval",
            cli.poll_idle_ms.as_deref(),
            defaults.idle_interval,
        )
        .max(active_interval);

        Self {
            backend_url: non_empty(cli.backend_url.as_ref())
                .or(stored.backend_url.filter(|url| !url.is_empty()))
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            api_key: non_empty(cli.api_key.as_ref())
                .or(stored.api_key.filter(|key| !key.is_empty())),
            log_directory: cli
                .log_dir
                .clone()
                .filter(|dir| !dir.as_os_str().is_empty())
                .or(stored.log_directory.filter(|dir| !dir.as_os_str().is_empty())),
            queue_capacity: parse_queue_capacity(cli.queue_capacity.as_deref()),
            poll: PollConfig {
                active_interval,
                idle_interval,
                adaptive_backoff: parse_backoff(cli.poll_backoff.as_deref()),
            },
            hostname: non_empty(cli.hostname.as_ref()),
            https_proxy: non_empty(cli.https_proxy.as_ref()),
            self_test: cli.self_test,
            set_key: cli.set_key,
        }
    }

    /// The part worth persisting between runs.
    #[must_use]
    pub fn stored(&self) -> StoredSettings {
        StoredSettings {
            backend_url: Some(self.backend_url.clone()),
            api_key: self.api_key.clone(),
            log_directory: self.log_directory.clone(),
        }
    }

    #[must_use]
    pub fn pipeline_config(&self, sources: Vec<PathBuf>) -> PipelineConfig {
        PipelineConfig {
            backend_url: self.backend_url.clone(),
            api_key: self.api_key.clone(),
            sources,
            queue_capacity: self.queue_capacity,
            poll: self.poll,
            https_proxy: self.https_proxy.clone(),
            hostname: self.hostname.clone(),
            ..Default::default()
        }
    }
}
