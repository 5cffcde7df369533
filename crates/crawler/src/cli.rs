// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use std::path::PathBuf;

/// Ships gpumon JSON log lines to the ingestion backend.
///
/// Every option can also be set through the environment variable shown next
/// to it. Command-line values take precedence over the environment, which
/// takes precedence over the settings file.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "crawler", version, about)]
pub struct Cli {
    /// Base URL of the ingestion backend
    #[arg(long, env = "GPU_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// API key sent as X-API-Key
    #[arg(long, env = "GPU_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Directory scanned for gpumon_*.log files
    #[arg(long, env = "GPUMON_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Settings file [default: ~/.gpu-crawler/config.json]
    #[arg(long, env = "GPUMON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Send one sample metric and exit
    #[arg(long)]
    pub self_test: bool,

    /// Prompt for a new API key and store it
    #[arg(long)]
    pub set_key: bool,

    /// Verbose logging ("1" or "true" enables it)
    #[arg(
        long,
        env = "GPUMON_DEBUG",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub debug: Option<String>,

    /// Queue capacity; 0 or negative is unbounded
    #[arg(long, env = "GPUMON_QUEUE_CAPACITY", allow_hyphen_values = true)]
    pub queue_capacity: Option<String>,

    /// Poll interval in milliseconds after a cycle that read data
    #[arg(long, env = "GPUMON_POLL_ACTIVE_MS")]
    pub poll_active_ms: Option<String>,

    /// Poll interval in milliseconds after an idle cycle
    #[arg(long, env = "GPUMON_POLL_IDLE_MS")]
    pub poll_idle_ms: Option<String>,

    /// Grow idle sleeps by this factor up to the idle interval
    #[arg(long, env = "GPUMON_POLL_BACKOFF")]
    pub poll_backoff: Option<String>,

    /// Hostname stamped onto events
    #[arg(long, env = "GPUMON_HOSTNAME")]
    pub hostname: Option<String>,

    /// Proxy used for HTTPS delivery
    #[arg(long, env = "HTTPS_PROXY")]
    pub https_proxy: Option<String>,

    /// Log level filter (overrides --debug)
    #[arg(long, env = "GPUMON_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// `"1"` and `"true"` (any case) are on; everything else is off.
#[must_use]
pub fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        let v = v.trim();
        v == "1" || v.eq_ignore_ascii_case("true")
    })
}

impl Cli {
    #[must_use]
    pub fn debug_enabled(&self) -> bool {
        parse_flag(self.debug.as_deref())
    }

    /// Level for the log filter: `--log-level`, else derived from `--debug`.
    #[must_use]
    pub fn log_level(&self) -> String {
        self.log_level
            .as_deref()
            .map(str::trim)
            .filter(|level| !level.is_empty())
            .map_or_else(
                || crate::logger::default_level(self.debug_enabled()).to_string(),
                str::to_string,
            )
    }
}
