// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host identity used to enrich every event.

use std::env;
use tracing::warn;

/// Environment override for the reported hostname.
pub const HOSTNAME_ENV: &str = "GPUMON_HOSTNAME";

const FALLBACK_HOSTNAME: &str = "unknown";

/// Resolves the hostname stamped onto events.
///
/// Order: explicit `configured` value, `GPUMON_HOSTNAME`, `HOSTNAME`, the
/// system hostname, then `"unknown"`. Empty values are skipped at every step.
#[must_use]
pub fn resolve_hostname(configured: Option<&str>) -> String {
    if let Some(hostname) = configured.filter(|h| !h.is_empty()) {
        return hostname.to_string();
    }

    for var in [HOSTNAME_ENV, "HOSTNAME"] {
        if let Ok(hostname) = env::var(var) {
            if !hostname.is_empty() {
                return hostname;
            }
        }
    }

    if let Some(hostname) = system_hostname() {
        return hostname;
    }

    warn!("Could not determine hostname, using '{}'", FALLBACK_HOSTNAME);
    FALLBACK_HOSTNAME.to_string()
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(hostname) => hostname
            .to_str()
            .filter(|h| !h.is_empty())
            .map(str::to_string),
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
            None
        }
    }
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    env::var("COMPUTERNAME").ok().filter(|h| !h.is_empty())
}
