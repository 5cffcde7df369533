// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SOURCE_PREFIX: &str = "gpumon_";
const SOURCE_EXTENSION: &str = "log";

fn is_source_name(path: &Path) -> bool {
    let has_prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(SOURCE_PREFIX));
    has_prefix && path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION)
}

/// Lists the `gpumon_*.log` files directly inside `dir`, sorted by path.
///
/// A missing directory or one without matches yields an empty list and a
/// warning.
#[must_use]
pub fn discover_sources(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        warn!(
            "Log directory '{}' does not exist or is not a directory",
            dir.display()
        );
        return Vec::new();
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to scan log directory '{}': {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut sources: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_source_name(path))
        .collect();
    sources.sort();

    if sources.is_empty() {
        warn!("No gpumon_*.log files found in {}", dir.display());
    } else {
        debug!("Discovered {} source(s) in {}", sources.len(), dir.display());
    }
    sources
}

/// Sources under the configured log directory, or none with a warning when
/// no directory is configured.
#[must_use]
pub fn configured_sources(log_directory: Option<&Path>) -> Vec<PathBuf> {
    match log_directory {
        Some(dir) => discover_sources(dir),
        None => {
            warn!("No log directory configured. Set GPUMON_LOG_DIR, pass --log-dir or add logDirectory to the settings file.");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_only_gpumon_logs_are_discovered() {
        let dir = TempDir::new().unwrap();
        for name in [
            "gpumon_2.log",
            "gpumon_1.log",
            "gpumon_1.log.cursor",
            "gpumon_3.txt",
            "other.log",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("gpumon_dir.log")).unwrap();

        assert_eq!(
            discover_sources(dir.path()),
            vec![dir.path().join("gpumon_1.log"), dir.path().join("gpumon_2.log")]
        );
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        assert!(discover_sources(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(discover_sources(dir.path()).is_empty());
    }

    #[test]
    fn test_no_configured_directory() {
        assert!(configured_sources(None).is_empty());
    }

    #[test]
    fn test_configured_directory_is_scanned() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("gpumon_0.log"), "").unwrap();
        assert_eq!(
            configured_sources(Some(dir.path())),
            vec![dir.path().join("gpumon_0.log")]
        );
    }
}
