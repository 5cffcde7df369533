// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Persisted read position of a tailed source.
//!
//! The cursor lives in a sidecar file next to the source (`<source>.cursor`)
//! and holds the byte offset as decimal text. Saves go through
//! `<source>.cursor.tmp` with an fsync before the rename, so a crash leaves
//! either the previous or the new offset on disk, never a torn one.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ShipperError;

pub(crate) const CURSOR_SUFFIX: &str = ".cursor";
const TEMP_SUFFIX: &str = ".tmp";

/// Byte offset consumed so far from one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorState {
    source_path: PathBuf,
    cursor_path: PathBuf,
    pub byte_offset: u64,
}

/// `sourcePath + ".cursor"`, appended to the full file name.
#[must_use]
pub fn cursor_path_for(source_path: &Path) -> PathBuf {
    append_suffix(source_path, CURSOR_SUFFIX)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

impl CursorState {
    /// Loads the cursor for `source_path`.
    ///
    /// A missing sidecar starts at offset 0, which replays the whole file on
    /// first run. Unparsable content is treated the same way.
    #[must_use]
    pub fn load(source_path: &Path) -> Self {
        let cursor_path = cursor_path_for(source_path);
        let byte_offset = match fs::read_to_string(&cursor_path) {
            Ok(content) => match content.trim().parse::<u64>() {
                Ok(offset) => {
                    debug!(
                        "TAILER | Loaded cursor for {}: {}",
                        source_path.display(),
                        offset
                    );
                    offset
                }
                Err(e) => {
                    warn!(
                        "TAILER | Corrupt cursor file {} ({}), starting from offset 0",
                        cursor_path.display(),
                        e
                    );
                    0
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => {
                warn!(
                    "TAILER | Unable to read cursor file {} ({}), starting from offset 0",
                    cursor_path.display(),
                    e
                );
                0
            }
        };

        Self {
            source_path: source_path.to_path_buf(),
            cursor_path,
            byte_offset,
        }
    }

    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    #[must_use]
    pub fn cursor_path(&self) -> &Path {
        &self.cursor_path
    }

    /// Replaces the sidecar with the current offset.
    pub fn save(&self) -> Result<(), ShipperError> {
        let temp_path = append_suffix(&self.cursor_path, TEMP_SUFFIX);

        let mut file =
            File::create(&temp_path).map_err(|e| ShipperError::io(&temp_path, e))?;
        file.write_all(self.byte_offset.to_string().as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| ShipperError::io(&temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &self.cursor_path)
            .map_err(|e| ShipperError::io(&self.cursor_path, e))
    }
}
