// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Incremental reader for one append-only, line-delimited source.
//!
//! Each call to [`LogTailer::read_new_lines`] picks up where the in-memory
//! cursor left off and returns only lines terminated by `\n`. A trailing
//! fragment without a terminator stays unconsumed and is read again on the
//! next call once the writer finishes it.
//!
//! Rotation and truncation look the same from here: the file got smaller than
//! the cursor. Both reset the cursor to 0; whatever was appended to the old
//! file after the last poll is lost to the pipeline.
//!
//! The cursor is only written to disk by [`LogTailer::save_cursor`], which the
//! orchestrator calls once a batch is fully enqueued.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use crate::cursor::CursorState;
use crate::error::ShipperError;

/// Upper bound on bytes consumed by a single read; the remainder is picked up
/// on the next poll cycle.
pub const MAX_READ_BYTES: u64 = 8 * 1_024 * 1_024;

#[derive(Debug)]
pub struct LogTailer {
    cursor: CursorState,
    max_read_bytes: u64,
}

impl LogTailer {
    /// Creates a tailer for `source_path`, resuming from its sidecar cursor.
    #[must_use]
    pub fn new(source_path: impl AsRef<Path>) -> Self {
        Self {
            cursor: CursorState::load(source_path.as_ref()),
            max_read_bytes: MAX_READ_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_read_bytes(mut self, max_read_bytes: u64) -> Self {
        self.max_read_bytes = max_read_bytes.max(1);
        self
    }

    /// True iff the source file currently exists.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.cursor.source_path().exists()
    }

    #[must_use]
    pub fn source_path(&self) -> &Path {
        self.cursor.source_path()
    }

    /// In-memory offset, which may be ahead of the persisted one.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.cursor.byte_offset
    }

    /// Reads the complete lines appended since the cursor and advances it
    /// past the last one. Empty lines are consumed but not returned.
    ///
    /// A source that disappeared between polls yields no lines.
    pub fn read_new_lines(&mut self) -> Result<Vec<String>, ShipperError> {
        let path = self.cursor.source_path().to_path_buf();
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("TAILER | {} is missing, skipping read", path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(ShipperError::io(&path, e)),
        };

        let size = file
            .metadata()
            .map_err(|e| ShipperError::io(&path, e))?
            .len();
        if size < self.cursor.byte_offset {
            debug!(
                "TAILER | Log rotation detected on {} (size {} < offset {}). Resetting cursor to 0.",
                path.display(),
                size,
                self.cursor.byte_offset
            );
            self.cursor.byte_offset = 0;
        }
        if size == self.cursor.byte_offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.cursor.byte_offset))
            .map_err(|e| ShipperError::io(&path, e))?;
        let mut reader = BufReader::new(file);

        let start = self.cursor.byte_offset;
        let mut offset = start;
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        while offset - start < self.max_read_bytes {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| ShipperError::io(&path, e))?;
            if read == 0 || buf.last() != Some(&b'\n') {
                // EOF, or a fragment the writer has not terminated yet.
                break;
            }
            offset += read as u64;

            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            if !buf.is_empty() {
                lines.push(String::from_utf8_lossy(&buf).into_owned());
            }
        }

        self.cursor.byte_offset = offset;
        debug!(
            "TAILER | Read {} line(s) from {} ({} -> {})",
            lines.len(),
            path.display(),
            start,
            offset
        );
        Ok(lines)
    }

    /// Persists the in-memory offset to the sidecar file.
    pub fn save_cursor(&self) -> Result<(), ShipperError> {
        self.cursor.save()
    }
}
