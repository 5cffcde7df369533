// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host identity enrichment applied by the dispatch worker.

use serde_json::{Map, Value};

pub const HOSTNAME_FIELD: &str = "hostname";

/// Why a raw line was not turned into an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The line is not valid JSON.
    Malformed(String),
    /// Valid JSON, but the top-level value is not an object.
    NotAnObject,
}

/// Adds the `hostname` member to a raw JSON line.
///
/// The line is parsed, must be a JSON object, and is re-serialised with
/// `hostname` as its first member followed by the original members in their
/// original order. A `hostname` already present in the record is replaced.
pub fn enrich(raw_line: &str, hostname: &str) -> Result<String, Rejection> {
    let value: Value =
        serde_json::from_str(raw_line).map_err(|e| Rejection::Malformed(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(Rejection::NotAnObject);
    };

    let mut enriched = Map::with_capacity(fields.len() + 1);
    enriched.insert(
        HOSTNAME_FIELD.to_string(),
        Value::String(hostname.to_string()),
    );
    for (key, value) in fields {
        if key != HOSTNAME_FIELD {
            enriched.insert(key, value);
        }
    }

    Ok(Value::Object(enriched).to_string())
}
