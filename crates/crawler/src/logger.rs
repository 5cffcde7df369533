// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log output for the agent.
//!
//! Every line is prefixed with `CRAWLER` so agent output can be told apart
//! from the workloads it runs next to:
//!
//! ```text
//! CRAWLER | WARN | Log directory '/var/log/gpumon' does not exist or is not a directory
//! CRAWLER | DEBUG | DELIVERY | Attempt 1/10 failed after 3 ms: server error 503
//! CRAWLER | WARN | source{path=/var/log/gpumon/gpumon_0.log}: TAILER | Failed to save cursor: ...
//! ```

use std::fmt;
use tracing::Level;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields, MakeWriter,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Event formatter producing `CRAWLER | LEVEL | [spans: ]message`.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "CRAWLER | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Level used when no explicit level is configured.
#[must_use]
pub fn default_level(debug: bool) -> Level {
    if debug {
        Level::DEBUG
    } else {
        Level::WARN
    }
}

/// Filter directives silencing the HTTP stack below `level`.
#[must_use]
pub fn filter_directives(level: &str) -> String {
    format!("h2=off,hyper=off,rustls=off,{}", level.to_lowercase())
}

fn subscriber<W>(env_filter: EnvFilter, make_writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(make_writer)
        .event_format(Formatter)
        .finish()
}

/// Installs the global subscriber. An unparsable level falls back to `warn`.
pub fn init(level: &str) {
    let env_filter = EnvFilter::try_new(filter_directives(level)).unwrap_or_else(|e| {
        eprintln!("Invalid log level '{level}': {e}, falling back to warn");
        EnvFilter::new(filter_directives("warn"))
    });

    if let Err(e) = subscriber(env_filter, std::io::stdout).try_init() {
        eprintln!("Failed to install log subscriber: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::{debug_span, warn};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn capture(level: &str, emit: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = subscriber(EnvFilter::new(filter_directives(level)), move || {
            writer.clone()
        });
        let guard = subscriber.set_default();
        emit();
        drop(guard);
        captured.contents()
    }

    #[test]
    fn test_event_without_span() {
        let output = capture("warn", || warn!("No gpumon_*.log files found in /tmp"));
        assert_eq!(output, "CRAWLER | WARN | No gpumon_*.log files found in /tmp\n");
    }

    #[test]
    fn test_source_span_prefixes_event() {
        let output = capture("debug", || {
            let span = debug_span!("source", path = %"/tmp/gpumon_0.log");
            let _entered = span.enter();
            warn!("TAILER | Failed to save cursor: disk full");
        });
        assert_eq!(
            output,
            "CRAWLER | WARN | source{path=/tmp/gpumon_0.log}: TAILER | Failed to save cursor: disk full\n"
        );
    }

    #[test]
    fn test_filtered_level_is_silent() {
        let output = capture("warn", || tracing::debug!("DELIVERY | Retrying in 200 ms"));
        assert!(output.is_empty());
    }

    #[test]
    fn test_default_level() {
        assert_eq!(default_level(true), Level::DEBUG);
        assert_eq!(default_level(false), Level::WARN);
    }

    #[test]
    fn test_filter_directives() {
        assert_eq!(
            filter_directives("DEBUG"),
            "h2=off,hyper=off,rustls=off,debug"
        );
        assert!(EnvFilter::try_new(filter_directives("info")).is_ok());
    }
}
