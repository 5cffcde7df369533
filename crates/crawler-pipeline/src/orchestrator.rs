// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wires tailers, the queue and the dispatch worker together.
//!
//! ```text
//!   poller (calling thread)                    dispatch thread
//!   ┌──────────────────────────┐              ┌────────────────────────┐
//!   │ for tailer in tailers:   │              │ while let Some(line) = │
//!   │   lines = read_new_lines │ ──push──>    │     queue.pop():       │
//!   │   push(lines)            │  [queue]     │   enrich(line, host)   │
//!   │   save_cursor            │    ──pop──>  │   client.send(event)   │
//!   │ sleep(poll schedule)     │              └────────────────────────┘
//!   └──────────────────────────┘
//! ```
//!
//! Shutdown order is fixed: the token is cancelled, the poller finishes its
//! cycle and closes the queue, the dispatch worker drains what is left and is
//! joined, and every cursor is saved one last time.

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, warn};

use crate::config::{PipelineConfig, PollConfig};
use crate::delivery::DeliveryClient;
use crate::enrich::enrich;
use crate::error::ShipperError;
use crate::hostname::resolve_hostname;
use crate::queue::BoundedEventQueue;
use crate::tailer::LogTailer;

const DISPATCH_THREAD_NAME: &str = "crawler-dispatch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// Counters reported by the dispatch worker once it has drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events handed to the delivery client.
    pub dispatched: u64,
    /// Lines dropped because they were not JSON objects.
    pub rejected: u64,
}

/// Sleep durations between poll cycles.
#[derive(Debug)]
struct PollSchedule {
    config: PollConfig,
    current: Duration,
}

impl PollSchedule {
    fn new(config: PollConfig) -> Self {
        Self {
            config,
            current: config.active_interval,
        }
    }

    fn next_sleep(&mut self, produced: bool) -> Duration {
        if produced {
            self.current = self.config.active_interval;
            return self.current;
        }
        match self.config.adaptive_backoff {
            Some(factor) => {
                let idle = self.config.idle_interval;
                self.current =
                    Duration::try_from_secs_f64(self.current.as_secs_f64() * factor)
                        .map_or(idle, |grown| grown.min(idle));
                self.current
            }
            None => self.config.idle_interval,
        }
    }
}

/// One run of the shipping pipeline.
pub struct Orchestrator {
    tailers: Vec<LogTailer>,
    queue: Arc<BoundedEventQueue<String>>,
    dispatcher: Option<JoinHandle<DispatchStats>>,
    schedule: PollSchedule,
    state: PipelineState,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("sources", &self.tailers.len())
            .field("queued", &self.queue.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Builds a tailer per existing source and spawns the dispatch worker.
    ///
    /// Sources that do not exist are skipped. Fails when the configuration is
    /// invalid or no source is usable.
    pub fn start<C>(config: &PipelineConfig, client: C) -> Result<Self, ShipperError>
    where
        C: DeliveryClient + 'static,
    {
        config.validate()?;

        let tailers: Vec<LogTailer> = config
            .sources
            .iter()
            .map(LogTailer::new)
            .filter(|tailer| {
                let valid = tailer.is_valid();
                if !valid {
                    debug!(
                        "TAILER | Skipping missing source {}",
                        tailer.source_path().display()
                    );
                }
                valid
            })
            .collect();
        if tailers.is_empty() {
            return Err(ShipperError::NoSources);
        }

        let queue = Arc::new(BoundedEventQueue::new(config.queue_capacity));
        let hostname = resolve_hostname(config.hostname.as_deref());
        debug!(
            "PIPELINE | Starting with {} source(s), queue capacity {}, hostname '{}'",
            tailers.len(),
            config.queue_capacity,
            hostname
        );

        let worker_queue = Arc::clone(&queue);
        let dispatcher = thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || dispatch_loop(&worker_queue, &client, &hostname))
            .map_err(|source| ShipperError::Spawn {
                name: DISPATCH_THREAD_NAME,
                source,
            })?;

        Ok(Self {
            tailers,
            queue,
            dispatcher: Some(dispatcher),
            schedule: PollSchedule::new(config.poll),
            state: PipelineState::Starting,
        })
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Sources being tailed, in round-robin order.
    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.tailers.iter().map(LogTailer::source_path)
    }

    /// Runs the poller on the calling thread until `token` is cancelled, then
    /// drains and stops the pipeline.
    ///
    /// Cancellation is observed at cycle boundaries only; a sleep or read in
    /// progress completes first.
    pub fn run(&mut self, token: &CancellationToken) -> DispatchStats {
        if self.state == PipelineState::Starting {
            self.state = PipelineState::Running;
        }

        while self.state == PipelineState::Running && !token.is_cancelled() {
            let produced = self.poll_once();
            if token.is_cancelled() {
                break;
            }
            thread::sleep(self.schedule.next_sleep(produced));
        }

        self.shutdown()
    }

    /// One round-robin pass over every tailer. Returns whether any tailer
    /// produced lines.
    fn poll_once(&mut self) -> bool {
        let queue = &self.queue;
        let mut produced = false;

        for tailer in &mut self.tailers {
            let span = debug_span!("source", path = %tailer.source_path().display());
            let _entered = span.enter();

            let lines = match tailer.read_new_lines() {
                Ok(lines) => lines,
                Err(e) => {
                    warn!("TAILER | Failed to read: {}", e);
                    continue;
                }
            };
            if lines.is_empty() {
                continue;
            }
            produced = true;

            if !lines.into_iter().all(|line| queue.push(line)) {
                debug!(
                    "QUEUE | Closed while enqueuing from {}, cursor not saved",
                    tailer.source_path().display()
                );
                continue;
            }
            if let Err(e) = tailer.save_cursor() {
                warn!("TAILER | Failed to save cursor: {}", e);
            }
        }

        produced
    }

    /// Closes the queue, joins the dispatch worker and saves every cursor.
    /// Calling it again after the pipeline stopped returns empty stats.
    pub fn shutdown(&mut self) -> DispatchStats {
        let Some(dispatcher) = self.dispatcher.take() else {
            return DispatchStats::default();
        };

        self.state = PipelineState::Draining;
        debug!(
            "PIPELINE | Draining {} queued line(s)",
            self.queue.len()
        );
        self.queue.close();

        let stats = match dispatcher.join() {
            Ok(stats) => stats,
            Err(_) => {
                error!("PIPELINE | Dispatch worker panicked");
                DispatchStats::default()
            }
        };

        for tailer in &self.tailers {
            if let Err(e) = tailer.save_cursor() {
                warn!("TAILER | Failed to save cursor on shutdown: {}", e);
            }
        }

        self.state = PipelineState::Stopped;
        debug!(
            "PIPELINE | Stopped after dispatching {} event(s), rejected {} line(s)",
            stats.dispatched, stats.rejected
        );
        stats
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(
    queue: &BoundedEventQueue<String>,
    client: &dyn DeliveryClient,
    hostname: &str,
) -> DispatchStats {
    let mut stats = DispatchStats::default();
    while let Some(line) = queue.pop() {
        match enrich(&line, hostname) {
            Ok(event) => {
                client.send(&event);
                stats.dispatched += 1;
            }
            Err(rejection) => {
                debug!("PIPELINE | Dropping line: {:?}", rejection);
                stats.rejected += 1;
            }
        }
    }
    stats
}
