// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Core of the crawler agent: tails append-only JSON log files, buffers their
//! lines in a bounded queue and ships each one, stamped with the host identity,
//! to an HTTP ingestion backend.
//!
//! Progress through every source is tracked in a `<source>.cursor` sidecar so a
//! restart resumes where the previous run stopped.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod cursor;
pub mod delivery;
pub mod enrich;
pub mod error;
pub mod hostname;
pub mod http;
pub mod orchestrator;
pub mod queue;
pub mod tailer;

pub use config::{PipelineConfig, PollConfig};
pub use delivery::{DeliveryClient, HttpDeliveryClient, RetryPolicy};
pub use error::{DeliveryError, ShipperError};
pub use orchestrator::{DispatchStats, Orchestrator, PipelineState};
pub use queue::BoundedEventQueue;
pub use tailer::LogTailer;
