// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod cli;
mod discovery;
mod logger;
mod settings;
mod setup;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crawler_pipeline::{
    DispatchStats, HttpDeliveryClient, Orchestrator, PipelineConfig, ShipperError,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cli::Cli;
use crate::settings::{default_settings_path, Settings, StoredSettings};
use crate::setup::SetupOutcome;

const EXIT_MISSING_API_KEY: u8 = 2;

#[tokio::main]
pub async fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(&cli.log_level());
    debug!("Logging subsystem enabled");

    let settings_path = cli.config.clone().or_else(default_settings_path);
    let stored = settings_path
        .as_deref()
        .map(StoredSettings::load)
        .unwrap_or_default();
    let settings = Settings::resolve(&cli, stored);

    match run(settings, settings_path).await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Runs setup or the self-test when asked to, otherwise ships logs until a
/// shutdown signal.
///
/// Having nothing to tail is not an error: without a log directory, or with
/// no `gpumon_*.log` in it, this prints "No valid logs found. Exiting." and
/// returns success.
async fn run(mut settings: Settings, settings_path: Option<PathBuf>) -> Result<ExitCode> {
    if settings.set_key {
        settings.api_key = None;
    }

    if settings.api_key.is_none() {
        let path = settings_path
            .as_deref()
            .ok_or_else(|| anyhow!("Unable to locate the home directory for the settings file"))?;
        match setup::run(&mut settings, path)? {
            SetupOutcome::MissingApiKey => {
                eprintln!("[ERROR] Empty API key.");
                return Ok(ExitCode::from(EXIT_MISSING_API_KEY));
            }
            SetupOutcome::Saved { self_test } => {
                if settings.set_key {
                    println!("API key saved. Ingestion enabled.");
                    if !self_test {
                        return Ok(ExitCode::SUCCESS);
                    }
                }
                settings.self_test = self_test;
            }
        }
    }

    if settings.self_test {
        let config = settings.pipeline_config(Vec::new());
        // The blocking HTTP client must not be created or dropped on a runtime worker.
        return tokio::task::spawn_blocking(move || self_test::run(&config))
            .await
            .context("Self-test task failed");
    }

    let sources = discovery::configured_sources(settings.log_directory.as_deref());
    if sources.is_empty() {
        eprintln!("No valid logs found. Exiting.");
        return Ok(ExitCode::SUCCESS);
    }
    println!("Monitoring {} gpumon log file(s):", sources.len());
    for source in &sources {
        println!("  - {}", source.display());
    }

    let stats = run_pipeline(settings.pipeline_config(sources)).await?;
    info!(
        "Shut down after dispatching {} event(s), rejected {} line(s)",
        stats.dispatched, stats.rejected
    );
    Ok(ExitCode::SUCCESS)
}

/// Runs the pipeline on its own thread until a shutdown signal arrives or it
/// fails to start.
async fn run_pipeline(config: PipelineConfig) -> Result<DispatchStats> {
    let cancel_token = CancellationToken::new();
    let pipeline_token = cancel_token.clone();
    let (done_tx, mut done_rx) = oneshot::channel::<Result<DispatchStats, ShipperError>>();

    let poller = thread::Builder::new()
        .name("crawler-poller".to_string())
        .spawn(move || {
            let result = Orchestrator::start(&config, HttpDeliveryClient::new(&config))
                .map(|mut orchestrator| orchestrator.run(&pipeline_token));
            let _ = done_tx.send(result);
        })
        .context("Failed to spawn poller thread")?;

    let result = tokio::select! {
        reason = shutdown_signal() => {
            info!("{}, shutting down", reason);
            cancel_token.cancel();
            (&mut done_rx).await
        }
        result = &mut done_rx => result,
    };

    tokio::task::spawn_blocking(move || poller.join())
        .await
        .context("Failed to join poller thread")?
        .map_err(|_| anyhow!("Poller thread panicked"))?;

    result
        .context("Pipeline exited without reporting a result")?
        .context("Pipeline failed")
}

async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => ctrl_c_reason(result),
                    _ = terminate.recv() => "Received SIGTERM",
                }
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                ctrl_c_reason(tokio::signal::ctrl_c().await)
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c_reason(tokio::signal::ctrl_c().await)
    }
}

fn ctrl_c_reason(result: std::io::Result<()>) -> &'static str {
    match result {
        Ok(()) => "Received Ctrl+C",
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            "Signal handling failed"
        }
    }
}
