// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Interactive first-run setup.

use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password};
use std::path::{Path, PathBuf};

use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Settings were stored; `self_test` is set when the user asked for one.
    Saved { self_test: bool },
    /// No API key was entered.
    MissingApiKey,
}

/// Raw answers collected by the prompts.
#[derive(Debug, Clone, Default)]
pub struct Answers {
    pub api_key: Option<String>,
    pub backend_url: String,
    pub log_directory: Option<String>,
}

/// Merges `answers` into `settings`. Fails when no API key is known.
pub fn apply_answers(settings: &mut Settings, answers: Answers) -> Result<(), SetupOutcome> {
    if let Some(key) = answers.api_key.map(|k| k.trim().to_string()) {
        settings.api_key = Some(key).filter(|k| !k.is_empty());
    }
    if settings.api_key.is_none() {
        return Err(SetupOutcome::MissingApiKey);
    }

    let backend_url = answers.backend_url.trim();
    if !backend_url.is_empty() {
        settings.backend_url = backend_url.to_string();
    }
    if let Some(dir) = answers.log_directory.map(|d| d.trim().to_string()) {
        if !dir.is_empty() {
            settings.log_directory = Some(PathBuf::from(dir));
        }
    }
    Ok(())
}

fn prompt(settings: &Settings) -> Result<Answers> {
    let theme = ColorfulTheme::default();

    println!("Welcome to GPU Crawler.\n");
    println!("Your backend requires an API key for ingestion.");

    let api_key = if settings.api_key.is_none() {
        println!("Paste your API key. It is stored locally for future runs.");
        Some(
            Password::with_theme(&theme)
                .with_prompt("API key")
                .allow_empty_password(true)
                .interact()?,
        )
    } else {
        println!("Using existing API key from environment or settings file.");
        None
    };

    let backend_url = Input::<String>::with_theme(&theme)
        .with_prompt("Backend URL")
        .default(settings.backend_url.clone())
        .interact_text()?;

    let log_directory = if settings.log_directory.is_none() {
        println!("Directory where gpumon_*.log files are written (leave empty to skip).");
        Some(
            Input::<String>::with_theme(&theme)
                .with_prompt("Log directory")
                .allow_empty(true)
                .interact_text()?,
        )
    } else {
        None
    };

    Ok(Answers {
        api_key,
        backend_url,
        log_directory,
    })
}

/// Prompts for missing settings and stores them at `path`.
pub fn run(settings: &mut Settings, path: &Path) -> Result<SetupOutcome> {
    let answers = prompt(settings)?;
    if let Err(outcome) = apply_answers(settings, answers) {
        return Ok(outcome);
    }

    println!(
        "\nMetrics will be sent to {}/metrics with header X-API-Key: <YOUR_KEY>",
        settings.backend_url.trim_end_matches('/')
    );
    if let Some(dir) = &settings.log_directory {
        println!("Reading gpumon logs from {}", dir.display());
    }

    settings.stored().save(path)?;
    println!("Settings saved to {}", path.display());

    let self_test = settings.self_test
        || Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Send a minimal sample metric now as a self-test?")
            .default(true)
            .interact()?;

    Ok(SetupOutcome::Saved { self_test })
}
