// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Blocking HTTP client used by the delivery worker.

use reqwest::blocking::{Client, ClientBuilder};
use std::error::Error;
use std::time::Duration;
use tracing::error;

use crate::config::PipelineConfig;

const USER_AGENT: &str = concat!("crawler/", env!("CARGO_PKG_VERSION"));

/// Builds the delivery client from the pipeline settings.
///
/// An unusable proxy setting is logged and the client falls back to a direct
/// connection, so delivery keeps working with a misconfigured proxy.
#[must_use]
pub fn get_client(config: &PipelineConfig) -> Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    Client::new()
                }
            }
        }
    }
}

fn build_client(config: &PipelineConfig, allow_proxy: bool) -> Result<Client, Box<dyn Error>> {
    let mut builder = ClientBuilder::new()
        .user_agent(USER_AGENT)
        .timeout(config.request_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            builder = builder.proxy(reqwest::Proxy::https(https_uri.as_str())?);
        }
    }

    Ok(builder.build()?)
}
