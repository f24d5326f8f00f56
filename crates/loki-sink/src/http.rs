// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction.
//!
//! Each sink builds its own `reqwest::Client`, so connection pools and
//! backoff state are never shared between destinations.

use crate::constants::USER_AGENT;
use core::time::Duration;
use tracing::error;

/// Options that shape the underlying `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// HTTPS proxy URL.
    pub https_proxy: Option<String>,
}

/// Builds a client honoring the proxy setting.
///
/// An unusable proxy is logged and a direct client is returned instead, so a
/// bad proxy value never keeps the host from starting.
pub fn get_client(options: &ClientOptions) -> Result<reqwest::Client, reqwest::Error> {
    match build_client(options, true) {
        Ok(client) => Ok(client),
        Err(e) => {
            error!(
                "Unable to use proxy configuration: {}, falling back to direct connection",
                e
            );
            build_client(options, false)
        }
    }
}

fn build_client(options: &ClientOptions, allow_proxy: bool) -> Result<reqwest::Client, reqwest::Error> {
    let mut client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(options.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &options.https_proxy {
            client = client.proxy(reqwest::Proxy::https(https_uri.as_str())?);
        }
    }

    client.build()
}
