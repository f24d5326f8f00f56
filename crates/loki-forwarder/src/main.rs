// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod config;

use config::ForwarderConfig;
use loki_sink::Replacer;
use std::io::Write;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = ForwarderConfig::from_env();
    let log_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);
    let filter = EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    debug!("Logging subsystem enabled");

    let repl = Replacer::new();
    let config = match config.and_then(|c| c.validate(&repl).map(|()| c)) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {}. Shutting down.", e);
            return ExitCode::FAILURE;
        }
    };

    let mut writer = match config.sink.open_writer(&repl) {
        Ok(writer) => writer,
        Err(e) => {
            error!("Unable to start Loki sink: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let sink = writer.sink().clone();
    info!(
        "Forwarding stdin to {} (writer key {})",
        config.sink,
        config.sink.writer_key()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Err(e) = writeln!(writer, "{line}") {
                        error!("Unable to forward line: {}", e);
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Reached end of input");
                    break;
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt, shutting down");
                break;
            }
        }
    }

    let outcome = writer.close().await;
    let stats = sink.stats();
    info!(
        appended = stats.appended,
        delivered = stats.delivered,
        dropped = stats.dropped,
        failed_batches = stats.failed_batches,
        "Loki sink closed"
    );

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            warn!("Final flush failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
