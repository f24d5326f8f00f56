// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use loki_sink::directive;
use loki_sink::errors::{ConfigError, ParseError};
use loki_sink::{LabelSet, LabelValue, Placeholders, SinkConfig};
use std::env;
use std::path::PathBuf;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse sink directive: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid sink configuration: {0}")]
    Sink(#[from] ConfigError),
}

/// Process configuration, read from the environment.
///
/// - `LOKI_CONFIG`: path to a file holding a `loki` directive; takes
///   precedence over the variables below
/// - `LOKI_ENDPOINT`: push URL, placeholders allowed
/// - `LOKI_LABELS`: comma separated `name=value` pairs
/// - `LOKI_TENANT`, `LOKI_PROXY_HTTPS` (or `HTTPS_PROXY`)
/// - `LOKI_LOG_LEVEL`: diagnostics verbosity, `info` by default
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub sink: SinkConfig,
    pub log_level: String,
}

impl ForwarderConfig {
    pub fn from_env() -> Result<Self, ForwarderError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ForwarderError> {
        let mut sink = match lookup("LOKI_CONFIG").filter(|p| !p.trim().is_empty()) {
            Some(path) => {
                let path = PathBuf::from(path);
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ForwarderError::ReadConfig { path, source })?;
                directive::parse(&text)?
            }
            None => {
                let endpoint = lookup("LOKI_ENDPOINT").unwrap_or_default();
                let labels = match lookup("LOKI_LABELS") {
                    Some(raw) => parse_labels(&raw)?,
                    None => LabelSet::new(),
                };
                SinkConfig::new(endpoint, labels)
            }
        };

        if let Some(tenant) = lookup("LOKI_TENANT").filter(|t| !t.is_empty()) {
            sink.tenant = Some(tenant);
        }
        if let Some(proxy) = lookup("LOKI_PROXY_HTTPS").or_else(|| lookup("HTTPS_PROXY")) {
            sink.https_proxy = Some(proxy);
        }

        let log_level = lookup("LOKI_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|| "info".to_string());

        Ok(ForwarderConfig { sink, log_level })
    }

    pub fn validate(&self, repl: &impl Placeholders) -> Result<(), ForwarderError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ForwarderError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }
        self.sink.validate(repl)?;
        Ok(())
    }
}

/// Parses `env=prod,shard=3`. Values are typed like directive values.
fn parse_labels(raw: &str) -> Result<LabelSet, ForwarderError> {
    let mut labels = LabelSet::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(ForwarderError::InvalidConfig(format!(
                "label '{pair}' must be written as name=value"
            )));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(ForwarderError::InvalidConfig(format!(
                "label '{pair}' has an empty name"
            )));
        }
        labels.insert(name, LabelValue::from_scalar(value.trim()));
    }
    Ok(labels)
}
