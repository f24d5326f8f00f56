// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types.
//!
//! Provisioning failures ([`ConfigError`], [`ParseError`]) are fatal and
//! surface to the operator. Runtime failures ([`AppendError`],
//! [`DeliveryError`]) are contained by the sink: producers writing through a
//! [`crate::LokiWriter`] never see them.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Placeholder substitution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
    #[error("unrecognized placeholder {{{0}}}")]
    Unknown(String),

    #[error("evaluated placeholder {{{0}}} is empty")]
    Empty(String),
}

/// Validation failures for a [`crate::SinkConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("endpoint url is required")]
    EmptyEndpoint,

    #[error("invalid endpoint placeholders: {0}")]
    InvalidEndpointPlaceholders(#[source] PlaceholderError),

    #[error("invalid endpoint url: {0}")]
    InvalidEndpointUrl(String),

    #[error("invalid label value placeholder for label `{label}`: {source}")]
    InvalidLabelValReplacement {
        label: String,
        #[source]
        source: PlaceholderError,
    },

    #[error("invalid batching limits: {0}")]
    InvalidLimits(String),
}

/// Syntax errors in a `loki` directive block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no `loki` directive found")]
    Empty,

    #[error("line {line}: expected directive `loki`, found `{found}`")]
    UnexpectedDirective { line: usize, found: String },

    #[error("line {line}: missing argument for `{directive}`")]
    MissingArgument { line: usize, directive: String },

    #[error("line {line}: unexpected token `{token}`")]
    UnexpectedToken { line: usize, token: String },

    #[error("line {line}: unknown subdirective `{name}`")]
    UnknownSubdirective { line: usize, name: String },

    #[error("line {line}: invalid value `{value}` for `{directive}`")]
    InvalidValue {
        line: usize,
        directive: String,
        value: String,
    },

    #[error("unclosed block opened on line {line}")]
    UnclosedBlock { line: usize },

    #[error("line {line}: unterminated quoted string")]
    UnterminatedQuote { line: usize },
}

/// Failures of [`crate::batcher::Batcher::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppendError {
    #[error("buffer full ({capacity} entries), entry dropped")]
    BufferFull { capacity: usize },

    #[error("buffer closed, entry refused")]
    Closed,
}

/// The cause of one failed push attempt.
#[derive(Debug, Error)]
pub enum PushFailure {
    #[error("status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome of a batch that could not be delivered. The batch is dropped.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The backend refused the payload; retrying would not help.
    #[error("push rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    /// Every attempt failed with a retryable cause.
    #[error("delivery failed after {attempts} attempts: {cause}")]
    Failed {
        attempts: u32,
        #[source]
        cause: PushFailure,
    },

    #[error("failed to encode push payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to compress push payload: {0}")]
    Compress(#[from] std::io::Error),
}

impl DeliveryError {
    /// True for errors that retrying the same payload cannot fix.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !matches!(self, DeliveryError::Failed { .. })
    }
}

/// Umbrella error for sink construction and operation.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Append(#[from] AppendError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("sink is closed")]
    Closed,

    #[error("sink requires a Tokio runtime: {0}")]
    NoRuntime(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
