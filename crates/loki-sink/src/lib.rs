// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Loki Sink
//!
//! A log-shipping sink that batches log lines and pushes them to a Loki
//! compatible HTTP endpoint, tagged with a static label set.
//!
//! ## Architecture
//!
//! ```text
//!   producers (io::Write / tracing MakeWriter / append)
//!           │
//!           v
//!   ┌───────────────┐
//!   │    Batcher    │  (mutex-guarded queue, size/age thresholds)
//!   └───────┬───────┘
//!           │ wake-up
//!           v
//!   ┌───────────────┐
//!   │ Flush task    │  (one flush in flight per sink)
//!   └───────┬───────┘
//!           │
//!           v
//!   ┌───────────────┐
//!   │  PushClient   │  (encode, POST, retry with backoff)
//!   └───────┬───────┘
//!           v
//!      Loki endpoint
//! ```
//!
//! - [`batcher`]: line buffer with soft (batch) and hard (capacity) limits
//! - [`client`]: HTTP delivery with status classification and backoff
//! - [`push`]: Loki push API wire format
//! - [`sink`]: owns batcher, client and the background flush task
//! - [`writer`]: `io::Write` face of a sink, handed to host loggers
//! - [`config`], [`placeholder`], [`directive`]: provisioning glue

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batcher;
pub mod client;
pub mod config;
pub mod constants;
pub mod directive;
pub mod entry;
pub mod errors;
pub mod http;
pub mod labels;
pub mod placeholder;
pub mod push;
pub mod sink;
pub mod writer;

pub use config::{ResolvedConfig, SinkConfig};
pub use entry::{Batch, LogEntry};
pub use errors::{AppendError, ConfigError, DeliveryError, SinkError};
pub use labels::{LabelSet, LabelValue};
pub use placeholder::{Placeholders, Replacer};
pub use sink::{LokiSink, SinkStats};
pub use writer::{open_writer, LokiWriter};
