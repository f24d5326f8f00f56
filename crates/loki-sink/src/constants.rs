// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Default limits for batching and delivery.
//!
//! These are the values a [`crate::SinkConfig`] starts from when a field is
//! not configured.

use std::time::Duration;

/// Number of buffered entries that makes a batch ready to ship.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1_000;

/// Age of the oldest buffered entry that makes a batch ready to ship.
pub const DEFAULT_MAX_BATCH_AGE: Duration = Duration::from_secs(1);

/// Hard ceiling on buffered entries. Appends beyond this are dropped.
///
/// Sized to absorb several batches while a push is retrying so that a slow
/// backend does not immediately turn into dropped lines.
pub const DEFAULT_MAX_BUFFERED_ENTRIES: usize = 10 * DEFAULT_MAX_BATCH_SIZE;

/// Per-attempt HTTP timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total attempts per batch, first try included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Longest error body kept for diagnostics.
pub(crate) const MAX_ERROR_BODY_CHARS: usize = 1_024;

pub(crate) const USER_AGENT: &str = concat!("loki-sink/", env!("CARGO_PKG_VERSION"));

/// Header carrying the Loki tenant in multi-tenant deployments.
pub(crate) const TENANT_HEADER: &str = "X-Scope-OrgID";
