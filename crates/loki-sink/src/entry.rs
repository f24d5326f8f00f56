// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::labels::LabelSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single log line with its timestamp and labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    timestamp_nanos: u64,
    line: String,
    labels: Arc<LabelSet>,
}

impl LogEntry {
    /// Creates an entry stamped with the current wall-clock time.
    pub fn new(line: impl Into<String>, labels: Arc<LabelSet>) -> Self {
        Self::with_timestamp(now_nanos(), line, labels)
    }

    pub fn with_timestamp(timestamp_nanos: u64, line: impl Into<String>, labels: Arc<LabelSet>) -> Self {
        LogEntry {
            timestamp_nanos,
            line: line.into(),
            labels,
        }
    }

    /// Nanoseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp_nanos(&self) -> u64 {
        self.timestamp_nanos
    }

    #[must_use]
    pub fn line(&self) -> &str {
        &self.line
    }

    #[must_use]
    pub fn labels(&self) -> &Arc<LabelSet> {
        &self.labels
    }

    /// Returns the entry with its timestamp raised to at least `floor`.
    pub(crate) fn not_before(self, floor: u64) -> Self {
        if self.timestamp_nanos >= floor {
            return self;
        }
        LogEntry {
            timestamp_nanos: floor,
            ..self
        }
    }
}

/// Entries shipped together in one push, in append order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    entries: Vec<LogEntry>,
}

impl Batch {
    #[must_use]
    pub fn new(entries: Vec<LogEntry>) -> Self {
        Batch { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
