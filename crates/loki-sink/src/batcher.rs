// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line buffer that groups log entries into batches.
//!
//! # Batching Strategy
//!
//! A batch becomes ready when either limit is reached:
//! 1. **Count limit**: `max_batch_size` entries are buffered
//! 2. **Age limit**: the oldest buffered entry is `max_batch_age` old
//!
//! Explicit flushes and close drain the buffer regardless of readiness.
//!
//! # Memory Management
//!
//! The buffer holds at most `max_buffered_entries`. Once full, new entries
//! are rejected with [`AppendError::BufferFull`] and counted, so that entries
//! already waiting for delivery are never evicted (drop-newest).
//!
//! # Locking
//!
//! All state sits behind one `std::sync::Mutex` held only for the push,
//! threshold check, or batch swap. No I/O ever happens under it.

use crate::entry::{Batch, LogEntry};
use crate::errors::AppendError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// What an accepted append means for the flush schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    /// The buffer was empty: a new age window starts with this entry.
    Started,
    /// Buffered below every threshold.
    Buffered,
    /// The count limit is reached; a flush should run now.
    Ready,
}

#[derive(Debug)]
struct Pending {
    buffered_at: Instant,
    entry: LogEntry,
}

#[derive(Debug, Default)]
struct State {
    entries: VecDeque<Pending>,
    /// Timestamp of the newest accepted entry; later entries never go below it.
    last_timestamp: u64,
    /// Entries rejected since the last [`Batcher::take_dropped`].
    dropped: u64,
    /// Set by [`Batcher::close`]; later appends are refused.
    closed: bool,
}

#[derive(Debug)]
pub struct Batcher {
    state: Mutex<State>,
    max_batch_size: usize,
    max_batch_age: Duration,
    max_buffered_entries: usize,
}

impl Batcher {
    /// Limits are expected to be validated by [`crate::SinkConfig::validate`];
    /// zero sizes are raised to one so the buffer always makes progress.
    #[must_use]
    pub fn new(max_batch_size: usize, max_batch_age: Duration, max_buffered_entries: usize) -> Self {
        let max_batch_size = max_batch_size.max(1);
        Batcher {
            state: Mutex::new(State::default()),
            max_batch_size,
            max_batch_age,
            max_buffered_entries: max_buffered_entries.max(max_batch_size),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking producer cannot leave the queue half-updated, so the
        // data is still consistent after poisoning.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, entry: LogEntry) -> Result<Appended, AppendError> {
        let mut state = self.lock();

        if state.closed {
            return Err(AppendError::Closed);
        }
        if state.entries.len() >= self.max_buffered_entries {
            state.dropped += 1;
            return Err(AppendError::BufferFull {
                capacity: self.max_buffered_entries,
            });
        }

        let entry = entry.not_before(state.last_timestamp);
        state.last_timestamp = entry.timestamp_nanos();
        state.entries.push_back(Pending {
            buffered_at: Instant::now(),
            entry,
        });

        let len = state.entries.len();
        Ok(if len >= self.max_batch_size {
            Appended::Ready
        } else if len == 1 {
            Appended::Started
        } else {
            Appended::Buffered
        })
    }

    /// Removes up to `max_batch_size` of the oldest entries.
    pub fn take_batch(&self) -> Option<Batch> {
        let mut state = self.lock();
        if state.entries.is_empty() {
            return None;
        }
        let count = state.entries.len().min(self.max_batch_size);
        let entries = state
            .entries
            .drain(..count)
            .map(|pending| pending.entry)
            .collect();
        Some(Batch::new(entries))
    }

    /// When the oldest buffered entry reaches `max_batch_age`, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock()
            .entries
            .front()
            .map(|pending| pending.buffered_at + self.max_batch_age)
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        let state = self.lock();
        if state.entries.len() >= self.max_batch_size {
            return true;
        }
        state
            .entries
            .front()
            .is_some_and(|pending| now.duration_since(pending.buffered_at) >= self.max_batch_age)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Refuses every later append. Entries already buffered stay available
    /// to [`Batcher::take_batch`]. Returns false if already closed.
    pub fn close(&self) -> bool {
        !std::mem::replace(&mut self.lock().closed, true)
    }

    /// Discards every buffered entry, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let discarded = state.entries.len();
        state.entries.clear();
        discarded
    }

    /// Returns and resets the count of entries rejected for capacity.
    pub fn take_dropped(&self) -> u64 {
        std::mem::take(&mut self.lock().dropped)
    }

    #[must_use]
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    #[must_use]
    pub fn max_batch_age(&self) -> Duration {
        self.max_batch_age
    }
}
