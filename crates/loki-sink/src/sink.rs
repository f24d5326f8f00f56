// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A sink bound to one Loki endpoint and one label set.
//!
//! # Lifecycle
//!
//! ```text
//!   new ──> append* ──> flush* ──> close
//!            │                      │
//!            └─ wake ─> flush task ─┘ (stopped, then final flush)
//! ```
//!
//! Producers only touch the batcher. A background task, spawned on the
//! Tokio runtime that created the sink, ships batches once they are ready.
//! At most one flush runs at a time per sink; it drains batches in the order
//! they formed.

use crate::batcher::{Appended, Batcher};
use crate::client::PushClient;
use crate::config::ResolvedConfig;
use crate::entry::LogEntry;
use crate::errors::{AppendError, DeliveryError, SinkError};
use crate::labels::LabelSet;
use reqwest::Url;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Counters describing what happened to appended entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Entries accepted into the buffer.
    pub appended: u64,
    /// Entries currently waiting for delivery.
    pub buffered: usize,
    /// Entries lost: buffer full, batch rejected or failed, or left at close.
    pub dropped: u64,
    /// Entries the backend acknowledged.
    pub delivered: u64,
    /// Batches that could not be delivered.
    pub failed_batches: u64,
}

#[derive(Debug, Default)]
struct Counters {
    appended: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed_batches: AtomicU64,
}

#[derive(Debug)]
struct Inner {
    labels: Arc<LabelSet>,
    batcher: Batcher,
    client: PushClient,
    flush_lock: tokio::sync::Mutex<()>,
    wake: Arc<Notify>,
    closed: AtomicBool,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    counters: Counters,
}

/// Handle to a running sink. Clones share the same buffer and flush task.
#[derive(Debug, Clone)]
pub struct LokiSink {
    inner: Arc<Inner>,
}

impl LokiSink {
    /// Builds the HTTP client and starts the flush task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ResolvedConfig) -> Result<Self, SinkError> {
        let runtime = Handle::try_current().map_err(|e| SinkError::NoRuntime(e.to_string()))?;
        let client = PushClient::new(&config.endpoint, config.push).map_err(SinkError::Client)?;

        let inner = Arc::new(Inner {
            labels: Arc::new(config.labels),
            batcher: Batcher::new(
                config.max_batch_size,
                config.max_batch_age,
                config.max_buffered_entries,
            ),
            client,
            flush_lock: tokio::sync::Mutex::new(()),
            wake: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            counters: Counters::default(),
        });

        let handle = runtime.spawn(run(
            Arc::downgrade(&inner),
            inner.cancel.clone(),
            Arc::clone(&inner.wake),
        ));
        *inner.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        debug!(
            "LOKI | Sink started for {} (batch size {}, batch age {:?})",
            inner.client.url(),
            inner.batcher.max_batch_size(),
            inner.batcher.max_batch_age()
        );
        Ok(LokiSink { inner })
    }

    /// Request URL, credentials removed.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        self.inner.client.url()
    }

    #[must_use]
    pub fn labels(&self) -> &Arc<LabelSet> {
        &self.inner.labels
    }

    /// Buffers an entry. Never waits on the network.
    pub fn append(&self, entry: LogEntry) -> Result<(), SinkError> {
        let inner = &self.inner;
        match inner.batcher.append(entry) {
            Ok(appended) => {
                inner.counters.appended.fetch_add(1, Ordering::Relaxed);
                if appended != Appended::Buffered {
                    inner.wake.notify_one();
                }
                Ok(())
            }
            Err(AppendError::Closed) => Err(SinkError::Closed),
            Err(e) => {
                inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
                inner.wake.notify_one();
                Err(e.into())
            }
        }
    }

    /// Buffers a line stamped now, carrying the sink's labels.
    pub fn append_line(&self, line: impl Into<String>) -> Result<(), SinkError> {
        self.append(LogEntry::new(line, Arc::clone(&self.inner.labels)))
    }

    /// Delivers everything buffered so far, waiting for the outcome.
    ///
    /// A rejected batch is dropped and the next one is tried. A batch that
    /// exhausts its retries is dropped and draining stops, leaving the rest
    /// for a later flush. The first error met is returned.
    pub async fn flush(&self) -> Result<(), SinkError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.inner.drain(false).await.map_err(SinkError::from)
    }

    /// Stops the flush task, performs a final flush and discards whatever
    /// could not be delivered. Later calls return `Ok(())` immediately.
    pub async fn close(&self) -> Result<(), SinkError> {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Under the buffer lock, so no append lands after the final drain.
        inner.batcher.close();

        inner.cancel.cancel();
        let handle = inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!("LOKI | Flush task ended abnormally: {}", e);
            }
        }

        let result = inner.drain(false).await;

        let discarded = inner.batcher.clear();
        if discarded > 0 {
            inner
                .counters
                .dropped
                .fetch_add(discarded as u64, Ordering::Relaxed);
            warn!(
                "LOKI | Discarded {} undelivered entries on close",
                discarded
            );
        }
        inner.report_dropped();
        debug!("LOKI | Sink closed: {:?}", self.stats());

        result.map_err(SinkError::from)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> SinkStats {
        let counters = &self.inner.counters;
        SinkStats {
            appended: counters.appended.load(Ordering::Relaxed),
            buffered: self.inner.batcher.len(),
            dropped: counters.dropped.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed_batches: counters.failed_batches.load(Ordering::Relaxed),
        }
    }

    /// Wakes the flush task without waiting for it.
    pub(crate) fn notify(&self) {
        self.inner.wake.notify_one();
    }

    #[cfg(test)]
    pub(crate) fn take_batch(&self) -> Option<crate::entry::Batch> {
        self.inner.batcher.take_batch()
    }

    /// Leaves every batch to explicit flushes.
    #[cfg(test)]
    #[allow(clippy::unwrap_used)]
    pub(crate) async fn stop_flush_task(&self) {
        self.inner.cancel.cancel();
        let handle = self.inner.task.lock().unwrap().take();
        handle.unwrap().await.unwrap();
    }
}

impl Inner {
    /// Ships batches until the buffer is drained, a batch exhausts its
    /// retries, or (with `ready_only`) no batch is ready any more.
    ///
    /// Only entries buffered when the drain starts are considered, so
    /// concurrent producers cannot keep it running.
    async fn drain(&self, ready_only: bool) -> Result<(), DeliveryError> {
        let _guard = self.flush_lock.lock().await;
        let mut remaining = self.batcher.len();
        let mut first_error = None;

        while remaining > 0 {
            if ready_only && !self.batcher.is_ready(Instant::now()) {
                break;
            }
            let Some(batch) = self.batcher.take_batch() else {
                break;
            };
            remaining = remaining.saturating_sub(batch.len());

            match self.client.push(&batch).await {
                Ok(()) => {
                    self.counters
                        .delivered
                        .fetch_add(batch.len() as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .dropped
                        .fetch_add(batch.len() as u64, Ordering::Relaxed);
                    warn!("LOKI | Dropped batch of {} entries: {}", batch.len(), e);

                    let permanent = e.is_permanent();
                    first_error.get_or_insert(e);
                    if !permanent {
                        break;
                    }
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn report_dropped(&self) {
        let dropped = self.batcher.take_dropped();
        if dropped > 0 {
            warn!(
                "LOKI | Buffer full, dropped {} entries since last report",
                dropped
            );
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Flush task. Holds only a weak reference between wake-ups so that
/// dropping every handle stops it.
async fn run(inner: Weak<Inner>, cancel: CancellationToken, wake: Arc<Notify>) {
    loop {
        let deadline = match inner.upgrade() {
            Some(sink) => sink.batcher.next_deadline(),
            None => return,
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = wake.notified() => {}
            () = sleep_until(deadline) => {}
        }

        let Some(sink) = inner.upgrade() else {
            return;
        };
        sink.report_dropped();
        if sink.batcher.is_ready(Instant::now()) {
            // Failures are logged per batch by the drain
            let _ = sink.drain(true).await;
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::client::{PushOptions, RetryPolicy};
    use crate::labels::LabelValue;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn unreachable_config() -> ResolvedConfig {
        ResolvedConfig {
            max_batch_size: 100,
            max_batch_age: Duration::from_secs(3_600),
            max_buffered_entries: 100,
            push: PushOptions {
                timeout: Duration::from_millis(500),
                retry: RetryPolicy {
                    max_attempts: 1,
                    ..RetryPolicy::default()
                },
                ..PushOptions::default()
            },
            ..ResolvedConfig::new(
                Url::parse("http://127.0.0.1:1/loki/api/v1/push").unwrap(),
                [("env", LabelValue::from("test"))].into_iter().collect(),
            )
        }
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = LokiSink::new(unreachable_config());
        assert!(matches!(result, Err(SinkError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_append_buffers_without_network() {
        let sink = LokiSink::new(unreachable_config()).unwrap();
        sink.append_line("one").unwrap();
        sink.append_line("two").unwrap();

        let stats = sink.stats();
        assert_eq!(stats.appended, 2);
        assert_eq!(stats.buffered, 2);
        assert_eq!(stats.delivered, 0);
        assert_eq!(sink.labels().get("env"), Some(&LabelValue::from("test")));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_appends() {
        let sink = LokiSink::new(unreachable_config()).unwrap();
        assert!(sink.close().await.is_ok());
        assert!(sink.is_closed());
        assert!(sink.close().await.is_ok());
        assert!(matches!(sink.append_line("late"), Err(SinkError::Closed)));
        assert!(sink.flush().await.is_ok());
        assert_eq!(sink.stats(), SinkStats::default());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_close_discards_undeliverable_entries() {
        let sink = LokiSink::new(unreachable_config()).unwrap();
        for line in ["a", "b", "c"] {
            sink.append_line(line).unwrap();
        }

        let result = sink.close().await;
        assert!(matches!(
            result,
            Err(SinkError::Delivery(DeliveryError::Failed { attempts: 1, .. }))
        ));

        let stats = sink.stats();
        assert_eq!(stats.appended, 3);
        assert_eq!(stats.buffered, 0);
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.failed_batches, 1);
        assert!(logs_contain("Dropped batch of 3 entries"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_full_buffer_rejects_and_reports() {
        let sink = LokiSink::new(ResolvedConfig {
            max_batch_size: 2,
            max_buffered_entries: 2,
            ..unreachable_config()
        })
        .unwrap();
        sink.stop_flush_task().await;

        sink.append_line("kept-1").unwrap();
        sink.append_line("kept-2").unwrap();
        assert!(matches!(
            sink.append_line("overflow"),
            Err(SinkError::Append(AppendError::BufferFull { capacity: 2 }))
        ));

        let stats = sink.stats();
        assert_eq!(stats.appended, 2);
        assert_eq!(stats.buffered, 2);
        assert_eq!(stats.dropped, 1);

        sink.inner.report_dropped();
        assert!(logs_contain("Buffer full, dropped 1 entries"));

        let lines: Vec<_> = sink
            .take_batch()
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.line().to_string())
            .collect();
        assert_eq!(lines, vec!["kept-1", "kept-2"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_racing_appends_loses_nothing_uncounted() {
        let sink = LokiSink::new(unreachable_config()).unwrap();

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    let mut rejected_full = 0u64;
                    loop {
                        match sink.append_line("racing") {
                            Ok(()) => {}
                            Err(SinkError::Closed) => return rejected_full,
                            Err(SinkError::Append(_)) => rejected_full += 1,
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = sink.close().await;
        let rejected_full: u64 = producers.into_iter().map(|p| p.join().unwrap()).sum();

        let stats = sink.stats();
        assert_eq!(stats.buffered, 0);
        assert_eq!(
            stats.appended + rejected_full,
            stats.delivered + stats.dropped
        );
        assert!(matches!(sink.append_line("late"), Err(SinkError::Closed)));
    }

    async fn mock_sink(server: &mockito::ServerGuard, max_attempts: u32) -> LokiSink {
        let sink = LokiSink::new(ResolvedConfig {
            max_batch_size: 1,
            push: PushOptions {
                timeout: Duration::from_secs(2),
                retry: RetryPolicy {
                    max_attempts,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(5),
                    factor: 2.0,
                },
                ..PushOptions::default()
            },
            ..ResolvedConfig::new(
                Url::parse(&format!("{}/loki/api/v1/push", server.url())).unwrap(),
                LabelSet::new(),
            )
        })
        .unwrap();
        sink.stop_flush_task().await;
        sink
    }

    #[tokio::test]
    async fn test_rejected_batch_does_not_stop_draining() {
        let mut server = mockito::Server::new_async().await;
        let rejected = server
            .mock("POST", "/loki/api/v1/push")
            .match_body(mockito::Matcher::Regex("bad-line".to_string()))
            .with_status(400)
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("POST", "/loki/api/v1/push")
            .match_body(mockito::Matcher::Regex("good-line".to_string()))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let sink = mock_sink(&server, 3).await;
        sink.append_line("bad-line").unwrap();
        sink.append_line("good-line").unwrap();

        assert!(matches!(
            sink.flush().await,
            Err(SinkError::Delivery(DeliveryError::Rejected { .. }))
        ));
        rejected.assert_async().await;
        accepted.assert_async().await;

        let stats = sink.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.buffered, 0);
    }

    #[tokio::test]
    async fn test_exhausted_batch_stops_draining() {
        let mut server = mockito::Server::new_async().await;
        let unavailable = server
            .mock("POST", "/loki/api/v1/push")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let sink = mock_sink(&server, 2).await;
        sink.append_line("first").unwrap();
        sink.append_line("second").unwrap();

        assert!(matches!(
            sink.flush().await,
            Err(SinkError::Delivery(DeliveryError::Failed { attempts: 2, .. }))
        ));
        unavailable.assert_async().await;
        assert_eq!(sink.stats().buffered, 1);
        assert_eq!(sink.stats().failed_batches, 1);
    }

    #[tokio::test]
    async fn test_concurrent_flushes_ship_each_entry_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/loki/api/v1/push")
            .with_status(204)
            .expect(4)
            .create_async()
            .await;

        let sink = mock_sink(&server, 1).await;
        for line in ["a", "b", "c", "d"] {
            sink.append_line(line).unwrap();
        }

        let (first, second) = tokio::join!(sink.flush(), sink.flush());
        assert!(first.is_ok());
        assert!(second.is_ok());
        mock.assert_async().await;
        assert_eq!(sink.stats().delivered, 4);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let sink = LokiSink::new(unreachable_config()).unwrap();
        let clone = sink.clone();
        clone.append_line("shared").unwrap();
        assert_eq!(sink.stats().buffered, 1);

        sink.inner.batcher.clear();
        clone.close().await.unwrap();
        assert!(sink.is_closed());
    }
}
