// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `io::Write` face of a [`LokiSink`].
//!
//! Hosts hand a [`LokiWriter`] to whatever produces log output. Every
//! newline-terminated line becomes one entry; the writer never blocks on the
//! network and never reports delivery problems to the producer.

use crate::config::SinkConfig;
use crate::errors::SinkError;
use crate::labels::LabelSet;
use crate::placeholder::Replacer;
use crate::sink::LokiSink;
use std::io::{self, ErrorKind, Write};
use tracing_subscriber::fmt::MakeWriter;

/// Opens a sink for `endpoint` with default limits, resolving placeholders
/// from the process environment.
pub fn open_writer(endpoint: &str, labels: LabelSet) -> Result<LokiWriter, SinkError> {
    SinkConfig::new(endpoint, labels).open_writer(&Replacer::new())
}

#[derive(Debug)]
pub struct LokiWriter {
    sink: LokiSink,
    /// Bytes written after the last newline.
    partial: Vec<u8>,
}

impl LokiWriter {
    #[must_use]
    pub fn new(sink: LokiSink) -> Self {
        LokiWriter {
            sink,
            partial: Vec::new(),
        }
    }

    #[must_use]
    pub fn sink(&self) -> &LokiSink {
        &self.sink
    }

    /// Emits any partial line and waits until buffered entries are delivered.
    pub async fn sync(&mut self) -> Result<(), SinkError> {
        self.emit_partial()?;
        self.sink.flush().await
    }

    /// Emits any partial line and closes the underlying sink.
    pub async fn close(mut self) -> Result<(), SinkError> {
        match self.emit_partial() {
            Ok(()) | Err(SinkError::Closed) => {}
            Err(e) => return Err(e),
        }
        self.sink.close().await
    }

    fn append(&self, bytes: &[u8]) -> Result<(), SinkError> {
        let line = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        if line.is_empty() {
            return Ok(());
        }
        match self.sink.append_line(String::from_utf8_lossy(line)) {
            // Counted by the sink and reported from its flush task
            Err(SinkError::Append(_)) => Ok(()),
            other => other,
        }
    }

    fn emit_partial(&mut self) -> Result<(), SinkError> {
        if self.partial.is_empty() {
            return Ok(());
        }
        let partial = std::mem::take(&mut self.partial);
        self.append(&partial)
    }
}

impl Write for LokiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.sink.is_closed() {
            return Err(to_io_error(SinkError::Closed));
        }

        let mut rest = buf;
        while let Some(newline) = rest.iter().position(|&b| b == b'\n') {
            let (line, tail) = rest.split_at(newline);
            if self.partial.is_empty() {
                self.append(line).map_err(to_io_error)?;
            } else {
                self.partial.extend_from_slice(line);
                self.emit_partial().map_err(to_io_error)?;
            }
            rest = &tail[1..];
        }
        self.partial.extend_from_slice(rest);

        Ok(buf.len())
    }

    /// Hands the partial line to the sink and wakes its flush task. Delivery
    /// itself stays asynchronous; use [`LokiWriter::sync`] to wait for it.
    fn flush(&mut self) -> io::Result<()> {
        self.emit_partial().map_err(to_io_error)?;
        self.sink.notify();
        Ok(())
    }
}

impl Drop for LokiWriter {
    fn drop(&mut self) {
        let _ = self.emit_partial();
    }
}

impl<'a> MakeWriter<'a> for LokiSink {
    type Writer = LokiWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LokiWriter::new(self.clone())
    }
}

fn to_io_error(e: SinkError) -> io::Error {
    match e {
        SinkError::Closed => io::Error::new(ErrorKind::BrokenPipe, e),
        other => io::Error::other(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::client::{PushOptions, RetryPolicy};
    use crate::config::ResolvedConfig;
    use crate::entry::LogEntry;
    use crate::labels::LabelValue;
    use reqwest::Url;
    use std::time::Duration;

    fn idle_config() -> ResolvedConfig {
        ResolvedConfig {
            max_batch_size: 100,
            max_batch_age: Duration::from_secs(3_600),
            max_buffered_entries: 100,
            push: PushOptions {
                timeout: Duration::from_millis(200),
                retry: RetryPolicy {
                    max_attempts: 1,
                    ..RetryPolicy::default()
                },
                ..PushOptions::default()
            },
            ..ResolvedConfig::new(
                Url::parse("http://127.0.0.1:1/loki/api/v1/push").unwrap(),
                [("app", LabelValue::from("writer"))].into_iter().collect(),
            )
        }
    }

    fn idle_sink() -> LokiSink {
        LokiSink::new(idle_config()).unwrap()
    }

    fn buffered_lines(sink: &LokiSink) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(batch) = sink.take_batch() {
            lines.extend(batch.entries().iter().map(|e| e.line().to_string()));
        }
        lines
    }

    #[tokio::test]
    async fn test_write_splits_lines() {
        let sink = idle_sink();
        let mut writer = LokiWriter::new(sink.clone());

        assert_eq!(writer.write(b"first\nsecond\n\nthi").unwrap(), 17);
        assert_eq!(buffered_lines(&sink), vec!["first", "second"]);

        writer.write_all(b"rd\r\nfourth").unwrap();
        assert_eq!(buffered_lines(&sink), vec!["third"]);

        writer.flush().unwrap();
        assert_eq!(buffered_lines(&sink), vec!["fourth"]);
    }

    #[tokio::test]
    async fn test_full_buffer_does_not_fail_writes() {
        let sink = LokiSink::new(ResolvedConfig {
            max_batch_size: 2,
            max_buffered_entries: 2,
            ..idle_config()
        })
        .unwrap();
        sink.stop_flush_task().await;
        let mut writer = LokiWriter::new(sink.clone());

        assert_eq!(writer.write(b"one
two
thr
for
").unwrap(), 16);

        let stats = sink.stats();
        assert_eq!(stats.appended, 2);
        assert_eq!(stats.dropped, 2);
        assert_eq!(buffered_lines(&sink), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_drop_emits_partial_line() {
        let sink = idle_sink();
        {
            let mut writer = LokiWriter::new(sink.clone());
            writer.write_all(b"unterminated").unwrap();
        }
        assert_eq!(buffered_lines(&sink), vec!["unterminated"]);
    }

    #[tokio::test]
    async fn test_entries_carry_sink_labels() {
        let sink = idle_sink();
        let mut writer = LokiWriter::new(sink.clone());
        writeln!(writer, "labelled").unwrap();

        let batch = sink.take_batch().unwrap();
        let entry: &LogEntry = &batch.entries()[0];
        assert_eq!(entry.labels().get("app"), Some(&LabelValue::from("writer")));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let sink = idle_sink();
        let mut writer = LokiWriter::new(sink.clone());
        writer.write_all(b"bad \xff byte\n").unwrap();
        assert_eq!(buffered_lines(&sink), vec!["bad \u{fffd} byte"]);
    }

    #[tokio::test]
    async fn test_write_after_close_is_broken_pipe() {
        let sink = idle_sink();
        let mut writer = LokiWriter::new(sink.clone());
        sink.close().await.unwrap();

        let err = writer.write(b"too late\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_close_through_writer() {
        let sink = idle_sink();
        let writer = LokiWriter::new(sink.clone());
        writer.close().await.unwrap();
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_make_writer() {
        let sink = idle_sink();
        let mut writer = sink.make_writer();
        writer.write_all(b"from make_writer\n").unwrap();
        assert_eq!(buffered_lines(&sink), vec!["from make_writer"]);
    }

    #[tokio::test]
    async fn test_open_writer_validates() {
        assert!(matches!(
            open_writer("", LabelSet::new()),
            Err(SinkError::Config(crate::errors::ConfigError::EmptyEndpoint))
        ));

        let writer = open_writer("http://127.0.0.1:1/push", LabelSet::new()).unwrap();
        assert_eq!(writer.sink().endpoint().as_str(), "http://127.0.0.1:1/push");
        writer.close().await.unwrap();
    }
}
