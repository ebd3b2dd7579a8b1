//! Stdio transport for running the agent without a broker
//!
//! Each stdin line is one command payload. Each published reply is written
//! to stdout as a JSON line: `{"topic": ..., "key": ..., "value": ...}`.

use super::delivery::{DeliveryReport, DeliverySender};
use super::traits::{InboundMessage, MessageSource, MessageSink, PollOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use std::io::BufRead;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout, Duration};

/// Lines buffered between the reader thread and the poll loop
const LINE_BUFFER: usize = 64;

/// Reads command payloads from stdin, one per line
///
/// Lines are read on a dedicated thread so a pending read never holds up
/// runtime shutdown.
pub struct StdioSource {
    lines: mpsc::Receiver<std::io::Result<String>>,
    topic: String,
    next_offset: i64,
    closed: bool,
}

impl StdioSource {
    /// Create a source presenting stdin as `topic`
    pub fn new(topic: impl Into<String>) -> Result<Self> {
        Self::from_reader(topic, std::io::BufReader::new(std::io::stdin()))
    }

    /// Create a source reading lines from `reader` on its own thread
    pub fn from_reader<R>(topic: impl Into<String>, reader: R) -> Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);

        std::thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                for line in reader.lines() {
                    let failed = line.is_err();
                    if tx.blocking_send(line).is_err() || failed {
                        break;
                    }
                }
            })
            .context("Failed to spawn stdin reader thread")?;

        Ok(Self {
            lines: rx,
            topic: topic.into(),
            next_offset: 0,
            closed: false,
        })
    }
}

#[async_trait]
impl MessageSource for StdioSource {
    async fn poll(&mut self, poll_timeout: Duration) -> PollOutcome {
        if self.closed {
            return PollOutcome::Closed;
        }

        match timeout(poll_timeout, self.lines.recv()).await {
            Err(_) => PollOutcome::Timeout,
            Ok(None) => {
                self.closed = true;
                PollOutcome::Closed
            }
            Ok(Some(Err(e))) => PollOutcome::TransportError(format!("stdin read error: {}", e)),
            Ok(Some(Ok(line))) => {
                // Blank lines go through too; the decoder rejects them.
                let offset = self.next_offset;
                self.next_offset += 1;
                PollOutcome::Message(InboundMessage {
                    topic: self.topic.clone(),
                    partition: 0,
                    offset,
                    key: None,
                    payload: Bytes::from(line),
                })
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.lines.close();
        self.closed = true;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}

/// Writes published replies to stdout as JSON lines
pub struct StdioSink {
    stdout: Mutex<Stdout>,
    reports: DeliverySender,
    next_offset: AtomicI64,
}

impl StdioSink {
    /// Create a sink posting delivery reports to `reports`
    pub fn new(reports: DeliverySender) -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
            reports,
            next_offset: AtomicI64::new(0),
        }
    }
}

/// Render a record as one output line
fn render_line(topic: &str, key: &str, payload: &[u8]) -> String {
    let value = serde_json::from_slice::<Value>(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()));
    let mut line = json!({ "topic": topic, "key": key, "value": value }).to_string();
    line.push('\n');
    line
}

#[async_trait]
impl MessageSink for StdioSink {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()> {
        let line = render_line(topic, key, &payload);

        let written = {
            let mut stdout = self.stdout.lock().await;
            stdout.write_all(line.as_bytes()).await
        };

        let report = match written {
            Ok(()) => DeliveryReport::Delivered {
                topic: topic.to_string(),
                partition: 0,
                offset: self.next_offset.fetch_add(1, Ordering::SeqCst),
            },
            Err(e) => DeliveryReport::Failed {
                topic: topic.to_string(),
                key: key.to_string(),
                error: e.to_string(),
            },
        };
        let _ = self.reports.send(report);

        Ok(())
    }

    async fn flush(&self, flush_timeout: Duration) -> Result<()> {
        let mut stdout = self.stdout.lock().await;
        timeout(flush_timeout, stdout.flush()).await??;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
