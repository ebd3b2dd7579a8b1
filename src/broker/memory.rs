//! In-process broker transport
//!
//! Commands are injected through a [`MemoryInjector`]; published replies are
//! kept in memory and acknowledged from a spawned task, the way a real
//! producer acknowledges from its own delivery thread.

use super::delivery::{DeliveryReport, DeliverySender};
use super::traits::{InboundMessage, MessageSource, MessageSink, PollOutcome};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_agent_shared::{codec, Reply};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::timeout;

type Inbound = std::result::Result<Bytes, String>;

/// Create a connected injector/source pair for `topic`
pub fn memory_channel(topic: impl Into<String>, capacity: usize) -> (MemoryInjector, MemorySource) {
    let (tx, rx) = mpsc::channel(capacity);
    let topic = topic.into();
    (
        MemoryInjector { tx },
        MemorySource {
            rx,
            topic,
            next_offset: 0,
            closed: false,
        },
    )
}

/// Feeds messages into a [`MemorySource`]
#[derive(Clone)]
pub struct MemoryInjector {
    tx: mpsc::Sender<Inbound>,
}

impl MemoryInjector {
    /// Inject a raw payload
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(Ok(payload.into()))
            .await
            .map_err(|_| anyhow!("Memory source closed"))
    }

    /// Inject a transport-level error in place of a message
    pub async fn send_error(&self, error: impl Into<String>) -> Result<()> {
        self.tx
            .send(Err(error.into()))
            .await
            .map_err(|_| anyhow!("Memory source closed"))
    }
}

/// Subscription backed by an in-process channel
pub struct MemorySource {
    rx: mpsc::Receiver<Inbound>,
    topic: String,
    next_offset: i64,
    closed: bool,
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn poll(&mut self, poll_timeout: Duration) -> PollOutcome {
        if self.closed {
            return PollOutcome::Closed;
        }

        match timeout(poll_timeout, self.rx.recv()).await {
            Err(_) => PollOutcome::Timeout,
            Ok(None) => {
                self.closed = true;
                PollOutcome::Closed
            }
            Ok(Some(Err(error))) => PollOutcome::TransportError(error),
            Ok(Some(Ok(payload))) => {
                let offset = self.next_offset;
                self.next_offset += 1;
                PollOutcome::Message(InboundMessage {
                    topic: self.topic.clone(),
                    partition: 0,
                    offset,
                    key: None,
                    payload,
                })
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.rx.close();
        self.closed = true;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// A message accepted by a [`MemorySink`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRecord {
    pub topic: String,
    pub key: String,
    pub payload: Bytes,
}

impl PublishedRecord {
    /// Decode the payload as a reply
    pub fn reply(&self) -> Result<Reply> {
        Ok(codec::decode_reply(&self.payload)?)
    }
}

#[derive(Default)]
struct SinkState {
    records: Vec<PublishedRecord>,
    offsets: HashMap<String, i64>,
}

/// Producer that keeps every published record in memory
#[derive(Clone)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
    reports: DeliverySender,
    in_flight: InFlight,
    fail_deliveries: bool,
}

impl MemorySink {
    /// Create a sink posting delivery reports to `reports`
    pub fn new(reports: DeliverySender) -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState::default())),
            reports,
            in_flight: InFlight::default(),
            fail_deliveries: false,
        }
    }

    /// Create a sink whose deliveries all fail
    pub fn failing(reports: DeliverySender) -> Self {
        Self {
            fail_deliveries: true,
            ..Self::new(reports)
        }
    }

    /// Every record acknowledged so far, in delivery order
    pub async fn published(&self) -> Vec<PublishedRecord> {
        self.state.lock().await.records.clone()
    }
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()> {
        let guard = self.in_flight.begin();
        let state = self.state.clone();
        let reports = self.reports.clone();
        let fail = self.fail_deliveries;
        let record = PublishedRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        };

        tokio::spawn(async move {
            tokio::task::yield_now().await;

            let report = if fail {
                DeliveryReport::Failed {
                    topic: record.topic,
                    key: record.key,
                    error: "simulated delivery failure".into(),
                }
            } else {
                let mut state = state.lock().await;
                let offset = state.offsets.entry(record.topic.clone()).or_insert(0);
                let report = DeliveryReport::Delivered {
                    topic: record.topic.clone(),
                    partition: 0,
                    offset: *offset,
                };
                *offset += 1;
                state.records.push(record);
                report
            };

            let _ = reports.send(report);
            drop(guard);
        });

        Ok(())
    }

    async fn flush(&self, flush_timeout: Duration) -> Result<()> {
        if self.in_flight.wait_idle(flush_timeout).await {
            Ok(())
        } else {
            Err(anyhow!(
                "{} message(s) still outstanding after {:?}",
                self.in_flight.count(),
                flush_timeout
            ))
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Tracks publishes that are enqueued but not yet acknowledged
#[derive(Debug, Clone, Default)]
struct InFlight {
    inner: Arc<InFlightInner>,
}

#[derive(Debug, Default)]
struct InFlightInner {
    count: AtomicUsize,
    idle: Notify,
}

/// Marks one outstanding publish; dropping it acknowledges the publish
#[derive(Debug)]
struct InFlightGuard {
    inner: Arc<InFlightInner>,
}

impl InFlight {
    /// Register a new outstanding publish
    fn begin(&self) -> InFlightGuard {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            inner: self.inner.clone(),
        }
    }

    /// Number of outstanding publishes
    fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Wait until nothing is outstanding; returns false on timeout
    async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.inner.idle.notified();
                if self.count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::delivery::delivery_channel;

    #[tokio::test]
    async fn test_source_yields_messages_then_closes() {
        let (injector, mut source) = memory_channel("requests", 4);
        injector.send(&b"first"[..]).await.unwrap();
        injector.send_error("broker hiccup").await.unwrap();
        drop(injector);

        match source.poll(Duration::from_millis(50)).await {
            PollOutcome::Message(msg) => {
                assert_eq!(msg.topic, "requests");
                assert_eq!(msg.offset, 0);
                assert_eq!(msg.payload, Bytes::from_static(b"first"));
            }
            other => panic!("expected message, got {other:?}"),
        }
        assert!(matches!(
            source.poll(Duration::from_millis(50)).await,
            PollOutcome::TransportError(e) if e == "broker hiccup"
        ));
        assert!(matches!(source.poll(Duration::from_millis(50)).await, PollOutcome::Closed));
    }

    #[tokio::test]
    async fn test_source_times_out() {
        let (_injector, mut source) = memory_channel("requests", 4);
        assert!(matches!(
            source.poll(Duration::from_millis(10)).await,
            PollOutcome::Timeout
        ));
    }

    #[tokio::test]
    async fn test_sink_acknowledges_after_flush() {
        let (tx, mut rx) = delivery_channel();
        let sink = MemorySink::new(tx);

        sink.publish("replies", "1", Bytes::from_static(b"{}")).await.unwrap();
        sink.publish("replies", "2", Bytes::from_static(b"{}")).await.unwrap();
        sink.flush(Duration::from_secs(1)).await.unwrap();

        let published = sink.published().await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].key, "1");

        let mut offsets = Vec::new();
        while let Ok(report) = rx.try_recv() {
            if let DeliveryReport::Delivered { offset, .. } = report {
                offsets.push(offset);
            }
        }
        offsets.sort();
        assert_eq!(offsets, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_failing_sink_reports_failures() {
        let (tx, mut rx) = delivery_channel();
        let sink = MemorySink::failing(tx);

        sink.publish("replies", "1", Bytes::from_static(b"{}")).await.unwrap();
        sink.flush(Duration::from_secs(1)).await.unwrap();

        assert!(sink.published().await.is_empty());
        assert!(matches!(rx.try_recv(), Ok(DeliveryReport::Failed { .. })));
    }

    #[tokio::test]
    async fn test_in_flight_idle_immediately() {
        let in_flight = InFlight::default();
        assert!(in_flight.wait_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_in_flight_waits_for_guards() {
        let in_flight = InFlight::default();
        let guard = in_flight.begin();
        assert_eq!(in_flight.count(), 1);

        assert!(!in_flight.wait_idle(Duration::from_millis(10)).await);

        let waiter = {
            let in_flight = in_flight.clone();
            tokio::spawn(async move { in_flight.wait_idle(Duration::from_secs(5)).await })
        };
        drop(guard);

        assert!(waiter.await.unwrap());
        assert_eq!(in_flight.count(), 0);
    }
}
