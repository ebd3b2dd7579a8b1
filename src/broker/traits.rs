//! Transport trait abstraction for pluggable broker backends

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::borrow::Cow;
use std::time::Duration;

/// A message received from the request topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub payload: Bytes,
}

impl InboundMessage {
    /// The message key as text, `-` when the message has none
    pub fn key_display(&self) -> Cow<'_, str> {
        match &self.key {
            Some(key) => String::from_utf8_lossy(key),
            None => Cow::Borrowed("-"),
        }
    }
}

/// Result of a single bounded poll
#[derive(Debug)]
pub enum PollOutcome {
    /// A message arrived
    Message(InboundMessage),
    /// Nothing arrived within the poll timeout
    Timeout,
    /// The transport failed to deliver one message; polling may continue
    TransportError(String),
    /// The source is exhausted and will never yield another message
    Closed,
}

/// Subscription to the request topic
#[async_trait]
pub trait MessageSource: Send {
    /// Wait up to `timeout` for the next message
    async fn poll(&mut self, timeout: Duration) -> PollOutcome;

    /// Release the subscription
    async fn close(&mut self) -> Result<()>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}

/// Producer for the reply topic
///
/// `publish` only enqueues. The delivery outcome is posted later as a
/// [`DeliveryReport`](super::DeliveryReport) on the channel the sink was
/// created with, possibly from another task or thread.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Enqueue a message; fails only if it could not be handed to the transport
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()>;

    /// Wait until every enqueued message is acknowledged or `timeout` elapses
    async fn flush(&self, timeout: Duration) -> Result<()>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
