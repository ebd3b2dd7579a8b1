//! Broker adapter - the poll, dispatch, route, publish loop

use super::traits::{InboundMessage, MessageSink, MessageSource, PollOutcome};
use crate::command::Dispatcher;
use crate::config::AgentConfig;
use crate::reply::{Action, OutboundReply, ReplyPolicy};
use std::future::Future;
use std::time::Duration;
use test_agent_shared::{codec, wire};
use tracing::{debug, error, info, warn};

/// Counters accumulated over one run of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages taken off the request topic
    pub received: u64,
    /// Replies published unchanged
    pub published: u64,
    /// Fallback replies published
    pub fallbacks: u64,
    /// Agent errors kept off the wire
    pub suppressed: u64,
    /// Payloads dropped because they could not be decoded
    pub malformed: u64,
    /// Per-message transport errors
    pub transport_errors: u64,
    /// Replies that could not be encoded or enqueued
    pub publish_errors: u64,
}

/// Binds the dispatcher and reply policy to a broker transport
pub struct BrokerAdapter<S, P> {
    source: S,
    sink: P,
    dispatcher: Dispatcher,
    policy: ReplyPolicy,
    poll_timeout: Duration,
    flush_timeout: Duration,
}

impl<S, P> BrokerAdapter<S, P>
where
    S: MessageSource,
    P: MessageSink,
{
    /// Create a new broker adapter
    pub fn new(config: &AgentConfig, source: S, sink: P, dispatcher: Dispatcher) -> Self {
        Self {
            source,
            sink,
            dispatcher,
            policy: ReplyPolicy::new(config.reply_topic.clone()),
            poll_timeout: config.poll_timeout,
            flush_timeout: config.flush_timeout,
        }
    }

    /// Run until `shutdown` resolves or the source is exhausted, then drain
    ///
    /// Shutdown is only observed while waiting for the next message, so a
    /// message that has been received is always processed to completion.
    pub async fn run<F>(mut self, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        info!(
            "TestAgent started, listening for commands ({} -> {})...",
            self.source.name(),
            self.sink.name()
        );

        let mut summary = RunSummary::default();
        tokio::pin!(shutdown);

        loop {
            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutting down TestAgent...");
                    break;
                }
                outcome = self.source.poll(self.poll_timeout) => outcome,
            };

            match outcome {
                PollOutcome::Timeout => continue,
                PollOutcome::TransportError(e) => {
                    error!("Broker error: {}", e);
                    summary.transport_errors += 1;
                }
                PollOutcome::Closed => {
                    info!("Request source closed");
                    break;
                }
                PollOutcome::Message(msg) => {
                    summary.received += 1;
                    self.handle_message(msg, &mut summary).await;
                }
            }
        }

        self.drain().await;
        summary
    }

    /// Dispatch one message and carry out the policy decision
    async fn handle_message(&self, msg: InboundMessage, summary: &mut RunSummary) {
        debug!(
            "Received message from {} [{}] @ offset {} (key={})",
            msg.topic,
            msg.partition,
            msg.offset,
            msg.key_display()
        );

        let reply = match self.dispatcher.dispatch(&msg.payload).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    "Dropping message at {} [{}] @ offset {}: {}",
                    msg.topic, msg.partition, msg.offset, e
                );
                summary.malformed += 1;
                return;
            }
        };

        match self.policy.route(&reply) {
            Action::Publish(out) => {
                info!("Test {} completed successfully, sending reply...", out.key);
                if self.publish(out).await {
                    summary.published += 1;
                } else {
                    summary.publish_errors += 1;
                }
            }
            Action::LogOnly(message) => {
                error!("{}", message);
                summary.suppressed += 1;
            }
            Action::PublishFallback(out) => {
                warn!(
                    "Test {} failed due to test system error {}, not sending success reply.",
                    out.key,
                    wire::FALLBACK_ERROR
                );
                if self.publish(out).await {
                    summary.fallbacks += 1;
                } else {
                    summary.publish_errors += 1;
                }
            }
        }
    }

    /// Encode and enqueue a reply; failures are logged, never retried
    async fn publish(&self, out: OutboundReply) -> bool {
        let payload = match codec::encode_reply(&out.reply) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode reply for test {}: {}", out.key, e);
                return false;
            }
        };

        match self.sink.publish(&out.topic, &out.key, payload).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to publish reply for test {}: {}", out.key, e);
                false
            }
        }
    }

    /// Release the subscription and wait for outstanding publishes
    async fn drain(mut self) {
        info!("Closing consumer and flushing producer...");

        if let Err(e) = self.source.close().await {
            warn!("Failed to close {} source: {}", self.source.name(), e);
        }
        if let Err(e) = self.sink.flush(self.flush_timeout).await {
            warn!("Failed to flush {} sink: {}", self.sink.name(), e);
        }

        info!("Agent shut down cleanly.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::delivery::{delivery_channel, spawn_reporter, DeliveryStats};
    use crate::broker::memory::{
        memory_channel, MemoryInjector, MemorySink, MemorySource, PublishedRecord,
    };
    use crate::config::{DispatchMode, SimulationConfig};
    use crate::testsystem::{InMemoryCatalog, SimulatedTestSystem};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use test_agent_shared::TestStatus;

    const SCENARIO_A: &[u8] =
        br#"{"command":"RunTest","data":{"params":{"chipName":"X1","testName":"T1"}},"testId":"42"}"#;
    const SCENARIO_B: &[u8] = br#"{"command":"Bogus","testId":"7"}"#;

    fn config(mode: DispatchMode) -> AgentConfig {
        AgentConfig {
            poll_timeout: Duration::from_millis(20),
            flush_timeout: Duration::from_secs(1),
            dispatch_mode: mode,
            simulation: SimulationConfig::instant(),
            ..Default::default()
        }
    }

    fn adapter(
        config: &AgentConfig,
        sink: MemorySink,
    ) -> (MemoryInjector, BrokerAdapter<MemorySource, MemorySink>) {
        let catalog = Arc::new(InMemoryCatalog::new().with_test("X1", "T1"));
        let client = Arc::new(SimulatedTestSystem::new(
            config.simulation.clone(),
            catalog.clone(),
        ));
        let dispatcher = Dispatcher::new(config, client, catalog);
        let (injector, source) = memory_channel(config.request_topic.clone(), 16);
        (injector, BrokerAdapter::new(config, source, sink, dispatcher))
    }

    struct Outcome {
        summary: RunSummary,
        published: Vec<PublishedRecord>,
        deliveries: DeliveryStats,
    }

    /// Feed `payloads` through a fresh adapter and run it until the input is exhausted
    async fn run_with(mode: DispatchMode, failing: bool, payloads: &[&'static [u8]]) -> Outcome {
        let config = config(mode);
        let (tx, rx) = delivery_channel();
        let reporter = spawn_reporter(rx);
        let sink = if failing {
            MemorySink::failing(tx)
        } else {
            MemorySink::new(tx)
        };
        let (injector, adapter) = adapter(&config, sink.clone());

        for payload in payloads {
            injector.send(*payload).await.unwrap();
        }
        drop(injector);

        let summary = adapter.run(futures::future::pending()).await;
        let published = sink.published().await;
        drop(sink);
        let deliveries = reporter.await.unwrap();

        Outcome {
            summary,
            published,
            deliveries,
        }
    }

    fn json_payload(record: &PublishedRecord) -> Value {
        serde_json::from_slice(&record.payload).unwrap()
    }

    #[tokio::test]
    async fn test_placeholder_run_test_publishes_fallback() {
        let outcome = run_with(DispatchMode::Placeholder, false, &[SCENARIO_A]).await;

        assert_eq!(outcome.summary.received, 1);
        assert_eq!(outcome.summary.fallbacks, 1);
        assert_eq!(outcome.published.len(), 1);

        let record = &outcome.published[0];
        assert_eq!(record.topic, "svt.test-agent.request.reply");
        assert_eq!(record.key, "42");
        assert_eq!(
            json_payload(record),
            json!({
                "test_id": "42",
                "type": "RunTestReply",
                "testStatus": "TestFail",
                "data": "Dummy error",
            })
        );
        assert_eq!(outcome.deliveries.delivered, 1);
    }

    #[tokio::test]
    async fn test_unknown_command_is_never_published() {
        let outcome = run_with(DispatchMode::Placeholder, false, &[SCENARIO_B]).await;

        assert_eq!(outcome.summary.received, 1);
        assert_eq!(outcome.summary.suppressed, 1);
        assert!(outcome.published.is_empty());
        assert_eq!(outcome.deliveries, DeliveryStats::default());
    }

    #[tokio::test]
    async fn test_success_is_published_as_is() {
        let outcome = run_with(
            DispatchMode::Execute,
            false,
            &[br#"{"command":"TestStatus","testId":"9"}"#],
        )
        .await;

        assert_eq!(outcome.summary.published, 1);
        let record = &outcome.published[0];
        assert_eq!(record.key, "9");

        let reply = record.reply().unwrap();
        assert_eq!(reply.test_status(), Some(TestStatus::TestSuccess));
        assert_eq!(json_payload(record)["type"], json!("TestStatusReply"));
        assert_eq!(json_payload(record)["data"]["testId"], json!("9"));
    }

    #[tokio::test]
    async fn test_execute_mode_run_test_result_reaches_the_wire() {
        let outcome = run_with(DispatchMode::Execute, false, &[SCENARIO_A]).await;

        assert_eq!(outcome.summary.published, 1);
        let payload = json_payload(&outcome.published[0]);
        assert_eq!(payload["testStatus"], json!("TestSuccess"));
        assert_eq!(payload["data"]["Chip"], json!("X1"));
        assert_eq!(payload["data"]["testValues"]["results"]["vOut"], json!(1.2));
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_dropped() {
        let outcome = run_with(
            DispatchMode::Placeholder,
            false,
            &[b"\xff\xfe", b"{broken", b"\"just a string\"", SCENARIO_A],
        )
        .await;

        assert_eq!(outcome.summary.received, 4);
        assert_eq!(outcome.summary.malformed, 3);
        assert_eq!(outcome.summary.fallbacks, 1);
        assert_eq!(outcome.published.len(), 1);
    }

    #[tokio::test]
    async fn test_data_shape_does_not_block_the_fallback() {
        let outcome = run_with(
            DispatchMode::Placeholder,
            false,
            &[
                br#"{"command":"RunTest","data":null,"testId":"5"}"#,
                br#"{"command":"RunTest","data":[1,2],"testId":"6"}"#,
            ],
        )
        .await;

        assert_eq!(outcome.summary.malformed, 0);
        assert_eq!(outcome.summary.fallbacks, 2);
        let keys: Vec<_> = outcome.published.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["5", "6"]);
        assert_eq!(
            json_payload(&outcome.published[0]),
            json!({
                "test_id": "5",
                "type": "RunTestReply",
                "testStatus": "TestFail",
                "data": "Dummy error",
            })
        );
    }

    #[tokio::test]
    async fn test_null_data_in_execute_mode_is_suppressed() {
        let outcome = run_with(
            DispatchMode::Execute,
            false,
            &[br#"{"command":"RunTest","data":null,"testId":"5"}"#],
        )
        .await;

        assert_eq!(outcome.summary.suppressed, 1);
        assert!(outcome.published.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_loop_is_suppressed_and_loop_continues() {
        let outcome = run_with(
            DispatchMode::Execute,
            false,
            &[
                br#"{"command":"RunLoopTest","data":{"iterations":4294967295},"testId":"6"}"#,
                br#"{"command":"TestStatus","testId":"9"}"#,
            ],
        )
        .await;

        assert_eq!(outcome.summary.received, 2);
        assert_eq!(outcome.summary.suppressed, 1);
        assert_eq!(outcome.summary.published, 1);
        assert_eq!(outcome.published[0].key, "9");
    }

    #[tokio::test]
    async fn test_blank_payload_counts_as_malformed() {
        let outcome = run_with(DispatchMode::Placeholder, false, &[b"", SCENARIO_A]).await;

        assert_eq!(outcome.summary.received, 2);
        assert_eq!(outcome.summary.malformed, 1);
        assert_eq!(outcome.published.len(), 1);
    }

    #[tokio::test]
    async fn test_only_malformed_input_publishes_nothing() {
        let outcome = run_with(DispatchMode::Placeholder, false, &[b"not json"]).await;

        assert_eq!(outcome.summary.malformed, 1);
        assert!(outcome.published.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_does_not_stop_the_loop() {
        let config = config(DispatchMode::Placeholder);
        let (tx, _rx) = delivery_channel();
        let sink = MemorySink::new(tx);
        let (injector, adapter) = adapter(&config, sink.clone());

        injector.send_error("partition EOF").await.unwrap();
        injector.send(SCENARIO_A).await.unwrap();
        drop(injector);

        let summary = adapter.run(futures::future::pending()).await;
        assert_eq!(summary.transport_errors, 1);
        assert_eq!(summary.received, 1);
        assert_eq!(sink.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_failures_are_only_reported() {
        let outcome = run_with(DispatchMode::Placeholder, true, &[SCENARIO_A, SCENARIO_A]).await;

        assert_eq!(outcome.summary.received, 2);
        assert_eq!(outcome.summary.fallbacks, 2);
        assert!(outcome.published.is_empty());
        assert_eq!(outcome.deliveries, DeliveryStats { delivered: 0, failed: 2 });
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_loop_and_drains() {
        let config = config(DispatchMode::Placeholder);
        let (tx, _rx) = delivery_channel();
        let sink = MemorySink::new(tx);
        let (injector, adapter) = adapter(&config, sink.clone());

        injector.send(SCENARIO_A).await.unwrap();

        let summary = adapter
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await;

        assert_eq!(summary.received, 1);
        assert_eq!(sink.published().await.len(), 1);
        assert!(injector.send(SCENARIO_B).await.is_err());
    }
}
