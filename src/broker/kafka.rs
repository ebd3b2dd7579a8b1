//! Kafka transport

use super::delivery::{DeliveryReport, DeliverySender};
use super::traits::{InboundMessage, MessageSource, MessageSink, PollOutcome};
use crate::config::BrokerConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::info;

/// Consumer subscribed to the request topic
pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    /// Create the consumer and subscribe to `topic`
    pub fn subscribe(config: &BrokerConfig, topic: &str) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .create()
            .context("Failed to create Kafka consumer")?;
        info!(
            "Kafka Consumer created: bootstrap.servers={} group.id={} auto.offset.reset={}",
            config.bootstrap_servers, config.group_id, config.auto_offset_reset
        );

        consumer
            .subscribe(&[topic])
            .with_context(|| format!("Failed to subscribe to {}", topic))?;
        info!("Subscribed to topic: {}", topic);

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn poll(&mut self, poll_timeout: Duration) -> PollOutcome {
        match tokio::time::timeout(poll_timeout, self.consumer.recv()).await {
            Err(_) => PollOutcome::Timeout,
            Ok(Err(e)) => PollOutcome::TransportError(e.to_string()),
            Ok(Ok(msg)) => PollOutcome::Message(InboundMessage {
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
                key: msg.key().map(Bytes::copy_from_slice),
                payload: Bytes::copy_from_slice(msg.payload().unwrap_or_default()),
            }),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.consumer.unsubscribe();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "kafka"
    }
}

/// Producer for the reply topic
pub struct KafkaSink {
    producer: FutureProducer,
    reports: DeliverySender,
}

impl KafkaSink {
    /// Create the producer
    pub fn connect(config: &BrokerConfig, reports: DeliverySender) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .create()
            .context("Failed to create Kafka producer")?;
        info!(
            "Kafka Producer created: bootstrap.servers={}",
            config.bootstrap_servers
        );

        Ok(Self { producer, reports })
    }
}

#[async_trait]
impl MessageSink for KafkaSink {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()> {
        let record = FutureRecord::to(topic).key(key).payload(&payload[..]);

        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| anyhow!("Failed to enqueue message for {}: {}", topic, e))?;

        // Resolved by librdkafka's delivery thread, after later loop iterations may have run.
        let reports = self.reports.clone();
        let topic = topic.to_string();
        let key = key.to_string();
        tokio::spawn(async move {
            let report = match delivery.await {
                Ok(Ok((partition, offset))) => DeliveryReport::Delivered {
                    topic,
                    partition,
                    offset,
                },
                Ok(Err((e, _))) => DeliveryReport::Failed {
                    topic,
                    key,
                    error: e.to_string(),
                },
                Err(_) => DeliveryReport::Failed {
                    topic,
                    key,
                    error: "delivery canceled".into(),
                },
            };
            let _ = reports.send(report);
        });

        Ok(())
    }

    async fn flush(&self, flush_timeout: Duration) -> Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(flush_timeout)))
            .await?
            .context("Producer flush did not complete")
    }

    fn name(&self) -> &'static str {
        "kafka"
    }
}
