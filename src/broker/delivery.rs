//! Delivery reports for published replies

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Outcome of a single publish, posted by the transport once known
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    /// Acknowledged by the broker
    Delivered {
        topic: String,
        partition: i32,
        offset: i64,
    },
    /// Rejected or lost
    Failed {
        topic: String,
        key: String,
        error: String,
    },
}

/// Sending half handed to sinks
pub type DeliverySender = mpsc::UnboundedSender<DeliveryReport>;

/// Receiving half consumed by the reporter task
pub type DeliveryReceiver = mpsc::UnboundedReceiver<DeliveryReport>;

/// Create the delivery report channel
pub fn delivery_channel() -> (DeliverySender, DeliveryReceiver) {
    mpsc::unbounded_channel()
}

/// Counts of reports seen by the reporter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Log one delivery report
pub fn log_report(report: &DeliveryReport) {
    match report {
        DeliveryReport::Delivered {
            topic,
            partition,
            offset,
        } => {
            info!("Delivered message to {} [{}] @ offset {}", topic, partition, offset);
        }
        DeliveryReport::Failed { topic, key, error } => {
            error!("Delivery failed: {} (topic={} key={})", error, topic, key);
        }
    }
}

/// Spawn the task that logs delivery reports until every sender is dropped
pub fn spawn_reporter(mut rx: DeliveryReceiver) -> JoinHandle<DeliveryStats> {
    tokio::spawn(async move {
        let mut stats = DeliveryStats::default();
        while let Some(report) = rx.recv().await {
            log_report(&report);
            match report {
                DeliveryReport::Delivered { .. } => stats.delivered += 1,
                DeliveryReport::Failed { .. } => stats.failed += 1,
            }
        }
        stats
    })
}
