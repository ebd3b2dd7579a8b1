pub mod adapter;
pub mod delivery;
#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(test)]
pub mod memory;
pub mod stdio;
pub mod traits;

pub use adapter::{BrokerAdapter, RunSummary};
pub use delivery::{delivery_channel, spawn_reporter, DeliveryReport, DeliverySender, DeliveryStats};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaSink, KafkaSource};
pub use stdio::{StdioSink, StdioSource};
pub use traits::{InboundMessage, MessageSink, MessageSource, PollOutcome};
