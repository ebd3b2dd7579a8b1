//! Agent configuration
//!
//! Built once in `main` from command-line flags (with environment variable
//! fallbacks) and passed by reference to the components that need it.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use test_agent_shared::topics;

/// Default cap on the `iterations` of a single RunLoopTest
pub const DEFAULT_MAX_ITERATIONS: u32 = 1000;

/// How the dispatcher turns a resolved command into a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DispatchMode {
    /// Resolve the handler but reply with the placeholder failure record
    #[default]
    Placeholder,
    /// Run the handler against the test system and reply with its result
    Execute,
}

/// Which transport carries the request/reply topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BrokerKind {
    /// Kafka cluster (requires the `kafka` feature)
    Kafka,
    /// JSON lines on stdin/stdout, for local development
    Stdio,
}

impl Default for BrokerKind {
    fn default() -> Self {
        if cfg!(feature = "kafka") {
            BrokerKind::Kafka
        } else {
            BrokerKind::Stdio
        }
    }
}

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Transport to use
    pub kind: BrokerKind,
    /// Comma-separated bootstrap servers
    pub bootstrap_servers: String,
    /// Consumer group id
    pub group_id: String,
    /// Where a new consumer group starts reading
    pub auto_offset_reset: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: BrokerKind::default(),
            bootstrap_servers: "localhost:9095".into(),
            group_id: "test-agent".into(),
            auto_offset_reset: "earliest".into(),
        }
    }
}

/// Simulated hardware timings
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Delay for test system initialization
    pub init_delay: Duration,
    /// Delay for a single test run
    pub run_delay: Duration,
    /// Delay for retrieving results from the system
    pub retrieve_delay: Duration,
}

impl SimulationConfig {
    /// No delays at all, for tests
    pub fn instant() -> Self {
        Self {
            init_delay: Duration::ZERO,
            run_delay: Duration::ZERO,
            retrieve_delay: Duration::ZERO,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            init_delay: Duration::from_millis(500),
            run_delay: Duration::from_secs(2),
            retrieve_delay: Duration::from_secs(1),
        }
    }
}

/// Top-level agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Broker connection
    pub broker: BrokerConfig,
    /// Topic commands are consumed from
    pub request_topic: String,
    /// Topic replies are published to
    pub reply_topic: String,
    /// Bounded wait for a single inbound poll
    pub poll_timeout: Duration,
    /// How long shutdown waits for outstanding publishes
    pub flush_timeout: Duration,
    /// Placeholder or real handler execution
    pub dispatch_mode: DispatchMode,
    /// Largest `iterations` accepted by RunLoopTest
    pub max_iterations: u32,
    /// Simulated test system timings
    pub simulation: SimulationConfig,
    /// JSON file with the test catalog; empty catalog when unset
    pub catalog: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            request_topic: topics::REQUEST_TOPIC.into(),
            reply_topic: topics::REPLY_TOPIC.into(),
            poll_timeout: Duration::from_secs(1),
            flush_timeout: Duration::from_secs(10),
            dispatch_mode: DispatchMode::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            simulation: SimulationConfig::default(),
            catalog: None,
        }
    }
}

/// Command-line flags
#[derive(Debug, Parser)]
#[command(name = "test-agent", about = "Hardware test agent driven by broker commands")]
pub struct Cli {
    /// Broker transport
    #[arg(long, env = "TEST_AGENT_BROKER", value_enum)]
    pub broker: Option<BrokerKind>,

    /// Kafka bootstrap servers
    #[arg(long, env = "TEST_AGENT_BOOTSTRAP_SERVERS")]
    pub bootstrap_servers: Option<String>,

    /// Kafka consumer group id
    #[arg(long, env = "TEST_AGENT_GROUP_ID")]
    pub group_id: Option<String>,

    /// Topic to consume commands from
    #[arg(long, env = "TEST_AGENT_REQUEST_TOPIC")]
    pub request_topic: Option<String>,

    /// Topic to publish replies to
    #[arg(long, env = "TEST_AGENT_REPLY_TOPIC")]
    pub reply_topic: Option<String>,

    /// Poll timeout in milliseconds
    #[arg(long, env = "TEST_AGENT_POLL_TIMEOUT_MS")]
    pub poll_timeout_ms: Option<u64>,

    /// Shutdown flush timeout in milliseconds
    #[arg(long, env = "TEST_AGENT_FLUSH_TIMEOUT_MS")]
    pub flush_timeout_ms: Option<u64>,

    /// Dispatch mode
    #[arg(long, env = "TEST_AGENT_DISPATCH_MODE", value_enum)]
    pub dispatch_mode: Option<DispatchMode>,

    /// Largest RunLoopTest iteration count accepted
    #[arg(long, env = "TEST_AGENT_MAX_ITERATIONS")]
    pub max_iterations: Option<u32>,

    /// Test catalog file
    #[arg(long, env = "TEST_AGENT_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Skip simulated hardware delays
    #[arg(long, env = "TEST_AGENT_NO_DELAY")]
    pub no_delay: bool,
}

impl Cli {
    /// Apply the flags on top of the defaults
    pub fn into_config(self) -> AgentConfig {
        let mut config = AgentConfig::default();

        if let Some(kind) = self.broker {
            config.broker.kind = kind;
        }
        if let Some(servers) = self.bootstrap_servers {
            config.broker.bootstrap_servers = servers;
        }
        if let Some(group_id) = self.group_id {
            config.broker.group_id = group_id;
        }
        if let Some(topic) = self.request_topic {
            config.request_topic = topic;
        }
        if let Some(topic) = self.reply_topic {
            config.reply_topic = topic;
        }
        if let Some(ms) = self.poll_timeout_ms {
            config.poll_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.flush_timeout_ms {
            config.flush_timeout = Duration::from_millis(ms);
        }
        if let Some(mode) = self.dispatch_mode {
            config.dispatch_mode = mode;
        }
        if let Some(max) = self.max_iterations {
            config.max_iterations = max;
        }
        config.catalog = self.catalog;
        if self.no_delay {
            config.simulation = SimulationConfig::instant();
        }

        config
    }
}
