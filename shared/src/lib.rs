//! Test Agent Shared Protocol Types
//!
//! This crate provides the wire records and codec for the request/reply
//! topics spoken between test orchestrators and the hardware test agent.

pub mod codec;
pub mod protocol;

pub use protocol::*;

/// Default topic names
pub mod topics {
    /// Topic the agent consumes commands from
    pub const REQUEST_TOPIC: &str = "svt.test-agent.request";

    /// Topic the agent publishes replies to
    pub const REPLY_TOPIC: &str = "svt.test-agent.request.reply";
}

/// Literal values that appear on the wire
pub mod wire {
    /// Test id used when a command carries no `testId`
    pub const UNKNOWN_TEST_ID: &str = "unknown";

    /// Result payload of the placeholder reply built before handlers report real data
    pub const PLACEHOLDER_RESULTS: &str = "dummyTestResults";

    /// Error text substituted into fallback replies
    pub const FALLBACK_ERROR: &str = "Dummy error";

    /// Reply type used by every fallback reply, whatever the originating command
    pub const FALLBACK_REPLY_TYPE: &str = "RunTestReply";

    /// Suffix appended to a command name to form its reply type
    pub const REPLY_TYPE_SUFFIX: &str = "Reply";
}
