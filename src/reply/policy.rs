//! Reply policy engine

use test_agent_shared::{Reply, TestReply, TestStatus};

/// A reply addressed to a topic and keyed by test id
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundReply {
    pub topic: String,
    pub key: String,
    pub reply: Reply,
}

/// What to do with a dispatcher reply
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Publish the reply unchanged
    Publish(OutboundReply),
    /// Log the message, publish nothing
    LogOnly(String),
    /// Publish a generic failure reply in place of the original
    PublishFallback(OutboundReply),
}

/// Maps replies to actions
#[derive(Debug, Clone)]
pub struct ReplyPolicy {
    reply_topic: String,
}

impl ReplyPolicy {
    /// Create a policy publishing to `reply_topic`
    pub fn new(reply_topic: impl Into<String>) -> Self {
        Self {
            reply_topic: reply_topic.into(),
        }
    }

    /// Decide the action for a reply
    ///
    /// First match wins: success is published as-is, an agent error is only
    /// logged, anything else is replaced by the fallback failure reply.
    pub fn route(&self, reply: &Reply) -> Action {
        if reply.test_status() == Some(TestStatus::TestSuccess) {
            return Action::Publish(self.outbound(reply.clone()));
        }

        if let Reply::AgentError(signal) = reply {
            return Action::LogOnly(format!(
                "Test {} failed due an Agent error {}, not sending success reply.",
                signal.request_id, signal.message
            ));
        }

        let fallback = TestReply::fallback(reply.correlation_id());
        Action::PublishFallback(self.outbound(Reply::Test(fallback)))
    }

    fn outbound(&self, reply: Reply) -> OutboundReply {
        OutboundReply {
            topic: self.reply_topic.clone(),
            key: reply.correlation_id().to_string(),
            reply,
        }
    }
}
