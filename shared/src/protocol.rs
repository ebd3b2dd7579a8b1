//! Request and reply records carried on the agent topics

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::wire;

/// A command received on the request topic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Command type name, e.g. `"RunTest"`
    #[serde(default)]
    pub command: Option<String>,

    /// Command parameters, structure depends on the command type
    ///
    /// Kept as raw JSON: the handlers that read it check its shape.
    #[serde(default = "empty_object")]
    pub data: Value,

    /// Correlation id echoed back in the reply
    #[serde(
        rename = "testId",
        default,
        deserialize_with = "deserialize_test_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub test_id: Option<String>,
}

impl CommandMessage {
    /// Create a command with the given type, parameters and test id
    pub fn new(
        command: impl Into<String>,
        data: Map<String, Value>,
        test_id: Option<String>,
    ) -> Self {
        Self {
            command: Some(command.into()),
            data: Value::Object(data),
            test_id,
        }
    }

    /// The test id, or `"unknown"` when the sender omitted it
    pub fn test_id(&self) -> &str {
        self.test_id.as_deref().unwrap_or(wire::UNKNOWN_TEST_ID)
    }

    /// The command name as it should appear in log lines and error messages
    pub fn command_name(&self) -> &str {
        self.command.as_deref().unwrap_or("None")
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Accepts string or numeric ids; orchestrators are not consistent about which they send.
fn deserialize_test_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "testId must be a string or number, got {other}"
        ))),
    }
}

/// Outcome of a test as reported to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    TestSuccess,
    TestFail,
}

/// Marker carried by agent error signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    AgentError,
}

/// Reply describing the outcome of a test command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReply {
    pub test_id: String,

    #[serde(rename = "type")]
    pub reply_type: String,

    #[serde(rename = "testStatus")]
    pub test_status: TestStatus,

    pub data: Value,
}

impl TestReply {
    /// Create a success reply
    pub fn success(test_id: impl Into<String>, reply_type: impl Into<String>, data: Value) -> Self {
        Self {
            test_id: test_id.into(),
            reply_type: reply_type.into(),
            test_status: TestStatus::TestSuccess,
            data,
        }
    }

    /// Create a failure reply
    pub fn failure(test_id: impl Into<String>, reply_type: impl Into<String>, data: Value) -> Self {
        Self {
            test_id: test_id.into(),
            reply_type: reply_type.into(),
            test_status: TestStatus::TestFail,
            data,
        }
    }

    /// Create the generic failure reply published in place of any non-success outcome
    pub fn fallback(test_id: impl Into<String>) -> Self {
        Self::failure(
            test_id,
            wire::FALLBACK_REPLY_TYPE,
            Value::String(wire::FALLBACK_ERROR.into()),
        )
    }
}

/// Internal failure record; logged by the agent, never published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentErrorSignal {
    pub request_id: String,

    #[serde(rename = "agentStatus")]
    pub agent_status: AgentStatus,

    #[serde(rename = "AgentError")]
    pub message: String,
}

impl AgentErrorSignal {
    /// Create an agent error signal for the given request
    pub fn new(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            agent_status: AgentStatus::AgentError,
            message: message.into(),
        }
    }
}

/// Any record the dispatcher can produce for a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Test(TestReply),
    AgentError(AgentErrorSignal),
}

impl Reply {
    /// The correlation id of the command this reply answers
    pub fn correlation_id(&self) -> &str {
        match self {
            Reply::Test(reply) => &reply.test_id,
            Reply::AgentError(signal) => &signal.request_id,
        }
    }

    /// Test status, if this is a test reply
    pub fn test_status(&self) -> Option<TestStatus> {
        match self {
            Reply::Test(reply) => Some(reply.test_status),
            Reply::AgentError(_) => None,
        }
    }

    /// Agent status, if this is an agent error signal
    pub fn agent_status(&self) -> Option<AgentStatus> {
        match self {
            Reply::Test(_) => None,
            Reply::AgentError(signal) => Some(signal.agent_status),
        }
    }
}

impl From<TestReply> for Reply {
    fn from(reply: TestReply) -> Self {
        Reply::Test(reply)
    }
}

impl From<AgentErrorSignal> for Reply {
    fn from(signal: AgentErrorSignal) -> Self {
        Reply::AgentError(signal)
    }
}
