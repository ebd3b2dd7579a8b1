//! Command dispatcher - decodes, resolves and answers incoming commands

use super::handlers::{self, HandlerContext, HandlerError, HandlerResult};
use super::CommandKind;
use crate::config::{AgentConfig, DispatchMode};
use crate::testsystem::{TestCatalog, TestSystem};
use serde_json::Value;
use std::sync::Arc;
use test_agent_shared::{
    codec::{self, CodecError},
    wire, AgentErrorSignal, CommandMessage, Reply, TestReply,
};
use thiserror::Error;
use tracing::{error, info};

/// Errors raised while dispatching a command
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The payload could not be decoded; the message is dropped without a reply
    #[error("Malformed command: {0}")]
    Malformed(#[from] CodecError),

    #[error("Unknown command type: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Turns raw command payloads into reply records
pub struct Dispatcher {
    mode: DispatchMode,
    max_iterations: u32,
    client: Arc<dyn TestSystem>,
    catalog: Arc<dyn TestCatalog>,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        config: &AgentConfig,
        client: Arc<dyn TestSystem>,
        catalog: Arc<dyn TestCatalog>,
    ) -> Self {
        Self {
            mode: config.dispatch_mode,
            max_iterations: config.max_iterations,
            client,
            catalog,
        }
    }

    /// Decode a raw payload and build the reply for it
    ///
    /// Only a decode failure is returned as an error. Routing and handler
    /// failures come back as agent error signals.
    pub async fn dispatch(&self, raw: &[u8]) -> Result<Reply, DispatchError> {
        let command = codec::decode_command(raw)?;
        Ok(self.dispatch_command(&command).await)
    }

    /// Build the reply for an already decoded command
    pub async fn dispatch_command(&self, command: &CommandMessage) -> Reply {
        info!("Processing command...");
        let test_id = command.test_id();

        match self.try_dispatch(command).await {
            Ok(reply) => {
                info!("Generated response: {:?}", reply);
                Reply::Test(reply)
            }
            Err(e) => {
                error!(
                    "Error handling command {} (request_id={})",
                    command.command_name(),
                    test_id
                );
                let signal = AgentErrorSignal::new(test_id, e.to_string());
                info!("Generated error response: {:?}", signal);
                Reply::AgentError(signal)
            }
        }
    }

    async fn try_dispatch(&self, command: &CommandMessage) -> Result<TestReply, DispatchError> {
        let test_id = command.test_id();
        let kind: CommandKind = command.command_name().parse()?;

        match self.mode {
            DispatchMode::Placeholder => Ok(TestReply::failure(
                test_id,
                kind.reply_type(),
                Value::String(wire::PLACEHOLDER_RESULTS.into()),
            )),
            DispatchMode::Execute => {
                let ctx = HandlerContext {
                    test_id: test_id.to_string(),
                    client: self.client.clone(),
                    catalog: self.catalog.clone(),
                    max_iterations: self.max_iterations,
                };
                let data = execute(kind, &ctx, &command.data).await?;
                Ok(TestReply::success(test_id, kind.reply_type(), data))
            }
        }
    }
}

/// Run the handler registered for `kind`
async fn execute(kind: CommandKind, ctx: &HandlerContext, data: &Value) -> HandlerResult {
    match kind {
        CommandKind::GetAllTests => handlers::handle_get_all_tests(ctx, data).await,
        CommandKind::RunTest => handlers::handle_run_test(ctx, data).await,
        CommandKind::AbortTest => handlers::handle_abort_test(ctx, data).await,
        CommandKind::TestStatus => handlers::handle_test_status(ctx, data).await,
        CommandKind::RunLoopTest => handlers::handle_run_loop_test(ctx, data).await,
        CommandKind::RunTestPlan => handlers::handle_run_test_plan(ctx, data).await,
    }
}
