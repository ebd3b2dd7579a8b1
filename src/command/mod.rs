//! Command dispatch infrastructure for the test agent
//!
//! This module handles:
//! - Decoding commands received from the request topic
//! - Resolving the command type against the registry
//! - Dispatching to the appropriate command handler
//! - Building the reply record for each command

mod dispatcher;
pub mod handlers;
mod registry;

pub use dispatcher::{DispatchError, Dispatcher};
pub use registry::CommandKind;
