//! Reply policy: decides what reaches the reply topic
//!
//! Only successes and fallbacks are published. Agent errors stay in the logs.

mod policy;

pub use policy::{Action, OutboundReply, ReplyPolicy};
