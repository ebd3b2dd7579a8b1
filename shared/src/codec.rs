//! JSON codec for the agent topics
//!
//! Every record is a single UTF-8 JSON object per broker message:
//! ```text
//! { "command": "RunTest", "data": { ... }, "testId": "42" }
//! ```
//!
//! The broker preserves message boundaries, so no framing is applied.

use bytes::Bytes;
use thiserror::Error;

use crate::{CommandMessage, Reply};

/// Maximum payload size (1 MB), the broker's default message size limit
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Empty payload")]
    EmptyPayload,

    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Decode a command from a raw broker payload
pub fn decode_command(payload: &[u8]) -> Result<CommandMessage, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(payload.len()));
    }

    let text = std::str::from_utf8(payload)?;
    Ok(serde_json::from_str(text)?)
}

/// Encode a command for the request topic
pub fn encode_command(command: &CommandMessage) -> Result<Bytes, CodecError> {
    encode(command)
}

/// Encode a reply for the reply topic
pub fn encode_reply(reply: &Reply) -> Result<Bytes, CodecError> {
    encode(reply)
}

/// Decode a reply read back from the reply topic
pub fn decode_reply(payload: &[u8]) -> Result<Reply, CodecError> {
    let text = std::str::from_utf8(payload)?;
    Ok(serde_json::from_str(text)?)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Bytes, CodecError> {
    let buf = serde_json::to_vec(value)?;

    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(buf.len()));
    }

    Ok(Bytes::from(buf))
}
