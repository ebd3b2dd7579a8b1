//! Command handlers for the different command types

mod control;
mod inventory;
mod plan;
mod run;

pub use control::{handle_abort_test, handle_test_status};
pub use inventory::handle_get_all_tests;
pub use plan::handle_run_test_plan;
pub use run::{handle_run_loop_test, handle_run_test};

use crate::testsystem::{CatalogError, TestCatalog, TestSystem, TestSystemError};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Errors a handler can raise; the dispatcher turns them into agent error signals
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(transparent)]
    TestSystem(#[from] TestSystemError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Failed to encode handler result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcome of a handler: the data carried by the success reply
pub type HandlerResult = Result<Value, HandlerError>;

/// Context passed to command handlers
#[derive(Clone)]
pub struct HandlerContext {
    pub test_id: String,
    pub client: Arc<dyn TestSystem>,
    pub catalog: Arc<dyn TestCatalog>,
    /// Largest `iterations` a RunLoopTest may ask for
    pub max_iterations: u32,
}

/// The command's `data`, which must be an object for handlers that read it
fn data_object(data: &Value) -> Result<&Map<String, Value>, HandlerError> {
    data.as_object().ok_or_else(|| HandlerError::InvalidParameter {
        name: "data",
        reason: format!("expected an object, got {data}"),
    })
}

/// `data.params`, or an empty map when absent
fn params(data: &Map<String, Value>) -> Result<Map<String, Value>, HandlerError> {
    match data.get("params") {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(params)) => Ok(params.clone()),
        Some(other) => Err(HandlerError::InvalidParameter {
            name: "params",
            reason: format!("expected an object, got {other}"),
        }),
    }
}

/// String field of a parameter map, defaulting to `""` when absent
fn string_field<'a>(
    map: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a str, HandlerError> {
    match map.get(name) {
        None | Some(Value::Null) => Ok(""),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(HandlerError::InvalidParameter {
            name,
            reason: format!("expected a string, got {other}"),
        }),
    }
}
