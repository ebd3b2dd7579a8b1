//! Test inventory handler

use super::{HandlerContext, HandlerResult};
use serde_json::Value;
use tracing::info;

/// Handle GetAllTests
pub async fn handle_get_all_tests(ctx: &HandlerContext, _data: &Value) -> HandlerResult {
    let tests = ctx.client.get_all_tests().await?;
    info!("[GetAllTests] {} tests available", tests.len());
    Ok(Value::Array(tests))
}
