//! Running-test control handlers (abort, status)

use super::{HandlerContext, HandlerResult};
use serde_json::Value;
use tracing::info;

/// Handle AbortTest
///
/// The test to abort is identified by the command's `testId`.
pub async fn handle_abort_test(ctx: &HandlerContext, _data: &Value) -> HandlerResult {
    info!("[AbortTest] test_id={}", ctx.test_id);
    Ok(ctx.client.abort_test(&ctx.test_id).await?)
}

/// Handle TestStatus
pub async fn handle_test_status(ctx: &HandlerContext, _data: &Value) -> HandlerResult {
    info!("[TestStatus] test_id={}", ctx.test_id);
    Ok(ctx.client.test_status(&ctx.test_id).await?)
}
