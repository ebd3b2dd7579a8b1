//! Test run command handlers (single and looped)

use super::{data_object, params, string_field, HandlerContext, HandlerError, HandlerResult};
use serde_json::{Map, Value};
use tracing::info;

/// Handle RunTest
pub async fn handle_run_test(ctx: &HandlerContext, data: &Value) -> HandlerResult {
    let params = params(data_object(data)?)?;
    let chip_type = string_field(&params, "chipName")?;
    let test_name = string_field(&params, "testName")?;

    info!(
        "[RunTest] test_id={} chip={} test={}",
        ctx.test_id, chip_type, test_name
    );

    let result = ctx.client.run_test(chip_type, test_name, &params).await?;
    Ok(serde_json::to_value(result)?)
}

/// Handle RunLoopTest
pub async fn handle_run_loop_test(ctx: &HandlerContext, data: &Value) -> HandlerResult {
    let data = data_object(data)?;
    let params = params(data)?;
    let chip_type = string_field(&params, "chipName")?;
    let test_name = string_field(&params, "testName")?;
    let iterations = iterations(data, ctx.max_iterations)?;

    info!(
        "[RunLoopTest] test_id={} chip={} test={} iterations={}",
        ctx.test_id, chip_type, test_name, iterations
    );

    Ok(ctx
        .client
        .run_loop_test(chip_type, test_name, &params, iterations)
        .await?)
}

/// `data.iterations`, defaulting to a single run and capped at `max`
fn iterations(data: &Map<String, Value>, max: u32) -> Result<u32, HandlerError> {
    let Some(value) = data.get("iterations") else {
        return Ok(1);
    };

    value
        .as_u64()
        .filter(|n| (1..=u64::from(max)).contains(n))
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| HandlerError::InvalidParameter {
            name: "iterations",
            reason: format!("expected an integer between 1 and {max}, got {value}"),
        })
}
