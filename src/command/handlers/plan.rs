//! Test plan handler

use super::{data_object, HandlerContext, HandlerError, HandlerResult};
use serde_json::Value;
use tracing::info;

/// Handle RunTestPlan
///
/// The plan's steps are looked up in the catalog and handed to the test
/// system as `params.tests`.
pub async fn handle_run_test_plan(ctx: &HandlerContext, data: &Value) -> HandlerResult {
    let data = data_object(data)?;
    let plan_name = match data.get("planName") {
        Some(Value::String(name)) if !name.is_empty() => name.as_str(),
        other => {
            return Err(HandlerError::InvalidParameter {
                name: "planName",
                reason: format!("expected a plan name, got {}", other.unwrap_or(&Value::Null)),
            });
        }
    };
    let mut params = super::params(data)?;

    let plan = ctx
        .catalog
        .fetch_from_db(&format!("plans/{plan_name}"))
        .await?;
    let steps = plan.get("tests").cloned().unwrap_or(Value::Array(Vec::new()));

    info!(
        "[RunTestPlan] test_id={} plan={} steps={}",
        ctx.test_id,
        plan_name,
        steps.as_array().map_or(0, Vec::len)
    );

    params.insert("tests".into(), steps);
    Ok(ctx.client.run_test_plan(plan_name, &params).await?)
}
