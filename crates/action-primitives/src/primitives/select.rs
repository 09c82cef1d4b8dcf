//! Select primitive - Pick an option from a dropdown

use crate::{
    driver::BrowserDriver,
    errors::ActionError,
    primitives::{behavior_pause, ensure_selector},
    types::{ActionReport, ExecCtx},
};
use chrono::Utc;
use serde_json::Value;
use std::time::Instant;
use tracing::info;

/// Execute select primitive
///
/// The driver matches `value` against option values first, then visible text.
/// The selected value becomes the action output.
pub async fn execute_select(
    driver: &dyn BrowserDriver,
    ctx: &ExecCtx,
    selector: &str,
    value: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        selector = %selector,
        item = %value,
        "Executing select primitive"
    );

    ensure_selector(selector)?;
    if value.is_empty() {
        return Err(ActionError::OptionNotFound(
            "Option value cannot be empty".to_string(),
        ));
    }
    if ctx.is_timeout() {
        return Err(ActionError::WaitTimeout(
            "Context deadline exceeded".to_string(),
        ));
    }

    behavior_pause(ctx).await;
    driver.select(ctx, selector, value).await?;

    Ok(ActionReport::success(started_at, start_instant).with_output(Value::String(value.to_string())))
}
