//! Screenshot primitive

use crate::{
    driver::BrowserDriver,
    errors::ActionError,
    types::{ActionReport, ExecCtx},
};
use chrono::Utc;
use serde_json::Value;
use std::time::Instant;
use tracing::info;

/// Execute screenshot primitive; the stored image location is the output.
pub async fn execute_screenshot(
    driver: &dyn BrowserDriver,
    ctx: &ExecCtx,
    label: Option<&str>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(action_id = %ctx.action_id, label = ?label, "Executing screenshot primitive");

    let location = driver.screenshot(ctx, label).await?;

    info!(action_id = %ctx.action_id, location = %location, "Screenshot captured");
    Ok(ActionReport::success(started_at, start_instant).with_output(Value::String(location)))
}
