//! Click and hover primitives

use crate::{
    driver::BrowserDriver,
    errors::ActionError,
    primitives::{behavior_pause, ensure_selector},
    types::{ActionReport, ExecCtx},
};
use chrono::Utc;
use std::time::Instant;
use tracing::info;

/// Execute click primitive
///
/// Steps:
/// 1. Validate the selector and deadline
/// 2. Optional human-like pause
/// 3. Click through the driver
pub async fn execute_click(
    driver: &dyn BrowserDriver,
    ctx: &ExecCtx,
    selector: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        selector = %selector,
        "Executing click primitive"
    );

    ensure_selector(selector)?;
    if ctx.is_timeout() {
        return Err(ActionError::WaitTimeout(
            "Context deadline exceeded".to_string(),
        ));
    }

    behavior_pause(ctx).await;
    driver.click(ctx, selector).await?;

    let report = ActionReport::success(started_at, start_instant);
    info!(
        action_id = %ctx.action_id,
        latency_ms = report.latency_ms,
        "Click completed successfully"
    );
    Ok(report)
}

/// Execute hover primitive
pub async fn execute_hover(
    driver: &dyn BrowserDriver,
    ctx: &ExecCtx,
    selector: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        selector = %selector,
        "Executing hover primitive"
    );

    ensure_selector(selector)?;
    behavior_pause(ctx).await;
    driver.hover(ctx, selector).await?;

    Ok(ActionReport::success(started_at, start_instant))
}
