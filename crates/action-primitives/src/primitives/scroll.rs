//! Scroll primitive - Scroll page or element into view

use crate::{
    driver::BrowserDriver,
    errors::ActionError,
    primitives::ensure_selector,
    types::{ActionReport, ExecCtx, ScrollTarget},
};
use chrono::Utc;
use std::time::Instant;
use tracing::info;

/// Execute scroll primitive
///
/// Accepts the `scroll` action's resolved selector and amount; see
/// [`ScrollTarget::from_action`] for how they combine.
pub async fn execute_scroll(
    driver: &dyn BrowserDriver,
    ctx: &ExecCtx,
    selector: Option<&str>,
    amount: Option<&str>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    let target = ScrollTarget::from_action(selector, amount).map_err(ActionError::ScrollTargetInvalid)?;

    info!(
        action_id = %ctx.action_id,
        target = ?target,
        "Executing scroll primitive"
    );

    if let ScrollTarget::Element(selector) = &target {
        ensure_selector(selector)?;
    }

    driver.scroll(ctx, &target).await?;

    Ok(ActionReport::success(started_at, start_instant))
}
