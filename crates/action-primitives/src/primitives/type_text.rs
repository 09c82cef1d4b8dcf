//! Type and key-press primitives

use crate::{
    driver::BrowserDriver,
    errors::ActionError,
    primitives::{behavior_pause, ensure_selector},
    types::{ActionReport, ExecCtx},
};
use action_flow::TypeMode;
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, info};

/// Execute type primitive
///
/// Steps:
/// 1. Validate selector and deadline
/// 2. Optional human-like pause
/// 3. Replace or append the field content through the driver
pub async fn execute_type_text(
    driver: &dyn BrowserDriver,
    ctx: &ExecCtx,
    selector: &str,
    text: &str,
    mode: TypeMode,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        selector = %selector,
        text_length = text.chars().count(),
        mode = ?mode,
        "Executing type primitive"
    );

    ensure_selector(selector)?;
    if ctx.is_timeout() {
        return Err(ActionError::WaitTimeout(
            "Context deadline exceeded".to_string(),
        ));
    }

    behavior_pause(ctx).await;
    if ctx.behavior.typos {
        debug!(action_id = %ctx.action_id, "Typo simulation requested from driver");
    }
    driver.type_text(ctx, selector, text, mode).await?;

    Ok(ActionReport::success(started_at, start_instant))
}

/// Execute press primitive
///
/// Focuses `selector` first when given.
pub async fn execute_press(
    driver: &dyn BrowserDriver,
    ctx: &ExecCtx,
    key: &str,
    selector: Option<&str>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        key = %key,
        selector = ?selector,
        "Executing press primitive"
    );

    let key = key.trim();
    if key.is_empty() {
        return Err(ActionError::Internal("Key cannot be empty".to_string()));
    }
    if let Some(selector) = selector {
        ensure_selector(selector)?;
    }

    driver.press(ctx, key, selector).await?;

    Ok(ActionReport::success(started_at, start_instant))
}
