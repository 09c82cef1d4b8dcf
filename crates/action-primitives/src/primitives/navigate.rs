//! Navigate primitive - Load a URL in the current page

use crate::{
    driver::BrowserDriver,
    errors::ActionError,
    types::{ActionReport, ExecCtx},
};
use chrono::Utc;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};
use url::Url;

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "file", "about", "data"];

/// Execute navigate primitive
///
/// Steps:
/// 1. Validate URL format and scheme
/// 2. Check the deadline
/// 3. Navigate through the driver
/// 4. Report the URL the page settled on
pub async fn execute_navigate(
    driver: &dyn BrowserDriver,
    ctx: &ExecCtx,
    url: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        url = %url,
        "Executing navigate primitive"
    );

    // 1. Validate URL
    let parsed = validate_url(url)?;

    // 2. Check context
    if ctx.is_timeout() {
        return Err(ActionError::Navigation(
            "Context deadline exceeded".to_string(),
        ));
    }

    // 3. Navigate
    debug!(scheme = parsed.scheme(), "Issuing navigation");
    driver.navigate(ctx, parsed.as_str()).await?;

    // 4. Capture final URL
    let final_url = driver.current_url().await?;

    let report = ActionReport::success(started_at, start_instant).with_output(Value::String(final_url));
    info!(
        action_id = %ctx.action_id,
        latency_ms = report.latency_ms,
        "Navigation completed successfully"
    );
    Ok(report)
}

fn validate_url(url: &str) -> Result<Url, ActionError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(ActionError::Navigation("URL cannot be empty".to_string()));
    }
    let parsed = Url::parse(trimmed)
        .map_err(|err| ActionError::Navigation(format!("Invalid URL `{trimmed}`: {err}")))?;
    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(ActionError::Navigation(format!(
            "Invalid URL scheme: {}",
            parsed.scheme()
        )));
    }
    Ok(parsed)
}
