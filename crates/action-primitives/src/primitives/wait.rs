//! Wait primitive - Explicit waits for elements or fixed durations

use crate::{
    driver::BrowserDriver,
    errors::ActionError,
    primitives::ensure_selector,
    types::{ActionReport, ExecCtx},
};
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Pause used when a `wait` names neither a selector nor a duration
pub const DEFAULT_WAIT_MS: u64 = 1_000;

/// Execute wait primitive
///
/// With a selector, waits until a matching element appears or the context
/// deadline passes. Otherwise sleeps for `duration` milliseconds.
pub async fn execute_wait(
    driver: &dyn BrowserDriver,
    ctx: &ExecCtx,
    selector: Option<&str>,
    duration: Option<&str>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        selector = ?selector,
        duration = ?duration,
        "Executing wait primitive"
    );

    match selector {
        Some(selector) => {
            ensure_selector(selector)?;
            debug!(timeout_ms = ctx.timeout_ms, "Waiting for selector");
            match timeout(ctx.remaining_time(), driver.wait_for_selector(ctx, selector)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(action_id = %ctx.action_id, selector = %selector, "Wait timed out");
                    return Err(ActionError::WaitTimeout(format!(
                        "`{selector}` did not appear within {}ms",
                        ctx.timeout_ms
                    )));
                }
            }
        }
        None => {
            let millis = parse_duration_ms(duration)?;
            debug!(millis, "Sleeping");
            sleep(Duration::from_millis(millis)).await;
        }
    }

    Ok(ActionReport::success(started_at, start_instant))
}

fn parse_duration_ms(duration: Option<&str>) -> Result<u64, ActionError> {
    match duration.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(DEFAULT_WAIT_MS),
        Some(text) => text
            .trim_end_matches("ms")
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map(|ms| ms.round() as u64)
            .ok_or_else(|| ActionError::Internal(format!("Invalid wait duration `{text}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration_ms(None).unwrap(), DEFAULT_WAIT_MS);
        assert_eq!(parse_duration_ms(Some(" 250 ")).unwrap(), 250);
        assert_eq!(parse_duration_ms(Some("75ms")).unwrap(), 75);
        assert!(parse_duration_ms(Some("-5")).is_err());
        assert!(parse_duration_ms(Some("soon")).is_err());
    }
}
