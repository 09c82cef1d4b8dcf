//! Javascript primitive - Run an extraction script against the page snapshot

use crate::{
    driver::BrowserDriver,
    errors::ActionError,
    types::{ActionReport, ExecCtx},
};
use chrono::Utc;
use script_sandbox::{ScriptOutput, ScriptRequest, ScriptSandbox};
use std::time::Instant;
use tracing::{info, warn};

/// Execute javascript primitive
///
/// Steps:
/// 1. Snapshot the current page
/// 2. Run the script in the sandbox
/// 3. Return the sandbox output; script failures are already folded into a
///    descriptive string result and do not fail the action
pub async fn execute_script(
    driver: &dyn BrowserDriver,
    sandbox: &dyn ScriptSandbox,
    ctx: &ExecCtx,
    script: &str,
    include_shadow_dom: bool,
) -> Result<(ActionReport, ScriptOutput), ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        script_length = script.len(),
        include_shadow_dom,
        "Executing javascript primitive"
    );

    // 1. Snapshot
    let snapshot = driver.snapshot(include_shadow_dom).await?;

    // 2. Sandbox
    let output = sandbox
        .run_script(ScriptRequest {
            script: script.to_string(),
            html: snapshot.html,
            url: snapshot.url,
            include_shadow_dom,
        })
        .await;

    if let Some(error) = &output.error {
        warn!(action_id = %ctx.action_id, error = %error, "Script reported an error");
    }

    let report = ActionReport::success(started_at, start_instant).with_output(output.result.clone());
    Ok((report, output))
}
