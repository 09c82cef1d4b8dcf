//! Start primitive - Launch another task as a sub-task

use crate::{
    errors::ActionError,
    launcher::TaskLauncher,
    types::{ActionReport, ExecCtx},
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::info;

/// Execute start primitive; the launcher's response is the output.
pub async fn execute_start(
    launcher: &dyn TaskLauncher,
    ctx: &ExecCtx,
    task_id: &str,
    variables: Map<String, Value>,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(ActionError::Launch("Task id cannot be empty".to_string()));
    }

    info!(
        action_id = %ctx.action_id,
        task_id = %task_id,
        "Starting sub-task"
    );

    let response = launcher.launch(task_id, variables).await?;

    Ok(ActionReport::success(started_at, start_instant).with_output(response))
}
