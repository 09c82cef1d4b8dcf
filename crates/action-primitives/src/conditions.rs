//! Page-backed evaluation of free-form `if`/`while` expressions

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use action_flow::{FlowError, PageConditions};
use script_sandbox::{ExpressionRequest, ScriptSandbox};

use crate::driver::BrowserDriver;

/// Snapshots the page and evaluates the expression in the sandbox.
pub struct SnapshotConditions {
    driver: Arc<dyn BrowserDriver>,
    sandbox: Arc<dyn ScriptSandbox>,
}

impl SnapshotConditions {
    pub fn new(driver: Arc<dyn BrowserDriver>, sandbox: Arc<dyn ScriptSandbox>) -> Self {
        Self { driver, sandbox }
    }
}

#[async_trait]
impl PageConditions for SnapshotConditions {
    async fn evaluate(&self, expression: &str, block_output: &Value) -> Result<bool, FlowError> {
        let snapshot = self
            .driver
            .snapshot(false)
            .await
            .map_err(|err| FlowError::ConditionFailed(err.to_string()))?;
        let truth = self
            .sandbox
            .evaluate_expression(ExpressionRequest {
                expression: expression.to_string(),
                html: snapshot.html,
                url: snapshot.url,
                block_output: block_output.clone(),
            })
            .await
            .map_err(|err| FlowError::ConditionFailed(err.to_string()))?;
        debug!(expression, truth, "Evaluated page condition");
        Ok(truth)
    }
}
