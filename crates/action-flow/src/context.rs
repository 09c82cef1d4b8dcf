//! Collaborator seams used by the interpreter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use browserflow_core_types::RunId;

use crate::errors::FlowError;
use crate::frame::RunLog;
use crate::types::Action;
use crate::vars::RuntimeVars;

/// Humanisation switches forwarded to the browser layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorFlags {
    /// Randomised pauses between interactions
    pub human_delays: bool,
    /// Occasional corrected typos while typing
    pub typos: bool,
    /// Idle pointer movement between actions
    pub idle_movement: bool,
}

/// Bundle handed to the action executor for one leaf action.
pub struct ActionContext<'a> {
    pub run_id: &'a RunId,
    pub index: usize,
    pub vars: &'a mut RuntimeVars,
    pub log: &'a mut RunLog,
    pub behavior: BehaviorFlags,
}

impl ActionContext<'_> {
    /// Template-resolves `text` against the run variables.
    pub fn resolve(&self, text: &str) -> String {
        self.vars.resolve(text)
    }
}

/// Executes leaf actions against the browser.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Performs one leaf action; `Some` results become `block.output`.
    async fn execute(
        &self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Option<Value>, FlowError>;

    /// Snapshot of the elements matching `selector`, for `foreach`.
    async fn collect_items(&self, selector: &str) -> Result<Vec<Value>, FlowError>;
}

/// Evaluates free-form condition expressions against live page state.
#[async_trait]
pub trait PageConditions: Send + Sync {
    async fn evaluate(&self, expression: &str, block_output: &Value) -> Result<bool, FlowError>;
}
