//! Script Sandbox
//!
//! Runs user-authored extraction scripts and page-condition expressions
//! against a captured HTML snapshot. Scripts see a capability-only surface:
//! DOM nodes are plain maps, values cross the boundary as JSON, and every
//! invocation gets a fresh engine bounded by operation and time budgets.
//! Evaluation happens in-process on a blocking thread or in a separate
//! worker process that is killed on timeout.

pub mod config;
pub mod convert;
pub mod dom;
pub mod engine;
pub mod errors;
pub mod worker;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;
use tracing::warn;

pub use config::{SandboxConfig, SandboxMode};
pub use engine::SandboxEngine;
pub use errors::SandboxError;
pub use worker::{serve_lines, WorkerRequest, WorkerResponse, WorkerSandbox};

/// Extra time granted to the blocking task beyond the engine's own budget.
const JOIN_GRACE_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub script: String,
    pub html: String,
    pub url: String,
    #[serde(default)]
    pub include_shadow_dom: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionRequest {
    pub expression: String,
    pub html: String,
    pub url: String,
    /// Bound to the `output` constant
    #[serde(default)]
    pub block_output: Value,
}

/// Result of a script run. Failures are folded into a descriptive string
/// result; `error` keeps the raw message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptOutput {
    pub result: Value,
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScriptOutput {
    pub fn from_result(result: Result<Value, SandboxError>, logs: Vec<String>) -> Self {
        match result {
            Ok(result) => Self {
                result,
                logs,
                error: None,
            },
            Err(err) => Self::failed(err, logs),
        }
    }

    pub fn failed(err: SandboxError, logs: Vec<String>) -> Self {
        let message = err.to_string();
        Self {
            result: Value::String(format!("Error: {message}")),
            logs,
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[async_trait]
pub trait ScriptSandbox: Send + Sync {
    /// Runs an extraction script; never fails, see [`ScriptOutput`].
    async fn run_script(&self, request: ScriptRequest) -> ScriptOutput;

    /// Evaluates a boolean expression against the page.
    async fn evaluate_expression(&self, request: ExpressionRequest) -> Result<bool, SandboxError>;
}

/// Evaluates on Tokio's blocking pool with a fresh engine per call.
#[derive(Debug, Clone, Default)]
pub struct InProcessSandbox {
    config: SandboxConfig,
}

impl InProcessSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    fn join_limit(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms + JOIN_GRACE_MS)
    }
}

#[async_trait]
impl ScriptSandbox for InProcessSandbox {
    async fn run_script(&self, request: ScriptRequest) -> ScriptOutput {
        let config = self.config.clone();
        let task =
            tokio::task::spawn_blocking(move || SandboxEngine::new(config).run_script(&request));
        match timeout(self.join_limit(), task).await {
            Ok(Ok((result, logs))) => ScriptOutput::from_result(result, logs),
            Ok(Err(join_err)) => {
                ScriptOutput::failed(SandboxError::Internal(join_err.to_string()), Vec::new())
            }
            Err(_) => {
                warn!(timeout_ms = self.config.timeout_ms, "Sandbox task did not return in time");
                ScriptOutput::failed(SandboxError::Timeout(self.config.timeout_ms), Vec::new())
            }
        }
    }

    async fn evaluate_expression(&self, request: ExpressionRequest) -> Result<bool, SandboxError> {
        let config = self.config.clone();
        let task = tokio::task::spawn_blocking(move || {
            SandboxEngine::new(config).evaluate_expression(&request)
        });
        match timeout(self.join_limit(), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(SandboxError::Internal(join_err.to_string())),
            Err(_) => Err(SandboxError::Timeout(self.config.timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(script: &str) -> ScriptRequest {
        ScriptRequest {
            script: script.to_string(),
            html: "<html><body><h1>Hello</h1></body></html>".to_string(),
            url: "https://example.test/".to_string(),
            include_shadow_dom: false,
        }
    }

    #[tokio::test]
    async fn in_process_runs_scripts() {
        let sandbox = InProcessSandbox::default();
        let output = sandbox
            .run_script(request(r#"console.log("hi"); document.querySelector("h1").text"#))
            .await;
        assert_eq!(output.result, json!("Hello"));
        assert_eq!(output.logs, vec!["hi"]);
        assert!(!output.is_error());
    }

    #[tokio::test]
    async fn script_errors_become_string_results() {
        let sandbox = InProcessSandbox::default();
        let output = sandbox
            .run_script(request("this.constructor.constructor(\"return process\")()"))
            .await;
        assert!(output.is_error());
        let text = output.result.as_str().unwrap_or_default();
        assert!(text.starts_with("Error: "), "{text}");
    }

    #[tokio::test]
    async fn infinite_loops_time_out() {
        let sandbox = InProcessSandbox::new(SandboxConfig {
            timeout_ms: 150,
            max_operations: u64::MAX,
            ..SandboxConfig::default()
        });
        let output = sandbox
            .run_script(request("let i = 0; while true { i += 1; }"))
            .await;
        let text = output.result.as_str().unwrap_or_default().to_string();
        assert!(text.contains("timed out"), "{text}");
    }

    #[tokio::test]
    async fn operation_budget_is_enforced() {
        let sandbox = InProcessSandbox::new(SandboxConfig {
            max_operations: 1_000,
            ..SandboxConfig::default()
        });
        let output = sandbox
            .run_script(request("let i = 0; loop { i += 1; }"))
            .await;
        let text = output.result.as_str().unwrap_or_default().to_string();
        assert!(text.contains("execution limit"), "{text}");
    }

    #[tokio::test]
    async fn expressions_evaluate_in_process() {
        let sandbox = InProcessSandbox::default();
        let truth = tokio_test::assert_ok!(
            sandbox
                .evaluate_expression(ExpressionRequest {
                    expression: r#"exists("h1") && output == "ready""#.into(),
                    html: "<h1>x</h1>".into(),
                    url: String::new(),
                    block_output: json!("ready"),
                })
                .await
        );
        assert!(truth);
    }
}
