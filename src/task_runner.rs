//! Task definitions and the end-to-end task runner
//!
//! A run acquires a browser session, interprets the task's actions, snapshots
//! the final page, runs the optional extraction script and releases the
//! session again, whatever the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use action_flow::{
    Action, FlowExecutor, FlowInterpreter, InterpreterOptions, RunReport, RuntimeVars, Termination,
};
use action_primitives::{
    BrowserDriver, DisabledLauncher, ExecCtx, PrimitiveExecutor, SnapshotConditions,
    StaticPageDriver, TaskLauncher,
};
use browserflow_core_types::{
    NeverStop, NoopProgress, ProgressReporter, RunId, StopChecker, StopOutcome,
};
use script_sandbox::{ScriptRequest, ScriptSandbox};

use crate::config::DataFormat;
use crate::errors::RunnerError;

/// A stored automation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub actions: Vec<Action>,
    /// Initial run variables
    #[serde(default)]
    pub variables: Map<String, Value>,
    /// Script run against the final page; its result becomes `data`
    #[serde(default)]
    pub extract_script: Option<String>,
    #[serde(default)]
    pub include_shadow_dom: bool,
    #[serde(default)]
    pub output_format: Option<DataFormat>,
    #[serde(default)]
    pub capture_screenshot: bool,
}

impl TaskDefinition {
    pub fn from_actions(actions: Vec<Action>) -> Self {
        Self {
            id: None,
            name: None,
            actions,
            variables: Map::new(),
            extract_script: None,
            include_shadow_dom: false,
            output_format: None,
            capture_screenshot: false,
        }
    }

    /// Parses a task from YAML or JSON text.
    ///
    /// A bare array is accepted as a task with only `actions`.
    pub fn parse(text: &str) -> Result<Self, RunnerError> {
        let raw: Value =
            serde_yaml::from_str(text).map_err(|err| RunnerError::Task(err.to_string()))?;
        let raw = match raw {
            Value::Array(actions) => {
                let mut task = Map::new();
                task.insert("actions".into(), Value::Array(actions));
                Value::Object(task)
            }
            other => other,
        };
        serde_json::from_value(raw).map_err(|err| RunnerError::Task(err.to_string()))
    }

    pub async fn load(path: &Path) -> Result<Self, RunnerError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| RunnerError::Task(format!("cannot read {}: {err}", path.display())))?;
        Self::parse(&text)
    }

    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("unnamed task")
    }
}

/// Supplies a browser session for a run.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self, task: &TaskDefinition) -> Result<Arc<dyn BrowserDriver>, RunnerError>;
}

/// Serves every run from a fixed HTML document.
#[derive(Debug, Clone)]
pub enum StaticSessions {
    File(PathBuf),
    Inline { url: String, html: String },
}

impl StaticSessions {
    pub fn blank() -> Self {
        Self::blank_at("about:blank")
    }

    /// An empty document reported under `url`
    pub fn blank_at(url: impl Into<String>) -> Self {
        StaticSessions::Inline {
            url: url.into(),
            html: "<html><head></head><body></body></html>".to_string(),
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSessions {
    async fn acquire(&self, _task: &TaskDefinition) -> Result<Arc<dyn BrowserDriver>, RunnerError> {
        let driver = match self {
            StaticSessions::File(path) => StaticPageDriver::from_file(path)?,
            StaticSessions::Inline { url, html } => StaticPageDriver::new(url.clone(), html.clone()),
        };
        Ok(Arc::new(driver))
    }
}

/// Everything a finished run hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunBundle {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub success: bool,
    pub termination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_outcome: Option<StopOutcome>,
    pub logs: Vec<String>,
    pub data: Value,
    pub html: String,
    pub screenshot_url: Option<String>,
    pub variables: Map<String, Value>,
    pub steps: u64,
    pub failed_actions: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
}

pub struct TaskRunner {
    sessions: Arc<dyn SessionProvider>,
    sandbox: Arc<dyn ScriptSandbox>,
    launcher: Arc<dyn TaskLauncher>,
    progress: Arc<dyn ProgressReporter>,
    stop: Arc<dyn StopChecker>,
    options: InterpreterOptions,
}

impl TaskRunner {
    pub fn new(sessions: Arc<dyn SessionProvider>, sandbox: Arc<dyn ScriptSandbox>) -> Self {
        Self {
            sessions,
            sandbox,
            launcher: Arc::new(DisabledLauncher),
            progress: Arc::new(NoopProgress),
            stop: Arc::new(NeverStop),
            options: InterpreterOptions::default(),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn TaskLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_stop_checker(mut self, stop: Arc<dyn StopChecker>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_options(mut self, options: InterpreterOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs `task` to completion.
    ///
    /// Only session acquisition is fatal; everything after it degrades into
    /// log entries so the bundle is always produced.
    pub async fn run(&self, run_id: &RunId, task: &TaskDefinition) -> Result<RunBundle, RunnerError> {
        info!(run_id = %run_id, task = task.label(), actions = task.actions.len(), "Starting task run");
        let driver = self.sessions.acquire(task).await?;

        let executor = PrimitiveExecutor::new(driver.clone(), self.sandbox.clone())
            .with_launcher(self.launcher.clone())
            .with_shadow_dom(task.include_shadow_dom);
        let conditions = SnapshotConditions::new(driver.clone(), self.sandbox.clone());
        let interpreter = FlowInterpreter::new(Arc::new(executor), Arc::new(conditions))
            .with_progress(self.progress.clone())
            .with_stop_checker(self.stop.clone())
            .with_options(self.options.clone());

        let variables = RuntimeVars::from_map(task.variables.clone());
        let mut report = interpreter.execute(run_id, &task.actions, variables).await;

        let (html, data, screenshot_url) = if report.termination == Termination::Cancelled {
            (String::new(), Value::Object(report.variables.clone()), None)
        } else {
            self.collect_results(driver.as_ref(), task, &mut report).await
        };

        if let Err(err) = driver.close().await {
            warn!(run_id = %run_id, error = %err, "Failed to close browser session");
        }

        let bundle = RunBundle {
            run_id: run_id.to_string(),
            task_id: task.id.clone(),
            success: report.is_success(),
            termination: termination_label(report.termination).to_string(),
            stop_outcome: report.stop_outcome,
            logs: report.logs,
            data,
            html,
            screenshot_url,
            variables: report.variables,
            steps: report.steps,
            failed_actions: report.failed_actions,
            started_at: report.started_at,
            finished_at: Utc::now(),
            latency_ms: report.latency_ms,
        };
        info!(
            run_id = %run_id,
            success = bundle.success,
            termination = %bundle.termination,
            steps = bundle.steps,
            "Task run finished"
        );
        Ok(bundle)
    }

    async fn collect_results(
        &self,
        driver: &dyn BrowserDriver,
        task: &TaskDefinition,
        report: &mut RunReport,
    ) -> (String, Value, Option<String>) {
        let snapshot = match driver.snapshot(task.include_shadow_dom).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log_warning(&mut report.logs, format!("Final snapshot failed: {err}"));
                None
            }
        };

        let data = match (&task.extract_script, &snapshot) {
            (Some(script), Some(snapshot)) => {
                let output = self
                    .sandbox
                    .run_script(ScriptRequest {
                        script: script.clone(),
                        html: snapshot.html.clone(),
                        url: snapshot.url.clone(),
                        include_shadow_dom: task.include_shadow_dom,
                    })
                    .await;
                report
                    .logs
                    .extend(output.logs.iter().map(|line| format!("console: {line}")));
                if let Some(error) = &output.error {
                    log_warning(&mut report.logs, format!("Extraction script failed: {error}"));
                }
                output.result
            }
            _ => Value::Object(report.variables.clone()),
        };

        let screenshot_url = if task.capture_screenshot {
            let ctx = ExecCtx::new("final-screenshot", None, self.options.behavior);
            match driver.screenshot(&ctx, Some("final")).await {
                Ok(location) => Some(location),
                Err(err) => {
                    log_warning(&mut report.logs, format!("Final screenshot failed: {err}"));
                    None
                }
            }
        } else {
            None
        };

        let html = snapshot.map(|snapshot| snapshot.html).unwrap_or_default();
        (html, data, screenshot_url)
    }
}

fn log_warning(logs: &mut Vec<String>, message: String) {
    warn!("{message}");
    logs.push(message);
}

fn termination_label(termination: Termination) -> &'static str {
    match termination {
        Termination::Completed => "completed",
        Termination::Stopped => "stopped",
        Termination::Cancelled => "cancelled",
        Termination::StepLimit => "step_limit",
        Termination::ErrorHandlerFinished => "error_handler_finished",
    }
}
