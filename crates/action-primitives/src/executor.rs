//! Leaf action executor over a [`BrowserDriver`]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use action_flow::{Action, ActionContext, ActionExecutor, ActionKind, FlowError};
use script_sandbox::ScriptSandbox;

use crate::driver::BrowserDriver;
use crate::errors::ActionError;
use crate::launcher::{DisabledLauncher, TaskLauncher};
use crate::primitives::*;
use crate::types::ExecCtx;

/// Executes every leaf action kind; block structure stays with the
/// interpreter.
pub struct PrimitiveExecutor {
    driver: Arc<dyn BrowserDriver>,
    sandbox: Arc<dyn ScriptSandbox>,
    launcher: Arc<dyn TaskLauncher>,
    include_shadow_dom: bool,
}

impl PrimitiveExecutor {
    pub fn new(driver: Arc<dyn BrowserDriver>, sandbox: Arc<dyn ScriptSandbox>) -> Self {
        Self {
            driver,
            sandbox,
            launcher: Arc::new(DisabledLauncher),
            include_shadow_dom: false,
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn TaskLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Expose open shadow roots to `javascript` actions
    pub fn with_shadow_dom(mut self, include: bool) -> Self {
        self.include_shadow_dom = include;
        self
    }

    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    async fn run(&self, action: &Action, ctx: &mut ActionContext<'_>) -> Result<Option<Value>, ActionError> {
        let exec = ExecCtx::new(action.label(ctx.index), action.timeout_ms, ctx.behavior);
        let driver = self.driver.as_ref();

        let report = match &action.kind {
            ActionKind::Navigate { url } => execute_navigate(driver, &exec, &ctx.resolve(url)).await?,
            ActionKind::Click { selector } => execute_click(driver, &exec, &ctx.resolve(selector)).await?,
            ActionKind::Hover { selector } => execute_hover(driver, &exec, &ctx.resolve(selector)).await?,
            ActionKind::Type { selector, text, mode } => {
                execute_type_text(driver, &exec, &ctx.resolve(selector), &ctx.resolve(text), *mode).await?
            }
            ActionKind::Press { key, selector } => {
                let selector = selector.as_deref().map(|s| ctx.resolve(s));
                execute_press(driver, &exec, &ctx.resolve(key), selector.as_deref()).await?
            }
            ActionKind::Select { selector, value } => {
                execute_select(driver, &exec, &ctx.resolve(selector), &ctx.resolve(value)).await?
            }
            ActionKind::Scroll { selector, amount } => {
                let selector = selector.as_deref().map(|s| ctx.resolve(s));
                let amount = amount.as_deref().map(|a| ctx.resolve(a));
                execute_scroll(driver, &exec, selector.as_deref(), amount.as_deref()).await?
            }
            ActionKind::Wait { selector, duration } => {
                let selector = selector.as_deref().map(|s| ctx.resolve(s));
                let duration = duration.as_deref().map(|d| ctx.resolve(d));
                execute_wait(driver, &exec, selector.as_deref(), duration.as_deref()).await?
            }
            ActionKind::Screenshot { label } => {
                let label = label.as_deref().map(|l| ctx.resolve(l));
                execute_screenshot(driver, &exec, label.as_deref()).await?
            }
            ActionKind::Javascript { script, var_name } => {
                let script = ctx.resolve(script);
                let (report, output) =
                    execute_script(driver, self.sandbox.as_ref(), &exec, &script, self.include_shadow_dom).await?;
                ctx.log.extend(output.logs.into_iter().map(|line| format!("console: {line}")));
                if let Some(error) = output.error {
                    ctx.log.warn(format!("Script error in {}: {error}", exec.action_id));
                }
                if let Some(name) = var_name {
                    ctx.vars.set(name.clone(), output.result);
                }
                report
            }
            ActionKind::Csv { text, var_name, delimiter } => {
                let text = ctx.resolve(text);
                execute_csv(ctx.vars, &text, *delimiter, var_name.as_deref())?
            }
            ActionKind::Merge { sources, var_name } => execute_merge(ctx.vars, sources, var_name)?,
            ActionKind::Set { var_name, value } => execute_set(ctx.vars, var_name, value)?,
            ActionKind::Start { task_id } => {
                let task_id = ctx.resolve(task_id);
                let report = execute_start(self.launcher.as_ref(), &exec, &task_id, ctx.vars.to_map()).await?;
                ctx.log.info(format!("Started sub-task {task_id}"));
                report
            }
            other => return Err(ActionError::Unsupported(other.name().to_string())),
        };

        debug!(
            action_id = %exec.action_id,
            latency_ms = report.latency_ms,
            has_output = report.output.is_some(),
            "Primitive finished"
        );
        Ok(report.output)
    }
}

#[async_trait]
impl ActionExecutor for PrimitiveExecutor {
    async fn execute(
        &self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Option<Value>, FlowError> {
        self.run(action, ctx).await.map_err(|err| match err {
            ActionError::Unsupported(_) | ActionError::Internal(_) => err.into(),
            other => FlowError::action_failed(action.name(), other),
        })
    }

    async fn collect_items(&self, selector: &str) -> Result<Vec<Value>, FlowError> {
        ensure_selector(selector).map_err(FlowError::from)?;
        self.driver
            .collect(selector)
            .await
            .map_err(|err| FlowError::action_failed("foreach", err))
    }
}
