//! Flow interpreter: steps a program counter through a flat action list.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use browserflow_core_types::{
    NeverStop, NoopProgress, ProgressEvent, ProgressReporter, ProgressStatus, RunId,
    StopChecker, StopOutcome,
};

use crate::block_map::{BlockMap, StructureDiagnostic};
use crate::condition::evaluate as evaluate_structured;
use crate::context::{ActionContext, ActionExecutor, BehaviorFlags, PageConditions};
use crate::errors::FlowError;
use crate::frame::{ErrorHandler, ExecutionFrame, LoopState};
use crate::types::{Action, ActionKind, Condition, ForeachSource};
use crate::vars::{parse_value, RuntimeVars, BLOCK_OUTPUT};

/// Flow executor trait
#[async_trait]
pub trait FlowExecutor: Send + Sync {
    /// Run a validated program to termination.
    async fn execute(&self, run_id: &RunId, actions: &[Action], variables: RuntimeVars)
        -> RunReport;

    /// Structural diagnostics for a program; never blocks execution.
    fn validate_flow(&self, actions: &[Action]) -> Vec<StructureDiagnostic>;
}

/// Why a run stopped stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Program counter ran off the end of the list
    Completed,
    /// A `stop` instruction executed
    Stopped,
    /// External stop request observed
    Cancelled,
    /// Step ceiling exceeded
    StepLimit,
    /// Execution left the body of the error handler
    ErrorHandlerFinished,
}

#[derive(Debug, Clone)]
pub struct InterpreterOptions {
    pub steps_per_action: u64,
    pub min_max_steps: u64,
    pub behavior: BehaviorFlags,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            steps_per_action: 20,
            min_max_steps: 1000,
            behavior: BehaviorFlags::default(),
        }
    }
}

/// Outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub termination: Termination,
    pub stop_outcome: Option<StopOutcome>,
    pub logs: Vec<String>,
    pub variables: Map<String, Value>,
    pub steps: u64,
    pub failed_actions: usize,
    pub diagnostics: Vec<StructureDiagnostic>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
}

impl RunReport {
    pub fn new(run_id: RunId) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            termination: Termination::Completed,
            stop_outcome: None,
            logs: Vec::new(),
            variables: Map::new(),
            steps: 0,
            failed_actions: 0,
            diagnostics: Vec::new(),
            started_at: now,
            finished_at: now,
            latency_ms: 0,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<StructureDiagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Copy the final state of an execution frame
    pub fn with_frame(mut self, frame: ExecutionFrame, termination: Termination) -> Self {
        self.termination = termination;
        self.stop_outcome = frame.stop;
        self.steps = frame.steps;
        self.failed_actions = frame.failures;
        self.variables = frame.vars.into_map();
        self.logs = frame.log.into_entries();
        self
    }

    /// Set finish time and calculate latency
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.latency_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        self
    }

    /// Completed normally or stopped with a success outcome.
    pub fn is_success(&self) -> bool {
        match self.termination {
            Termination::Completed => true,
            Termination::Stopped => self.stop_outcome != Some(StopOutcome::Error),
            _ => false,
        }
    }
}

/// Default interpreter over pluggable collaborators.
pub struct FlowInterpreter {
    executor: Arc<dyn ActionExecutor>,
    conditions: Arc<dyn PageConditions>,
    progress: Arc<dyn ProgressReporter>,
    stop: Arc<dyn StopChecker>,
    options: InterpreterOptions,
}

impl FlowInterpreter {
    pub fn new(executor: Arc<dyn ActionExecutor>, conditions: Arc<dyn PageConditions>) -> Self {
        Self {
            executor,
            conditions,
            progress: Arc::new(NoopProgress),
            stop: Arc::new(NeverStop),
            options: InterpreterOptions::default(),
        }
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

    async fn report(
        &self,
        run_id: &RunId,
        action: &Action,
        index: usize,
        status: ProgressStatus,
        message: Option<String>,
    ) {
        let mut event = ProgressEvent::new(run_id.clone(), action.label(index), index, status);
        if let Some(message) = message {
            event = event.with_message(message);
        }
        self.progress.report(event).await;
    }

    /// Execute the instruction at `frame.pc` and move the counter.
    async fn step(
        &self,
        run_id: &RunId,
        actions: &[Action],
        blocks: &BlockMap,
        frame: &mut ExecutionFrame,
    ) {
        let index = frame.pc;
        let action = &actions[index];
        let past_end = blocks
            .end_of(index)
            .map(|end| end + 1)
            .unwrap_or(index + 1);

        if action.disabled && !matches!(action.kind, ActionKind::Else | ActionKind::End) {
            debug!(run_id = %run_id, index, action = action.name(), "Skipping disabled action");
            self.report(run_id, action, index, ProgressStatus::Skipped, None)
                .await;
            frame.pc = if action.kind.block_start().is_some() {
                past_end
            } else {
                index + 1
            };
            return;
        }

        match &action.kind {
            ActionKind::OnError => {
                let end = blocks.end_of(index).unwrap_or(actions.len());
                frame.register_handler(ErrorHandler {
                    start: index + 1,
                    end,
                });
                debug!(run_id = %run_id, start = index + 1, end, "Registered error handler");
                self.report(run_id, action, index, ProgressStatus::Success, None)
                    .await;
                frame.pc = end + 1;
            }

            ActionKind::If(condition) | ActionKind::While(condition) => {
                self.report(run_id, action, index, ProgressStatus::Running, None)
                    .await;
                let when_false = match action.kind {
                    ActionKind::If(_) => blocks.else_of(index).or(blocks.end_of(index)),
                    _ => blocks.end_of(index),
                }
                .map(|target| target + 1)
                .unwrap_or(index + 1);
                match self.evaluate_condition(condition, &frame.vars).await {
                    Ok(truth) => {
                        frame.vars.set(BLOCK_OUTPUT, Value::Bool(truth));
                        frame
                            .log
                            .info(format!("{} {}: {}", action.name(), action.label(index), truth));
                        self.report(run_id, action, index, ProgressStatus::Success, None)
                            .await;
                        frame.pc = if truth { index + 1 } else { when_false };
                    }
                    Err(err) => {
                        self.fail(run_id, action, index, frame, err, when_false)
                            .await
                    }
                }
            }

            ActionKind::Else => {
                frame.pc = blocks
                    .end_of_else(index)
                    .map(|end| end + 1)
                    .unwrap_or(index + 1);
            }

            ActionKind::Repeat { count } => {
                let remaining = parse_count(&frame.vars.resolve(count));
                self.report(run_id, action, index, ProgressStatus::Success, None)
                    .await;
                if remaining <= 0 {
                    frame.loops.remove(&index);
                    frame.log.info(format!("Repeat {}: no iterations", action.label(index)));
                    frame.pc = past_end;
                } else {
                    frame.loops.insert(index, LoopState::Repeat { remaining });
                    frame.vars.set(BLOCK_OUTPUT, Value::from(remaining));
                    frame.log.info(format!("Repeat: {remaining} remaining"));
                    frame.pc = index + 1;
                }
            }

            ActionKind::Foreach { source, var_name } => {
                self.report(run_id, action, index, ProgressStatus::Running, None)
                    .await;
                let items = match source {
                    ForeachSource::Selector(selector) => {
                        let selector = frame.vars.resolve(selector);
                        match self.executor.collect_items(&selector).await {
                            Ok(items) => items,
                            Err(err) => {
                                frame.loops.remove(&index);
                                self.fail(run_id, action, index, frame, err, past_end)
                                    .await;
                                return;
                            }
                        }
                    }
                    ForeachSource::Variable(reference) => items_from_variable(frame, reference),
                };
                self.report(run_id, action, index, ProgressStatus::Success, None)
                    .await;

                if items.is_empty() {
                    frame.loops.remove(&index);
                    frame.log.info("Foreach: no items");
                    frame.pc = past_end;
                } else {
                    frame
                        .loops
                        .insert(index, LoopState::Foreach { items, index: 0 });
                    bind_foreach_item(frame, index, var_name.as_deref());
                    frame.pc = index + 1;
                }
            }

            ActionKind::End => self.close_block(actions, blocks, frame, index),

            ActionKind::Stop { outcome } => {
                let outcome = StopOutcome::parse_lenient(&frame.vars.resolve(outcome));
                frame.log.info(format!("Stop requested by action: {outcome}"));
                frame.stop = Some(outcome);
                self.report(run_id, action, index, ProgressStatus::Success, None)
                    .await;
                frame.pc = index + 1;
            }

            _ => {
                self.report(run_id, action, index, ProgressStatus::Running, None)
                    .await;
                let mut ctx = ActionContext {
                    run_id,
                    index,
                    vars: &mut frame.vars,
                    log: &mut frame.log,
                    behavior: self.options.behavior,
                };
                match self.executor.execute(action, &mut ctx).await {
                    Ok(output) => {
                        if let Some(output) = output {
                            frame.vars.set(BLOCK_OUTPUT, output);
                        }
                        self.report(run_id, action, index, ProgressStatus::Success, None)
                            .await;
                        frame.pc = index + 1;
                    }
                    Err(err) => {
                        self.fail(run_id, action, index, frame, err, index + 1)
                            .await
                    }
                }
            }
        }

        if frame.pc != index + 1 {
            debug!(run_id = %run_id, from = index, to = frame.pc, "Jump");
        }
    }

    fn close_block(
        &self,
        actions: &[Action],
        blocks: &BlockMap,
        frame: &mut ExecutionFrame,
        index: usize,
    ) {
        let Some(start) = blocks.start_of(index) else {
            frame.pc = index + 1;
            return;
        };

        match &actions[start].kind {
            ActionKind::While(_) => frame.pc = start,
            ActionKind::Repeat { .. } => {
                let remaining = match frame.loops.get_mut(&start) {
                    Some(LoopState::Repeat { remaining }) => {
                        *remaining -= 1;
                        *remaining
                    }
                    _ => 0,
                };
                if remaining > 0 {
                    frame.vars.set(BLOCK_OUTPUT, Value::from(remaining));
                    frame.log.info(format!("Repeat: {remaining} remaining"));
                    frame.pc = start + 1;
                } else {
                    frame.loops.remove(&start);
                    frame.pc = index + 1;
                }
            }
            ActionKind::Foreach { var_name, .. } => {
                let more = match frame.loops.get_mut(&start) {
                    Some(LoopState::Foreach { items, index }) => {
                        *index += 1;
                        *index < items.len()
                    }
                    _ => false,
                };
                if more {
                    bind_foreach_item(frame, start, var_name.as_deref());
                    frame.pc = start + 1;
                } else {
                    frame.loops.remove(&start);
                    frame.pc = index + 1;
                }
            }
            _ => frame.pc = index + 1,
        }
    }

    async fn evaluate_condition(
        &self,
        condition: &Condition,
        vars: &RuntimeVars,
    ) -> Result<bool, FlowError> {
        match condition {
            Condition::Structured(structured) => Ok(evaluate_structured(structured, vars)),
            Condition::Expression(expression) => {
                let expression = vars.resolve(expression);
                self.conditions
                    .evaluate(&expression, &vars.block_output())
                    .await
            }
        }
    }

    /// Log and report a failure, then enter the error handler once.
    ///
    /// Without a handler the counter moves to `fallthrough`: the next
    /// instruction for leaves, past the construct for block starts.
    async fn fail(
        &self,
        run_id: &RunId,
        action: &Action,
        index: usize,
        frame: &mut ExecutionFrame,
        err: FlowError,
        fallthrough: usize,
    ) {
        warn!(run_id = %run_id, index, action = action.name(), error = %err, "Action failed");
        frame.log.warn(format!(
            "Action {} ({}) failed: {}",
            action.label(index),
            action.name(),
            err
        ));
        self.report(
            run_id,
            action,
            index,
            ProgressStatus::Error,
            Some(err.to_string()),
        )
        .await;

        match frame.take_handler() {
            Some(start) => {
                frame.log.info(format!("Entering error handler at action {start}"));
                frame.pc = start;
            }
            None => frame.pc = fallthrough,
        }
    }
}

#[async_trait]
impl FlowExecutor for FlowInterpreter {
    async fn execute(
        &self,
        run_id: &RunId,
        actions: &[Action],
        variables: RuntimeVars,
    ) -> RunReport {
        info!(run_id = %run_id, actions = actions.len(), "Executing program");

        let report = RunReport::new(run_id.clone());
        let blocks = BlockMap::build(actions);
        let max_steps = ExecutionFrame::step_budget(
            actions.len(),
            self.options.steps_per_action,
            self.options.min_max_steps,
        );
        let mut frame = ExecutionFrame::new(variables, max_steps);
        for diagnostic in blocks.diagnostics() {
            frame.log.warn(format!("Structure: {diagnostic}"));
        }

        let termination = loop {
            if frame.pc >= actions.len() {
                break Termination::Completed;
            }
            if self.stop.take_stop_request(run_id).await {
                frame.log.info("Stop requested, halting run");
                break Termination::Cancelled;
            }
            frame.steps += 1;
            if frame.steps > frame.max_steps {
                frame.log.warn(format!(
                    "Step limit of {} exceeded at action {}; aborting run (check loop conditions)",
                    frame.max_steps,
                    actions[frame.pc].label(frame.pc)
                ));
                break Termination::StepLimit;
            }

            self.step(run_id, actions, &blocks, &mut frame).await;

            if frame.stop.is_some() {
                break Termination::Stopped;
            }
            if frame.handler_finished() {
                frame.log.info("Error handler finished");
                break Termination::ErrorHandlerFinished;
            }
        };

        info!(
            run_id = %run_id,
            termination = ?termination,
            steps = frame.steps,
            failures = frame.failures,
            "Program finished"
        );

        report
            .with_diagnostics(blocks.diagnostics().to_vec())
            .with_frame(frame, termination)
            .finish()
    }

    fn validate_flow(&self, actions: &[Action]) -> Vec<StructureDiagnostic> {
        BlockMap::build(actions).diagnostics().to_vec()
    }
}

/// Iteration count from resolved text; anything non-numeric is zero.
fn parse_count(text: &str) -> i64 {
    match text.trim().parse::<f64>() {
        Ok(count) if count.is_finite() => count.trunc() as i64,
        _ => 0,
    }
}

fn items_from_variable(frame: &mut ExecutionFrame, reference: &str) -> Vec<Value> {
    match frame.vars.lookup_name_or_reference(reference) {
        Some(Value::Array(items)) => items,
        Some(Value::String(text)) => match parse_value(&text) {
            Value::Array(items) => items,
            _ => {
                frame
                    .log
                    .warn(format!("Foreach: {reference} is not a JSON array"));
                Vec::new()
            }
        },
        Some(_) => {
            frame.log.warn(format!("Foreach: {reference} is not an array"));
            Vec::new()
        }
        None => {
            frame.log.warn(format!("Foreach: {reference} is not defined"));
            Vec::new()
        }
    }
}

fn bind_foreach_item(frame: &mut ExecutionFrame, start: usize, var_name: Option<&str>) {
    let (item, position, count) = match frame.loops.get(&start) {
        Some(LoopState::Foreach { items, index }) => match items.get(*index) {
            Some(item) => (item.clone(), *index, items.len()),
            None => return,
        },
        _ => return,
    };
    frame.vars.bind_loop(position, count, &item);
    if let Some(name) = var_name {
        frame.vars.set(name, item);
    }
    frame
        .log
        .info(format!("Foreach: item {}/{}", position + 1, count));
}
