//! Per-run execution state.
//!
//! Everything the interpreter mutates while stepping a program lives in one
//! [`ExecutionFrame`]: it is created fresh for each run, passed explicitly
//! through the loop and serialisable for debugging.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use browserflow_core_types::StopOutcome;

use crate::vars::RuntimeVars;

/// Loop bookkeeping keyed by the block-start index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoopState {
    Repeat { remaining: i64 },
    Foreach { items: Vec<Value>, index: usize },
}

/// Body of the registered `on_error` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorHandler {
    pub start: usize,
    pub end: usize,
}

/// User-visible run log; every entry is mirrored to `tracing`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RunLog {
    entries: Vec<String>,
}

impl RunLog {
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "browserflow::run", "{}", message);
        self.entries.push(message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "browserflow::run", "{}", message);
        self.entries.push(message);
    }

    /// Appends lines produced elsewhere (e.g. script console output).
    pub fn extend<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        for line in lines {
            self.info(line);
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionFrame {
    /// Index of the next action
    pub pc: usize,
    pub steps: u64,
    pub max_steps: u64,
    pub loops: BTreeMap<usize, LoopState>,
    pub handler: Option<ErrorHandler>,
    pub in_error_handler: bool,
    pub stop: Option<StopOutcome>,
    pub failures: usize,
    pub vars: RuntimeVars,
    pub log: RunLog,
}

impl ExecutionFrame {
    pub fn new(vars: RuntimeVars, max_steps: u64) -> Self {
        Self {
            pc: 0,
            steps: 0,
            max_steps,
            loops: BTreeMap::new(),
            handler: None,
            in_error_handler: false,
            stop: None,
            failures: 0,
            vars,
            log: RunLog::default(),
        }
    }

    /// Step ceiling for a program: `max(len * per_action, floor)`.
    pub fn step_budget(action_count: usize, per_action: u64, floor: u64) -> u64 {
        (action_count as u64).saturating_mul(per_action).max(floor)
    }

    /// Registers the error handler unless the handler is already running.
    pub fn register_handler(&mut self, handler: ErrorHandler) {
        if !self.in_error_handler {
            self.handler = Some(handler);
        }
    }

    /// Records a failure and returns the handler entry point when the
    /// one-shot handler is still available.
    pub fn take_handler(&mut self) -> Option<usize> {
        self.failures += 1;
        match self.handler {
            Some(handler) if !self.in_error_handler => {
                self.in_error_handler = true;
                Some(handler.start)
            }
            _ => None,
        }
    }

    /// True once execution inside the handler moved beyond its `end`.
    pub fn handler_finished(&self) -> bool {
        match self.handler {
            Some(handler) if self.in_error_handler => self.pc > handler.end,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_budget_has_a_floor() {
        assert_eq!(ExecutionFrame::step_budget(10, 20, 1000), 1000);
        assert_eq!(ExecutionFrame::step_budget(100, 20, 1000), 2000);
        assert_eq!(ExecutionFrame::step_budget(0, 20, 1000), 1000);
    }

    #[test]
    fn handler_is_one_shot() {
        let mut frame = ExecutionFrame::new(RuntimeVars::new(), 100);
        assert_eq!(frame.take_handler(), None);

        frame.register_handler(ErrorHandler { start: 3, end: 5 });
        assert_eq!(frame.take_handler(), Some(3));
        assert!(frame.in_error_handler);
        assert_eq!(frame.take_handler(), None);
        assert_eq!(frame.failures, 3);

        frame.register_handler(ErrorHandler { start: 9, end: 12 });
        assert_eq!(frame.handler, Some(ErrorHandler { start: 3, end: 5 }));

        frame.pc = 5;
        assert!(!frame.handler_finished());
        frame.pc = 6;
        assert!(frame.handler_finished());
    }

    #[test]
    fn frame_serializes_loop_state() {
        let mut frame = ExecutionFrame::new(RuntimeVars::new(), 10);
        frame.loops.insert(2, LoopState::Repeat { remaining: 1 });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["loops"]["2"]["kind"], "repeat");
        assert_eq!(json["loops"]["2"]["remaining"], 1);
    }
}
