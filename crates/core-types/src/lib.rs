//! Shared primitives for browserflow runs: identifiers, progress events and
//! the run-control contracts consumed by the interpreter.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Shared error type for collaborators that have no richer error of their own.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("{message}")]
    Message { message: String },
}

impl CoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome requested by an explicit `stop` instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopOutcome {
    Success,
    Error,
}

impl StopOutcome {
    /// Parses the user-facing spelling; anything other than `error` is a success.
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("error") {
            StopOutcome::Error
        } else {
            StopOutcome::Success
        }
    }
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopOutcome::Success => f.write_str("success"),
            StopOutcome::Error => f.write_str("error"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Running,
    Success,
    Error,
    Skipped,
}

/// Per-action progress notification emitted while a run executes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: RunId,
    pub action_id: String,
    pub status: ProgressStatus,
    /// Index of the action in the program.
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        run_id: RunId,
        action_id: impl Into<String>,
        index: usize,
        status: ProgressStatus,
    ) -> Self {
        Self {
            run_id,
            action_id: action_id.into(),
            status,
            index,
            message: None,
            at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Sink for progress events. Delivery is best effort; a reporter must not fail the run.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, event: ProgressEvent);
}

/// External cancellation signal for a run.
#[async_trait]
pub trait StopChecker: Send + Sync {
    /// Returns true once when a stop was requested for `run_id`, clearing the request.
    async fn take_stop_request(&self, run_id: &RunId) -> bool;
}

/// Reporter that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

#[async_trait]
impl ProgressReporter for NoopProgress {
    async fn report(&self, _event: ProgressEvent) {}
}

/// Stop checker that never requests a stop.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverStop;

#[async_trait]
impl StopChecker for NeverStop {
    async fn take_stop_request(&self, _run_id: &RunId) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_outcome_parsing_defaults_to_success() {
        assert_eq!(StopOutcome::parse_lenient("error"), StopOutcome::Error);
        assert_eq!(StopOutcome::parse_lenient(" ERROR "), StopOutcome::Error);
        assert_eq!(StopOutcome::parse_lenient("success"), StopOutcome::Success);
        assert_eq!(StopOutcome::parse_lenient(""), StopOutcome::Success);
    }

    #[test]
    fn progress_event_serializes_lowercase_status() {
        let event = ProgressEvent::new(RunId("r1".into()), "a1", 3, ProgressStatus::Skipped);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["run_id"], "r1");
        assert!(json.get("message").is_none());
    }

    #[tokio::test]
    async fn defaults_are_inert() {
        let run = RunId::new();
        assert!(!NeverStop.take_stop_request(&run).await);
        NoopProgress
            .report(ProgressEvent::new(run, "x", 0, ProgressStatus::Running))
            .await;
    }
}
