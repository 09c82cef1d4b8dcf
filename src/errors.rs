//! Task runner error types

use action_flow::FlowError;
use action_primitives::ActionError;
use thiserror::Error;

/// Run-level failures returned to the caller.
///
/// Failures inside a program are handled by the interpreter and never
/// surface here.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// No browser session could be acquired
    #[error("Session acquisition failed: {0}")]
    Session(String),

    /// The task definition could not be read or validated
    #[error("Invalid task definition: {0}")]
    Task(String),

    #[error(transparent)]
    Program(#[from] FlowError),

    /// Writing the result bundle or an export failed
    #[error("Export failed: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ActionError> for RunnerError {
    fn from(err: ActionError) -> Self {
        RunnerError::Session(err.to_string())
    }
}

impl From<csv::Error> for RunnerError {
    fn from(err: csv::Error) -> Self {
        RunnerError::Export(err.to_string())
    }
}

impl From<serde_json::Error> for RunnerError {
    fn from(err: serde_json::Error) -> Self {
        RunnerError::Export(err.to_string())
    }
}
