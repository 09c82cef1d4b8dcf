//! Flow execution error types

use thiserror::Error;

/// Flow parsing and execution errors
#[derive(Debug, Error, Clone)]
pub enum FlowError {
    /// An action failed validation while the program was parsed
    #[error("Invalid action at index {index}: {reason}")]
    InvalidAction { index: usize, reason: String },

    /// A leaf action failed in the action executor
    #[error("Action {action} failed: {reason}")]
    ActionFailed { action: String, reason: String },

    /// Condition evaluation failed
    #[error("Condition evaluation failed: {0}")]
    ConditionFailed(String),

    /// Script sandbox failure surfaced to the interpreter
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// The executor does not handle this action kind
    #[error("Unsupported action: {0}")]
    Unsupported(String),

    /// A required variable or field was missing at run time
    #[error("Missing value: {0}")]
    MissingValue(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    pub fn action_failed(action: impl Into<String>, reason: impl ToString) -> Self {
        FlowError::ActionFailed {
            action: action.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid(index: usize, reason: impl Into<String>) -> Self {
        FlowError::InvalidAction {
            index,
            reason: reason.into(),
        }
    }
}
