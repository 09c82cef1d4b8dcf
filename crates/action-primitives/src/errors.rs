//! Error types for action primitives

use action_flow::FlowError;
use thiserror::Error;

/// Failures raised while executing a leaf action
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// Navigation failed or timed out
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Wait operation timed out
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// Operation was cancelled or interrupted
    #[error("Operation interrupted: {0}")]
    Interrupted(String),

    /// No element matched the selector
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Selector could not be parsed
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// Dropdown option was not found
    #[error("Option not found in dropdown: {0}")]
    OptionNotFound(String),

    /// Scroll target is invalid or unreachable
    #[error("Scroll target invalid: {0}")]
    ScrollTargetInvalid(String),

    /// Browser driver communication error
    #[error("Driver error: {0}")]
    Driver(String),

    /// Data action (`set`, `merge`, `csv`) failed
    #[error("Data error: {0}")]
    Data(String),

    /// Sub-task could not be started
    #[error("Sub-task launch failed: {0}")]
    Launch(String),

    /// The action kind is not a leaf this executor handles
    #[error("Unsupported action: {0}")]
    Unsupported(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::WaitTimeout(_) | ActionError::ElementNotFound(_) | ActionError::Driver(_)
        )
    }
}

impl From<ActionError> for FlowError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Unsupported(kind) => FlowError::Unsupported(kind),
            ActionError::Internal(message) => FlowError::Internal(message),
            other => FlowError::ActionFailed {
                action: action_label(&other).to_string(),
                reason: other.to_string(),
            },
        }
    }
}

fn action_label(err: &ActionError) -> &'static str {
    match err {
        ActionError::Navigation(_) => "navigate",
        ActionError::WaitTimeout(_) => "wait",
        ActionError::OptionNotFound(_) => "select",
        ActionError::ScrollTargetInvalid(_) => "scroll",
        ActionError::Data(_) => "data",
        ActionError::Launch(_) => "start",
        _ => "browser",
    }
}
