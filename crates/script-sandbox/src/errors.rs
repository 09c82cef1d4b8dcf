//! Sandbox error types

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SandboxError {
    #[error("Compilation error: {0}")]
    Compile(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Stopped by the operation or time budget
    #[error("Script terminated: {0}")]
    Terminated(String),

    #[error("Script execution timed out after {0}ms")]
    Timeout(u64),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for SandboxError {
    fn from(err: std::io::Error) -> Self {
        SandboxError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SandboxError {
    fn from(err: serde_json::Error) -> Self {
        SandboxError::Worker(format!("malformed message: {err}"))
    }
}
