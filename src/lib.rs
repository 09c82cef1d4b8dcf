//! BrowserFlow library
//!
//! Task loading, end-to-end runs and result export on top of the
//! interpreter crates; exposed for the CLI and integration tests.

pub mod cli;
pub mod config;
pub mod errors;
pub mod export;
pub mod task_runner;

pub use config::{Config, DataFormat};
pub use errors::RunnerError;
pub use task_runner::{RunBundle, SessionProvider, StaticSessions, TaskDefinition, TaskRunner};
