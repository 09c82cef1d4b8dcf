use clap::Subcommand;

use super::check::CheckArgs;
use super::config::ConfigArgs;
use super::extract::ExtractArgs;
use super::run::RunArgs;
use super::schema::SchemaArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run a task file against a static page session
    Run(RunArgs),

    /// Validate a task file and show its block structure
    Check(CheckArgs),

    /// Run an extraction script against an HTML document
    Extract(ExtractArgs),

    /// Print the JSON schema of action programs
    Schema(SchemaArgs),

    /// Manage BrowserFlow configuration
    Config(ConfigArgs),

    /// Show build and configuration information
    Info,

    /// Serve sandbox requests over stdin/stdout
    #[command(hide = true)]
    SandboxWorker,
}
