use std::io;

use anyhow::{Context, Result};

use script_sandbox::serve_lines;

use crate::config::Config;

/// Answers sandbox requests read from stdin until EOF.
pub async fn cmd_sandbox_worker(config: &Config) -> Result<()> {
    let sandbox = config.sandbox.clone();
    tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        let stdout = io::stdout();
        serve_lines(sandbox, stdin.lock(), stdout.lock())
    })
    .await
    .context("sandbox worker panicked")?
    .context("sandbox worker I/O failed")
}
