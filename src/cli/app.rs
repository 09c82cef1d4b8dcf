use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};

use super::commands::Commands;
use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{init_logging, load_config, LoadedConfig};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    let _log_guard = init_logging(&cli.log_level, cli.debug, cli.log_json, cli.log_file.as_deref())?;

    // The worker speaks its protocol on stdout; keep its startup quiet.
    let is_worker = matches!(cli.command, Commands::SandboxWorker);
    if is_worker {
        debug!("Starting sandbox worker v{}", env!("CARGO_PKG_VERSION"));
    } else {
        info!("Starting BrowserFlow v{}", env!("CARGO_PKG_VERSION"));
    }

    let LoadedConfig { config, path } = load_config(cli.config.as_ref()).await?;
    let cli_context = CliContext::new(config, path, cli.config.is_some());

    match dispatch(&cli, &cli_context).await {
        Ok(()) => {
            if !is_worker {
                info!("Command completed successfully");
            }
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {}", err);
            Err(err)
        }
    }
}
