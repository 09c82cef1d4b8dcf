use super::check::cmd_check;
use super::config::cmd_config;
use super::env::CliArgs;
use super::extract::cmd_extract;
use super::info::cmd_info;
use super::run::cmd_run;
use super::schema::cmd_schema;
use super::worker::cmd_sandbox_worker;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    let output = cli.output.clone();
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx, output).await,
        Commands::Check(args) => cmd_check(args, output).await,
        Commands::Extract(args) => cmd_extract(args, ctx, output).await,
        Commands::Schema(args) => cmd_schema(args).await,
        Commands::Config(args) => cmd_config(args, ctx).await,
        Commands::Info => cmd_info(ctx, output).await,
        Commands::SandboxWorker => cmd_sandbox_worker(ctx.config()).await,
    }
}
