use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use tokio::fs;

use action_primitives::strip_non_content;
use script_sandbox::ScriptRequest;

use crate::cli::context::CliContext;
use crate::cli::output::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct ExtractArgs {
    /// HTML document to run against
    pub html: PathBuf,

    /// Inline script source
    #[arg(short, long, conflicts_with = "script_file")]
    pub script: Option<String>,

    /// File holding the script source
    #[arg(long, value_name = "FILE")]
    pub script_file: Option<PathBuf>,

    /// URL exposed to the script as `location.href`
    #[arg(long, default_value = "about:blank")]
    pub url: String,

    /// Include shadow-root template contents in queries
    #[arg(long)]
    pub shadow_dom: bool,
}

pub async fn cmd_extract(args: ExtractArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let script = match (&args.script, &args.script_file) {
        (Some(script), _) => script.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        (None, None) => bail!("either --script or --script-file is required"),
    };
    let html = fs::read_to_string(&args.html)
        .await
        .with_context(|| format!("reading {}", args.html.display()))?;

    let sandbox = ctx.sandbox()?;
    let result = sandbox
        .run_script(ScriptRequest {
            script,
            html: strip_non_content(&html, args.shadow_dom),
            url: args.url.clone(),
            include_shadow_dom: args.shadow_dom,
        })
        .await;

    for line in &result.logs {
        eprintln!("console: {line}");
    }
    if let Some(error) = &result.error {
        bail!("script failed: {error}");
    }

    match output {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&result.result)?),
        OutputFormat::Json | OutputFormat::Human => {
            println!("{}", serde_json::to_string_pretty(&result.result)?)
        }
    }
    Ok(())
}
