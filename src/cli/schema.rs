use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio::fs;

use action_flow::ActionSpec;

#[derive(Args, Clone, Debug)]
pub struct SchemaArgs {
    /// Write the schema to this file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

pub async fn cmd_schema(args: SchemaArgs) -> Result<()> {
    let schema = schemars::schema_for!(Vec<ActionSpec>);
    let rendered = serde_json::to_string_pretty(&schema)?;
    match args.out {
        Some(path) => {
            fs::write(&path, rendered)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Schema written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
