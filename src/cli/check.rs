use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use action_flow::{Action, ActionKind, BlockMap, StructureDiagnostic};

use crate::cli::output::{print_structured, OutputFormat};
use crate::task_runner::TaskDefinition;

#[derive(Args, Clone, Debug)]
pub struct CheckArgs {
    /// Task file (YAML or JSON)
    pub task: PathBuf,

    /// Fail when structural diagnostics are found
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    task: String,
    actions: usize,
    blocks: usize,
    diagnostics: Vec<StructureDiagnostic>,
    outline: Vec<String>,
}

pub async fn cmd_check(args: CheckArgs, output: OutputFormat) -> Result<()> {
    let task = TaskDefinition::load(&args.task)
        .await
        .with_context(|| format!("loading {}", args.task.display()))?;
    let map = BlockMap::build(&task.actions);

    let report = CheckReport {
        task: task.label().to_string(),
        actions: task.actions.len(),
        blocks: map.block_count(),
        diagnostics: map.diagnostics().to_vec(),
        outline: outline(&task.actions),
    };

    if !print_structured(&output, &report)? {
        println!(
            "{}: {} actions, {} blocks",
            report.task, report.actions, report.blocks
        );
        for line in &report.outline {
            println!("  {line}");
        }
        if report.diagnostics.is_empty() {
            println!("✓ structure is well formed");
        } else {
            println!("⚠ {} structural issue(s):", report.diagnostics.len());
            for diagnostic in &report.diagnostics {
                println!("  - {diagnostic}");
            }
        }
    }

    if args.strict && !report.diagnostics.is_empty() {
        bail!("{} structural issue(s) found", report.diagnostics.len());
    }
    Ok(())
}

/// One indented line per action, nested by block depth.
fn outline(actions: &[Action]) -> Vec<String> {
    let mut depth = 0usize;
    let mut lines = Vec::with_capacity(actions.len());
    for (index, action) in actions.iter().enumerate() {
        let level = match action.kind {
            ActionKind::End => {
                depth = depth.saturating_sub(1);
                depth
            }
            ActionKind::Else => depth.saturating_sub(1),
            _ => depth,
        };
        let disabled = if action.disabled { " (disabled)" } else { "" };
        lines.push(format!(
            "{:>3} {}{} [{}]{}",
            index,
            "  ".repeat(level),
            action.name(),
            action.label(index),
            disabled
        ));
        if action.kind.block_start().is_some() {
            depth += 1;
        }
    }
    lines
}
