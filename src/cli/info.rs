use anyhow::Result;
use serde_json::json;

use crate::cli::context::CliContext;
use crate::cli::output::{print_structured, OutputFormat};

pub async fn cmd_info(ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let config = ctx.config();
    let summary = json!({
        "version": env!("CARGO_PKG_VERSION"),
        "build_date": env!("BUILD_DATE"),
        "git_commit": env!("GIT_HASH"),
        "git_branch": env!("GIT_BRANCH"),
        "config_path": ctx.config_path().display().to_string(),
        "config": config,
    });
    if print_structured(&output, &summary)? {
        return Ok(());
    }

    println!("BrowserFlow System Information");
    println!("==============================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {}", env!("BUILD_DATE"));
    println!("Git Commit: {}", env!("GIT_HASH"));
    println!("Git Branch: {}", env!("GIT_BRANCH"));
    println!();

    println!("Configuration:");
    println!("- Config File: {}", ctx.config_path().display());
    println!("- Output Directory: {}", config.output_dir.display());
    println!("- Default Output Format: {:?}", config.default_output_format);
    println!(
        "- Step Ceiling: max({}, actions x {})",
        config.interpreter.min_max_steps, config.interpreter.steps_per_action
    );
    println!(
        "- Task API: {}",
        config.task_api.base_url.as_deref().unwrap_or("(disabled)")
    );
    println!();

    println!("Script Sandbox:");
    println!("- Mode: {:?}", config.sandbox.mode);
    println!("- Timeout: {}ms", config.sandbox.timeout_ms);
    println!("- Max Operations: {}", config.sandbox.max_operations);
    println!(
        "- Limits: string={} array={} map={} call depth={}",
        config.sandbox.max_string_size,
        config.sandbox.max_array_size,
        config.sandbox.max_map_size,
        config.sandbox.max_call_levels
    );
    println!();

    println!("Behavior:");
    println!("- Human Delays: {}", config.behavior.human_delays);
    println!("- Typos: {}", config.behavior.typos);
    println!("- Idle Movement: {}", config.behavior.idle_movement);

    Ok(())
}
