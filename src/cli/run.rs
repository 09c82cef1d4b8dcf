use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use action_flow::vars::parse_value;
use browserflow_core_types::{ProgressEvent, ProgressStatus, RunId};
use browserflow_event_bus::{to_mpsc, ProgressBus, StopRegistry};

use crate::cli::context::CliContext;
use crate::cli::output::{print_structured, OutputFormat};
use crate::config::DataFormat;
use crate::export::write_bundle;
use crate::task_runner::{RunBundle, StaticSessions, TaskDefinition, TaskRunner};

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Task file (YAML or JSON)
    pub task: PathBuf,

    /// HTML document served as the browser page
    #[arg(long, value_name = "FILE")]
    pub html: Option<PathBuf>,

    /// URL reported for the page
    #[arg(long)]
    pub url: Option<String>,

    /// Initial variables (key=value), overriding the task's own
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Directory for the result bundle
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Export format for extracted data
    #[arg(short, long)]
    pub format: Option<DataFormat>,

    /// Use this run id instead of a generated one
    #[arg(long)]
    pub run_id: Option<String>,

    /// Print per-action progress while running
    #[arg(long)]
    pub progress: bool,

    /// Skip writing the result bundle
    #[arg(long)]
    pub no_save: bool,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let config = ctx.config();
    let mut task = TaskDefinition::load(&args.task)
        .await
        .with_context(|| format!("loading {}", args.task.display()))?;
    for raw in &args.vars {
        let (key, value) = parse_var(raw)?;
        task.variables.insert(key, value);
    }

    let sessions = static_sessions(&args).await?;
    let run_id = args.run_id.clone().map(RunId).unwrap_or_default();
    let stop = StopRegistry::new();
    let bus = ProgressBus::new(256);

    let runner = TaskRunner::new(Arc::new(sessions), ctx.sandbox()?)
        .with_launcher(ctx.launcher()?)
        .with_progress(bus.clone())
        .with_stop_checker(stop.clone())
        .with_options(config.interpreter_options());

    let progress_task = args.progress.then(|| spawn_progress_printer(bus.clone()));

    let ctrl_c = {
        let stop = stop.clone();
        let run_id = run_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(run_id = %run_id, "Interrupt received, stopping run");
                stop.request_stop(&run_id);
            }
        })
    };

    let result = runner.run(&run_id, &task).await;
    ctrl_c.abort();
    bus.clear_run(&run_id);
    // Closing the bus lets the printer flush queued events and exit.
    drop(runner);
    drop(bus);
    if let Some(handle) = progress_task {
        finish_progress(handle).await;
    }
    let bundle = result?;

    let format = args
        .format
        .or(task.output_format)
        .unwrap_or(config.default_output_format);
    let written = if args.no_save {
        Vec::new()
    } else {
        let dir = args.output_dir.clone().unwrap_or_else(|| config.output_dir.clone());
        write_bundle(&bundle, &dir, format).await?
    };

    if !print_structured(&output, &bundle)? {
        print_summary(&bundle, &written);
    }

    if !bundle.success {
        bail!(
            "run {} finished unsuccessfully ({})",
            bundle.run_id,
            bundle.termination
        );
    }
    info!(run_id = %bundle.run_id, "Run succeeded");
    Ok(())
}

const PROGRESS_DRAIN: Duration = Duration::from_secs(2);

/// Prints bus events to stderr until the bus closes; yields the line count.
fn spawn_progress_printer(bus: Arc<ProgressBus>) -> JoinHandle<usize> {
    let mut events = to_mpsc(bus, 256);
    tokio::spawn(async move {
        let mut printed = 0;
        while let Some(event) = events.recv().await {
            eprintln!("{}", progress_line(&event));
            printed += 1;
        }
        printed
    })
}

async fn finish_progress(handle: JoinHandle<usize>) -> Option<usize> {
    match tokio::time::timeout(PROGRESS_DRAIN, handle).await {
        Ok(Ok(printed)) => {
            debug!(printed, "Progress output drained");
            Some(printed)
        }
        Ok(Err(err)) => {
            warn!(error = %err, "Progress printer failed");
            None
        }
        Err(_) => {
            warn!("Progress printer did not drain in time");
            None
        }
    }
}

fn progress_line(event: &ProgressEvent) -> String {
    let marker = match event.status {
        ProgressStatus::Running => "…",
        ProgressStatus::Success => "✓",
        ProgressStatus::Error => "✗",
        ProgressStatus::Skipped => "-",
    };
    match &event.message {
        Some(message) => format!("{marker} [{}] {}: {message}", event.index, event.action_id),
        None => format!("{marker} [{}] {}", event.index, event.action_id),
    }
}

async fn static_sessions(args: &RunArgs) -> Result<StaticSessions> {
    if let Some(url) = &args.url {
        url::Url::parse(url).with_context(|| format!("invalid --url `{url}`"))?;
    }
    let sessions = match (&args.html, &args.url) {
        (Some(path), None) => StaticSessions::File(path.clone()),
        (Some(path), Some(url)) => {
            let html = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            StaticSessions::Inline {
                url: url.clone(),
                html,
            }
        }
        (None, Some(url)) => StaticSessions::blank_at(url.clone()),
        (None, None) => StaticSessions::blank(),
    };
    Ok(sessions)
}

/// Splits `key=value`; the value is typed like a `set` action.
fn parse_var(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("variable `{raw}` must be written as key=value");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("variable `{raw}` has an empty name");
    }
    Ok((key.to_string(), parse_value(value)))
}

fn print_summary(bundle: &RunBundle, written: &[PathBuf]) {
    let status = if bundle.success { "✓" } else { "✗" };
    println!("{status} Run {} {}", bundle.run_id, bundle.termination);
    if let Some(outcome) = bundle.stop_outcome {
        println!("  stop outcome: {outcome}");
    }
    println!(
        "  steps: {}  failed actions: {}  duration: {}",
        bundle.steps,
        bundle.failed_actions,
        humantime::format_duration(Duration::from_millis(bundle.latency_ms))
    );
    if let Some(url) = &bundle.screenshot_url {
        println!("  screenshot: {url}");
    }
    if !bundle.logs.is_empty() {
        println!("  log:");
        for line in &bundle.logs {
            println!("    {line}");
        }
    }
    for path in written {
        println!("  wrote {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vars_are_typed_like_set_values() {
        assert_eq!(parse_var("limit=3").unwrap(), ("limit".to_string(), json!(3)));
        assert_eq!(
            parse_var("query=red shoes").unwrap(),
            ("query".to_string(), json!("red shoes"))
        );
        assert_eq!(parse_var("expr=a=b").unwrap().1, json!("a=b"));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=1").is_err());
    }

    #[tokio::test]
    async fn progress_printer_drains_queued_events() {
        use browserflow_core_types::ProgressReporter;

        let bus = ProgressBus::new(16);
        let printer = spawn_progress_printer(bus.clone());
        let run_id = RunId::new();
        for index in 0..5 {
            bus.report(ProgressEvent::new(
                run_id.clone(),
                format!("step-{index}"),
                index,
                ProgressStatus::Success,
            ))
            .await;
        }
        drop(bus);

        assert_eq!(finish_progress(printer).await, Some(5));
    }

    #[test]
    fn progress_lines_carry_status_and_message() {
        let event = ProgressEvent::new(RunId::new(), "login", 2, ProgressStatus::Error)
            .with_message("no such element");
        assert_eq!(progress_line(&event), "✗ [2] login: no such element");
    }
}
