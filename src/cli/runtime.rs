use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::Config;

/// Overrides `task_api.base_url`
pub const TASK_API_ENV: &str = "BROWSERFLOW_TASK_API_URL";
/// Overrides `output_dir`
pub const OUTPUT_DIR_ENV: &str = "BROWSERFLOW_OUTPUT_DIR";

/// Installs the global subscriber. Console logs go to stderr so stdout stays
/// free for command output and the worker protocol.
///
/// The returned guard must be held until exit when a log file is used.
pub fn init_logging(
    level: &str,
    debug: bool,
    json: bool,
    log_file: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.to_string())),
        )
        .init();

    Ok(guard)
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };

    let mut config = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .await
            .context("Failed to read config file")?;

        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded configuration from: {}", config_path.display());
        config
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        Config::default()
    };

    apply_env_overrides(&mut config);
    Ok(LoadedConfig {
        config,
        path: config_path,
    })
}

// Priority: ./config/browserflow.yaml > ~/.config/browserflow/config.yaml
fn default_config_path() -> Result<PathBuf> {
    let local_config = PathBuf::from("config/browserflow.yaml");
    if local_config.exists() {
        return Ok(local_config);
    }
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push("browserflow");
    path.push("config.yaml");
    Ok(path)
}

pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = env::var(TASK_API_ENV) {
        if !url.trim().is_empty() {
            info!("Using task API from {}", TASK_API_ENV);
            config.task_api.base_url = Some(url.trim().to_string());
        }
    }

    if let Ok(dir) = env::var(OUTPUT_DIR_ENV) {
        if !dir.trim().is_empty() {
            config.output_dir = PathBuf::from(dir.trim());
        }
    }
}
