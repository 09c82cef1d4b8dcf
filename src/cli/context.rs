use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use action_primitives::{DisabledLauncher, HttpTaskLauncher, TaskLauncher};
use script_sandbox::{InProcessSandbox, SandboxMode, ScriptSandbox, WorkerSandbox};

use crate::config::Config;

/// Grace period on top of the script timeout before a worker is killed
const WORKER_GRACE_MS: u64 = 1_000;

pub struct CliContext {
    config: Arc<Config>,
    config_path: PathBuf,
    explicit_config: bool,
}

impl CliContext {
    pub fn new(config: Config, config_path: PathBuf, explicit_config: bool) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            explicit_config,
        }
    }

    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Sandbox selected by `sandbox.mode`.
    ///
    /// Worker mode re-invokes this binary with the same configuration file.
    pub fn sandbox(&self) -> Result<Arc<dyn ScriptSandbox>> {
        let sandbox_config = self.config.sandbox.clone();
        match sandbox_config.mode {
            SandboxMode::InProcess => Ok(Arc::new(InProcessSandbox::new(sandbox_config))),
            SandboxMode::Worker => {
                let program =
                    std::env::current_exe().context("Failed to locate the current executable")?;
                let mut args: Vec<OsString> = Vec::new();
                if self.explicit_config || self.config_path.exists() {
                    args.push("--config".into());
                    args.push(self.config_path.clone().into_os_string());
                }
                args.extend(["--log-level", "error", "sandbox-worker"].map(OsString::from));
                Ok(Arc::new(WorkerSandbox::new(
                    program,
                    args,
                    sandbox_config.timeout_ms + WORKER_GRACE_MS,
                )))
            }
        }
    }

    /// HTTP launcher when a task API is configured, otherwise one that refuses.
    pub fn launcher(&self) -> Result<Arc<dyn TaskLauncher>> {
        match &self.config.task_api.base_url {
            Some(base_url) => {
                let timeout = Duration::from_millis(self.config.task_api.timeout_ms);
                let launcher = HttpTaskLauncher::new(base_url, timeout)
                    .context("Invalid task API configuration")?;
                Ok(Arc::new(launcher))
            }
            None => Ok(Arc::new(DisabledLauncher)),
        }
    }
}
