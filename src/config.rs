//! Application configuration
//!
//! Loaded from YAML; every section falls back to its defaults so a partial
//! file is valid.

use std::path::PathBuf;

use action_flow::{BehaviorFlags, InterpreterOptions};
use clap::ValueEnum;
use schemars::JsonSchema;
use script_sandbox::SandboxConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where run bundles and exports are written
    pub output_dir: PathBuf,
    pub interpreter: InterpreterSettings,
    pub sandbox: SandboxConfig,
    pub behavior: BehaviorFlags,
    pub task_api: TaskApiConfig,
    pub default_output_format: DataFormat,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct InterpreterSettings {
    /// Step allowance per action when sizing the step ceiling
    pub steps_per_action: u64,
    /// Lower bound of the step ceiling
    pub min_max_steps: u64,
}

/// Remote task API used by `start` actions
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TaskApiConfig {
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

/// Serialisation of extraction data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Json,
    Csv,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./browserflow-output"),
            interpreter: InterpreterSettings::default(),
            sandbox: SandboxConfig::default(),
            behavior: BehaviorFlags::default(),
            task_api: TaskApiConfig::default(),
            default_output_format: DataFormat::Json,
        }
    }
}

impl Default for InterpreterSettings {
    fn default() -> Self {
        let options = InterpreterOptions::default();
        Self {
            steps_per_action: options.steps_per_action,
            min_max_steps: options.min_max_steps,
        }
    }
}

impl Default for TaskApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 30_000,
        }
    }
}

impl Config {
    pub fn interpreter_options(&self) -> InterpreterOptions {
        InterpreterOptions {
            steps_per_action: self.interpreter.steps_per_action.max(1),
            min_max_steps: self.interpreter.min_max_steps,
            behavior: self.behavior,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let raw = "sandbox:\n  timeout_ms: 750\n  mode: worker\nbehavior:\n  typos: true\n";
        let config: Config = serde_yaml::from_str(raw).unwrap();
        assert_eq!(config.sandbox.timeout_ms, 750);
        assert_eq!(config.sandbox.mode, script_sandbox::SandboxMode::Worker);
        assert_eq!(config.sandbox.max_operations, SandboxConfig::default().max_operations);
        assert!(config.behavior.typos);
        assert!(!config.behavior.human_delays);
        assert_eq!(config.interpreter.steps_per_action, 20);
        assert_eq!(config.interpreter.min_max_steps, 1000);
    }

    #[test]
    fn defaults_round_trip_through_yaml() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn interpreter_options_carry_behavior() {
        let mut config = Config::default();
        config.behavior.human_delays = true;
        config.interpreter.steps_per_action = 0;
        let options = config.interpreter_options();
        assert!(options.behavior.human_delays);
        assert_eq!(options.steps_per_action, 1);
    }
}
