// cd_engine/src/config.rs

//! Serializable engine configuration. Runtime collaborators (hooks, plugin loader, loggers,
//! uploader, template compiler) are attached through `EngineOptions` instead.

use crate::core::step::StepSpec;
use crate::error::{EngineError, EngineResult};
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

fn default_eol() -> String {
  "\n".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
  /// Directory for step log files. Without it, step logs only reach `tracing`.
  #[serde(default)]
  pub log_prefix: Option<PathBuf>,
  #[serde(default)]
  pub log_level: LogLevel,
  #[serde(default = "default_eol")]
  pub eol: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      log_prefix: None,
      log_level: LogLevel::default(),
      eol: default_eol(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
  /// Run working directory. Defaults to the process's current directory.
  #[serde(default)]
  pub cwd: Option<PathBuf>,
  #[serde(default)]
  pub inputs: Value,
  #[serde(default)]
  pub steps: Vec<StepSpec>,
  /// Keys removed from the environment given to child processes.
  #[serde(default)]
  pub unset_envs: Vec<String>,
  #[serde(default)]
  pub log_config: LogConfig,
}

impl EngineConfig {
  pub fn from_json_str(json: &str) -> EngineResult<Self> {
    let config: EngineConfig = serde_json::from_str(json)?;
    if !(config.inputs.is_null() || config.inputs.is_object()) {
      return Err(EngineError::Configuration("'inputs' must be an object".to_string()));
    }
    Ok(config)
  }

  pub fn with_steps(mut self, steps: Vec<StepSpec>) -> Self {
    self.steps = steps;
    self
  }

  pub fn with_inputs(mut self, inputs: Value) -> Self {
    self.inputs = inputs;
    self
  }

  pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
    self.cwd = Some(cwd.into());
    self
  }

  pub fn with_log_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
    self.log_config.log_prefix = Some(prefix.into());
    self
  }

  pub fn with_unset_envs(mut self, keys: Vec<String>) -> Self {
    self.unset_envs = keys;
    self
  }

  /// `cwd`, falling back to the current directory.
  pub(crate) fn resolve_cwd(&self) -> PathBuf {
    match &self.cwd {
      Some(cwd) => cwd.clone(),
      None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
  }
}
