// cd_engine/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  /// A `run` step exited with a nonzero code. The message is exactly the captured stderr.
  #[error("{stderr}")]
  CommandFailed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("Failed to spawn command '{command}': {source}")]
  SpawnFailure {
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("Plugin not found: {plugin}")]
  PluginNotFound { plugin: String },

  #[error("Plugin '{plugin}' failed. Source: {source}")]
  PluginFailure {
    plugin: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Template render failed for '{template}': {message}")]
  TemplateFailure { template: String, message: String },

  #[error("Hook '{hook}' failed. Source: {source}")]
  HookFailure {
    hook: &'static str,
    #[source]
    source: AnyhowError,
  },

  #[error("Invalid step definition at position {index}: {message}")]
  InvalidStep { index: usize, message: String },

  #[error("Log upload failed for '{path}'. Source: {source}")]
  UploadFailure {
    path: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Configuration error: {0}")]
  Configuration(String),

  #[error("Internal engine error: {0}")]
  Internal(String),
}

impl From<serde_json::Error> for EngineError {
  fn from(err: serde_json::Error) -> Self {
    EngineError::Configuration(err.to_string())
  }
}

/// Renders an error together with its `source()` chain on one line.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
  let mut rendered = err.to_string();
  let mut current = err.source();
  while let Some(cause) = current {
    let cause_text = cause.to_string();
    if !rendered.contains(&cause_text) {
      rendered.push_str(": ");
      rendered.push_str(&cause_text);
    }
    current = cause.source();
  }
  rendered
}

pub type EngineResult<T, E = EngineError> = std::result::Result<T, E>;
