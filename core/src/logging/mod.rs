// cd_engine/src/logging/mod.rs

//! The per-step logger boundary and its default file-backed implementation.

pub mod file;
pub mod masker;
pub mod upload;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

pub use file::{FileLogger, FileLoggerFactory};
pub use masker::SecretMasker;
pub use upload::LogUploader;

/// A sink for one step's user-visible log lines.
///
/// Implementations must redact configured secrets from every line they emit.
pub trait StepLogger: Send + Sync {
  fn info(&self, message: &str);
  fn debug(&self, message: &str);
  fn warn(&self, message: &str);
  fn error(&self, message: &str);

  /// Flush and finalize. Writes after `close` may be dropped.
  fn close(&self) {}

  /// Where the lines end up on disk, if anywhere.
  fn file_path(&self) -> Option<PathBuf> {
    None
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggerOverrides {
  /// Line terminator override. Process output streams use `""`.
  pub eol: Option<String>,
}

impl LoggerOverrides {
  pub fn with_eol(eol: impl Into<String>) -> Self {
    Self { eol: Some(eol.into()) }
  }
}

/// Builds a logger for a log-file key such as `step_1.log`.
pub trait LoggerFactory: Send + Sync {
  fn create(&self, file_name: &str, overrides: &LoggerOverrides) -> Arc<dyn StepLogger>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Debug,
  #[default]
  Info,
  Warn,
  Error,
}

/// `step_<stepCount>.log`
pub fn log_file_name(step_count: &str) -> String {
  format!("step_{}.log", step_count)
}

/// Secret values to redact: `inputs.secrets`, `inputs.cloudSecrets` and `inputs.git.token`.
pub fn collect_secrets(inputs: &Value) -> Vec<String> {
  fn values_of(v: Option<&Value>) -> Vec<String> {
    match v {
      Some(Value::Object(map)) => map.values().filter_map(secret_text).collect(),
      Some(Value::Array(items)) => items.iter().filter_map(secret_text).collect(),
      _ => Vec::new(),
    }
  }
  fn secret_text(v: &Value) -> Option<String> {
    match v {
      Value::String(s) if !s.is_empty() => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
    }
  }

  let mut secrets = values_of(inputs.get("secrets"));
  secrets.extend(values_of(inputs.get("cloudSecrets")));
  if let Some(token) = inputs.pointer("/git/token").and_then(secret_text) {
    secrets.push(token);
  }
  secrets
}

/// Where per-step loggers come from for one run.
#[derive(Clone)]
pub(crate) enum LoggerSource {
  Factory(Arc<dyn LoggerFactory>),
  /// A single caller-supplied logger used for every key.
  Custom(Arc<dyn StepLogger>, Arc<SecretMasker>),
}

/// Forwards masked lines to a caller-owned logger. `close` is not forwarded; the caller
/// owns its lifecycle.
struct SharedLogger {
  inner: Arc<dyn StepLogger>,
  masker: Arc<SecretMasker>,
}

impl StepLogger for SharedLogger {
  fn info(&self, message: &str) {
    self.inner.info(&self.masker.mask(message))
  }

  fn debug(&self, message: &str) {
    self.inner.debug(&self.masker.mask(message))
  }

  fn warn(&self, message: &str) {
    self.inner.warn(&self.masker.mask(message))
  }

  fn error(&self, message: &str) {
    self.inner.error(&self.masker.mask(message))
  }

  fn file_path(&self) -> Option<PathBuf> {
    self.inner.file_path()
  }
}

impl LoggerSource {
  pub(crate) fn logger(&self, file_name: &str, overrides: &LoggerOverrides) -> Arc<dyn StepLogger> {
    match self {
      LoggerSource::Factory(factory) => factory.create(file_name, overrides),
      LoggerSource::Custom(inner, masker) => Arc::new(SharedLogger {
        inner: Arc::clone(inner),
        masker: Arc::clone(masker),
      }),
    }
  }

  pub(crate) fn is_custom(&self) -> bool {
    matches!(self, LoggerSource::Custom(..))
  }
}
