// cd_engine/src/logging/file.rs

//! Default `StepLogger`: appends masked lines to `<log_prefix>/<file>` and mirrors them to `tracing`.

use crate::logging::masker::SecretMasker;
use crate::logging::{LogLevel, LoggerFactory, LoggerOverrides, StepLogger};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{event, Level};

#[derive(Debug)]
enum Sink {
  Unopened,
  Open(File),
  Closed,
}

#[derive(Debug)]
pub struct FileLogger {
  path: Option<PathBuf>,
  level: LogLevel,
  eol: String,
  masker: Arc<SecretMasker>,
  sink: Mutex<Sink>,
}

impl FileLogger {
  /// `path: None` logs to `tracing` only.
  pub fn new(path: Option<PathBuf>, level: LogLevel, eol: impl Into<String>, masker: Arc<SecretMasker>) -> Self {
    Self {
      path,
      level,
      eol: eol.into(),
      masker,
      sink: Mutex::new(Sink::Unopened),
    }
  }

  fn open(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
  }

  fn write(&self, level: LogLevel, message: &str) {
    if level < self.level {
      return;
    }
    let masked = self.masker.mask(message);
    let file = self.path.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
    match level {
      LogLevel::Debug => event!(target: "cd_engine::step_log", Level::DEBUG, file = %file, "{}", masked),
      LogLevel::Info => event!(target: "cd_engine::step_log", Level::INFO, file = %file, "{}", masked),
      LogLevel::Warn => event!(target: "cd_engine::step_log", Level::WARN, file = %file, "{}", masked),
      LogLevel::Error => event!(target: "cd_engine::step_log", Level::ERROR, file = %file, "{}", masked),
    }

    let Some(path) = &self.path else {
      return;
    };
    let mut sink = self.sink.lock();
    if let Sink::Unopened = *sink {
      match Self::open(path) {
        Ok(f) => *sink = Sink::Open(f),
        Err(e) => {
          event!(Level::WARN, path = %path.display(), error = %e, "Could not open step log file.");
          *sink = Sink::Closed;
        }
      }
    }
    if let Sink::Open(f) = &mut *sink {
      let line = format!("{}{}", masked, self.eol);
      if let Err(e) = f.write_all(line.as_bytes()) {
        event!(Level::WARN, path = %path.display(), error = %e, "Step log write failed.");
      }
    }
  }
}

impl StepLogger for FileLogger {
  fn info(&self, message: &str) {
    self.write(LogLevel::Info, message);
  }

  fn debug(&self, message: &str) {
    self.write(LogLevel::Debug, message);
  }

  fn warn(&self, message: &str) {
    self.write(LogLevel::Warn, message);
  }

  fn error(&self, message: &str) {
    self.write(LogLevel::Error, message);
  }

  fn close(&self) {
    let mut sink = self.sink.lock();
    if let Sink::Open(f) = &mut *sink {
      let _ = f.flush();
    }
    *sink = Sink::Closed;
  }

  fn file_path(&self) -> Option<PathBuf> {
    self.path.clone()
  }
}

/// Builds one [`FileLogger`] per log-file key, all sharing the same masker.
#[derive(Debug, Clone)]
pub struct FileLoggerFactory {
  log_prefix: Option<PathBuf>,
  level: LogLevel,
  eol: String,
  masker: Arc<SecretMasker>,
}

impl FileLoggerFactory {
  pub fn new(log_prefix: Option<PathBuf>, level: LogLevel, eol: impl Into<String>, masker: SecretMasker) -> Self {
    Self {
      log_prefix,
      level,
      eol: eol.into(),
      masker: Arc::new(masker),
    }
  }
}

impl LoggerFactory for FileLoggerFactory {
  fn create(&self, file_name: &str, overrides: &LoggerOverrides) -> Arc<dyn StepLogger> {
    let path = self.log_prefix.as_ref().map(|prefix| prefix.join(file_name));
    let eol = overrides.eol.clone().unwrap_or_else(|| self.eol.clone());
    Arc::new(FileLogger::new(path, self.level, eol, Arc::clone(&self.masker)))
  }
}
