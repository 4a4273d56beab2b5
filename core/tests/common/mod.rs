// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use cd_engine::{
  CancelHandle, Context, ContextData, Engine, EngineConfig, EngineEvents, InitOutput, LogLevel, LoggerFactory,
  LoggerOverrides, Plugin, PluginContext, PluginRegistry, StepEntry, StepLogger,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::Level;

// --- Helper for Tracing Setup ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- In-memory loggers ---

/// Lines written per log key, shared between every logger a factory hands out.
#[derive(Clone, Default)]
pub struct LogStore {
  lines: Arc<Mutex<HashMap<String, Vec<(LogLevel, String)>>>>,
  closed: Arc<Mutex<HashSet<String>>>,
}

impl LogStore {
  /// True once any logger for `key` has been closed.
  pub fn is_closed(&self, key: &str) -> bool {
    self.closed.lock().contains(key)
  }

  pub fn lines(&self, key: &str) -> Vec<String> {
    self
      .lines
      .lock()
      .get(key)
      .map(|lines| lines.iter().map(|(_, l)| l.clone()).collect())
      .unwrap_or_default()
  }

  pub fn lines_at(&self, key: &str, level: LogLevel) -> Vec<String> {
    self
      .lines
      .lock()
      .get(key)
      .map(|lines| lines.iter().filter(|(lv, _)| *lv == level).map(|(_, l)| l.clone()).collect())
      .unwrap_or_default()
  }

  pub fn joined(&self, key: &str) -> String {
    self.lines(key).concat()
  }

  pub fn keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.lines.lock().keys().cloned().collect();
    keys.sort();
    keys
  }
}

pub struct MemoryLogger {
  key: String,
  store: LogStore,
}

impl MemoryLogger {
  fn push(&self, level: LogLevel, message: &str) {
    self
      .store
      .lines
      .lock()
      .entry(self.key.clone())
      .or_default()
      .push((level, message.to_string()));
  }
}

impl StepLogger for MemoryLogger {
  fn info(&self, message: &str) {
    self.push(LogLevel::Info, message);
  }
  fn debug(&self, message: &str) {
    self.push(LogLevel::Debug, message);
  }
  fn warn(&self, message: &str) {
    self.push(LogLevel::Warn, message);
  }
  fn error(&self, message: &str) {
    self.push(LogLevel::Error, message);
  }
  fn close(&self) {
    self.store.closed.lock().insert(self.key.clone());
  }
}

#[derive(Clone, Default)]
pub struct MemoryLoggerFactory {
  pub store: LogStore,
}

impl LoggerFactory for MemoryLoggerFactory {
  fn create(&self, file_name: &str, _overrides: &LoggerOverrides) -> Arc<dyn StepLogger> {
    Arc::new(MemoryLogger {
      key: file_name.to_string(),
      store: self.store.clone(),
    })
  }
}

// --- Plugins ---

/// Returns its inputs as outputs and remembers every call.
#[derive(Default)]
pub struct EchoPlugin {
  pub calls: Mutex<Vec<(&'static str, Value)>>,
  pub contexts: Mutex<Vec<PluginContext>>,
}

#[async_trait]
impl Plugin for EchoPlugin {
  async fn run(&self, inputs: Value, context: PluginContext, logger: Arc<dyn StepLogger>) -> anyhow::Result<Value> {
    logger.info("echo plugin run");
    self.calls.lock().push(("run", inputs.clone()));
    self.contexts.lock().push(context);
    Ok(inputs)
  }

  async fn post_run(&self, inputs: Value, context: PluginContext, logger: Arc<dyn StepLogger>) -> anyhow::Result<Value> {
    logger.info("echo plugin post_run");
    self.calls.lock().push(("post_run", inputs.clone()));
    self.contexts.lock().push(context);
    Ok(inputs)
  }
}

/// Always fails with the given message.
pub struct FailingPlugin(pub &'static str);

#[async_trait]
impl Plugin for FailingPlugin {
  async fn run(&self, _inputs: Value, _context: PluginContext, _logger: Arc<dyn StepLogger>) -> anyhow::Result<Value> {
    Err(anyhow::anyhow!(self.0))
  }

  async fn post_run(&self, _inputs: Value, _context: PluginContext, _logger: Arc<dyn StepLogger>) -> anyhow::Result<Value> {
    Err(anyhow::anyhow!(self.0))
  }
}

/// Cancels the run from inside its own execution, then succeeds.
#[derive(Default)]
pub struct CancellingPlugin {
  pub handle: Mutex<Option<CancelHandle>>,
}

#[async_trait]
impl Plugin for CancellingPlugin {
  async fn run(&self, _inputs: Value, _context: PluginContext, _logger: Arc<dyn StepLogger>) -> anyhow::Result<Value> {
    if let Some(handle) = self.handle.lock().as_ref() {
      handle.cancel();
    }
    Ok(json!({ "ran": true }))
  }

  async fn post_run(&self, inputs: Value, context: PluginContext, logger: Arc<dyn StepLogger>) -> anyhow::Result<Value> {
    self.run(inputs, context, logger).await
  }
}

// --- Hooks ---

#[derive(Default)]
pub struct RecordingEvents {
  pub calls: Mutex<Vec<String>>,
  pub init_output: Mutex<Option<InitOutput>>,
  pub init_error: Mutex<Option<String>>,
  pub post_run_error: Mutex<Option<String>>,
  /// Cancel after the post-run hook of this step count.
  pub cancel_after: Mutex<Option<(String, CancelHandle)>>,
  pub completed_context: Mutex<Option<Context>>,
}

#[async_trait]
impl EngineEvents for RecordingEvents {
  async fn on_init(&self, _context: ContextData, logger: Arc<dyn StepLogger>) -> anyhow::Result<Option<InitOutput>> {
    self.calls.lock().push("init".to_string());
    logger.info("init hook ran");
    if let Some(message) = self.init_error.lock().clone() {
      return Err(anyhow::anyhow!(message));
    }
    Ok(self.init_output.lock().clone())
  }

  async fn on_pre_run(&self, entry: StepEntry, _context: ContextData, _logger: Arc<dyn StepLogger>) -> anyhow::Result<()> {
    self.calls.lock().push(format!("pre:{}", entry.step_count));
    Ok(())
  }

  async fn on_post_run(&self, entry: StepEntry, _context: ContextData, _logger: Arc<dyn StepLogger>) -> anyhow::Result<()> {
    self.calls.lock().push(format!("post:{}", entry.step_count));
    let cancel = self.cancel_after.lock().clone();
    if let Some((count, handle)) = cancel {
      if count == entry.step_count {
        handle.cancel();
      }
    }
    if let Some(message) = self.post_run_error.lock().clone() {
      return Err(anyhow::anyhow!(message));
    }
    Ok(())
  }

  async fn on_completed(&self, context: ContextData, _logger: Arc<dyn StepLogger>) -> anyhow::Result<()> {
    self.calls.lock().push("completed".to_string());
    *self.completed_context.lock() = Some(context.snapshot());
    Ok(())
  }
}

// --- Engine helpers ---

pub struct Harness {
  pub engine: Engine,
  pub logs: LogStore,
  pub echo: Arc<EchoPlugin>,
  pub events: Arc<RecordingEvents>,
}

pub fn harness(config: EngineConfig) -> Harness {
  harness_with(config, Arc::new(RecordingEvents::default()))
}

pub fn harness_with(config: EngineConfig, events: Arc<RecordingEvents>) -> Harness {
  let factory = MemoryLoggerFactory::default();
  let logs = factory.store.clone();
  let echo = Arc::new(EchoPlugin::default());
  let registry = PluginRegistry::new()
    .with_plugin("echo", echo.clone())
    .with_plugin("broken", Arc::new(FailingPlugin("plugin exploded")));

  let engine = Engine::builder(config)
    .with_logger_factory(Arc::new(factory))
    .with_plugin_loader(Arc::new(registry))
    .with_events(events.clone())
    .build();

  Harness {
    engine,
    logs,
    echo,
    events,
  }
}

pub fn entry<'a>(ctx: &'a Context, step_count: &str) -> &'a StepEntry {
  match ctx.step(step_count) {
    Some(entry) => entry,
    None => panic!("no entry for step {}", step_count),
  }
}

pub fn statuses(ctx: &Context) -> Vec<(String, String)> {
  ctx
    .steps
    .iter()
    .map(|e| (e.step_count.clone(), e.status.to_string()))
    .collect()
}
