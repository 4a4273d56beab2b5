// tests/logging_tests.rs
mod common;
use async_trait::async_trait;
use common::*;
use cd_engine::{
  Engine, EngineConfig, LogLevel, LogUploader, LoggerFactory, LoggerOverrides, PluginRegistry, PluginType, StepSpec,
  StepStatus,
};
use parking_lot::Mutex;
use serde_json::json;
use serial_test::serial;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

#[derive(Default)]
struct RecordingUploader {
  paths: Mutex<Vec<PathBuf>>,
  fail: bool,
}

#[async_trait]
impl LogUploader for RecordingUploader {
  async fn upload(&self, path: &Path) -> anyhow::Result<()> {
    self.paths.lock().push(path.to_path_buf());
    if self.fail {
      anyhow::bail!("bucket unavailable");
    }
    Ok(())
  }
}

/// Records, per uploaded file, whether its logger had been closed by then.
struct CloseCheckingUploader {
  store: LogStore,
  uploads: Mutex<Vec<(String, bool)>>,
}

#[async_trait]
impl LogUploader for CloseCheckingUploader {
  async fn upload(&self, path: &Path) -> anyhow::Result<()> {
    let key = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    let closed = self.store.is_closed(&key);
    self.uploads.lock().push((key, closed));
    Ok(())
  }
}

/// Collects formatted `tracing` output in memory.
#[derive(Clone, Default)]
struct CapturedTrace(Arc<Mutex<Vec<u8>>>);

impl CapturedTrace {
  fn text(&self) -> String {
    String::from_utf8_lossy(&self.0.lock()).into_owned()
  }
}

impl std::io::Write for CapturedTrace {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.0.lock().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}

fn registry() -> Arc<PluginRegistry> {
  Arc::new(
    PluginRegistry::new()
      .with_plugin("echo", Arc::new(EchoPlugin::default()))
      .with_plugin("broken", Arc::new(FailingPlugin("token abc123 rejected"))),
  )
}

fn read(dir: &Path, file: &str) -> String {
  std::fs::read_to_string(dir.join(file)).unwrap_or_default()
}

#[tokio::test]
#[serial]
async fn test_file_logs_are_written_per_step() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::builder(
    EngineConfig::default()
      .with_log_prefix(dir.path())
      .with_steps(vec![StepSpec::plugin("echo", PluginType::Run), StepSpec::plugin("broken", PluginType::Run)]),
  )
  .with_plugin_loader(registry())
  .build();

  let ctx = engine.start().await;
  assert_eq!(ctx.status, StepStatus::Failure);

  assert!(dir.path().join("step_init.log").exists());
  assert!(read(dir.path(), "step_1.log").contains("echo plugin run"));
  assert!(read(dir.path(), "step_2.log").contains("token abc123 rejected"));
  assert!(read(dir.path(), "step_completed.log").contains("Complete task"));
}

#[tokio::test]
#[serial]
async fn test_file_logs_redact_secrets() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::builder(
    EngineConfig::default()
      .with_log_prefix(dir.path())
      .with_inputs(json!({ "secrets": { "TOKEN": "abc123" } }))
      .with_steps(vec![StepSpec::plugin("broken", PluginType::Run)]),
  )
  .with_plugin_loader(registry())
  .build();

  let ctx = engine.start().await;
  assert_eq!(ctx.status, StepStatus::Failure);

  let log = read(dir.path(), "step_1.log");
  assert!(log.contains("token [REDACTED] rejected"), "log was: {}", log);
  assert!(!log.contains("abc123"));
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn test_command_output_is_redacted() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::builder(
    EngineConfig::default()
      .with_cwd(dir.path())
      .with_log_prefix(dir.path().join("logs"))
      .with_inputs(json!({ "git": { "token": "ghp_supersecret" } }))
      .with_steps(vec![StepSpec::run("echo token=ghp_supersecret")]),
  )
  .build();

  let ctx = engine.start().await;
  assert_eq!(ctx.status, StepStatus::Success);

  let log = read(&dir.path().join("logs"), "step_1.log");
  assert!(log.contains("token=[REDACTED]"), "log was: {}", log);
  assert!(!log.contains("ghp_supersecret"));
}

#[tokio::test]
#[serial]
async fn test_logs_are_uploaded_after_each_phase() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let uploader = Arc::new(RecordingUploader::default());
  let engine = Engine::builder(EngineConfig::default().with_log_prefix(dir.path()).with_steps(vec![
    StepSpec::plugin("echo", PluginType::Run),
    StepSpec::plugin("echo", PluginType::Run).with_if("false"),
  ]))
  .with_plugin_loader(registry())
  .with_log_uploader(uploader.clone())
  .build();

  engine.start().await;

  let uploaded: Vec<PathBuf> = uploader.paths.lock().clone();
  let expected: Vec<PathBuf> = ["step_init.log", "step_1.log", "step_2.log", "step_completed.log"]
    .iter()
    .map(|f| dir.path().join(f))
    .collect();
  assert_eq!(uploaded, expected);
}

#[tokio::test]
#[serial]
async fn test_upload_failure_does_not_change_verdict() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let uploader = Arc::new(RecordingUploader {
    paths: Mutex::new(Vec::new()),
    fail: true,
  });
  let engine = Engine::builder(
    EngineConfig::default()
      .with_log_prefix(dir.path())
      .with_steps(vec![StepSpec::plugin("echo", PluginType::Run)]),
  )
  .with_plugin_loader(registry())
  .with_log_uploader(uploader.clone())
  .build();

  let ctx = engine.start().await;
  assert_eq!(ctx.status, StepStatus::Success);
  assert_eq!(uploader.paths.lock().len(), 3);
}

#[tokio::test]
#[serial]
async fn test_no_upload_without_log_prefix() {
  setup_tracing();
  let uploader = Arc::new(RecordingUploader::default());
  let engine = Engine::builder(EngineConfig::default().with_steps(vec![StepSpec::plugin("echo", PluginType::Run)]))
    .with_plugin_loader(registry())
    .with_logger_factory(Arc::new(MemoryLoggerFactory::default()))
    .with_log_uploader(uploader.clone())
    .build();

  engine.start().await;
  assert!(uploader.paths.lock().is_empty());
}

#[tokio::test]
#[serial]
async fn test_custom_logger_gets_masked_errors_at_debug() {
  setup_tracing();
  let factory = MemoryLoggerFactory::default();
  let store = factory.store.clone();
  let custom = factory.create("custom", &LoggerOverrides::default());

  let engine = Engine::builder(
    EngineConfig::default()
      .with_inputs(json!({ "cloudSecrets": { "KEY": "abc123" } }))
      .with_steps(vec![StepSpec::plugin("broken", PluginType::Run)]),
  )
  .with_plugin_loader(registry())
  .with_custom_logger(custom)
  .build();

  let ctx = engine.start().await;
  assert_eq!(ctx.status, StepStatus::Failure);

  assert!(store.lines_at("custom", LogLevel::Error).is_empty());
  let debug = store.lines_at("custom", LogLevel::Debug).join("\n");
  assert!(debug.contains("token [REDACTED] rejected"), "debug lines: {}", debug);
  assert!(!store.joined("custom").contains("abc123"));
  assert_eq!(store.keys(), vec!["custom".to_string()]);
}

#[tokio::test]
#[serial]
async fn test_step_name_and_skip_prefix_are_logged() {
  setup_tracing();
  let h = harness(EngineConfig::default().with_steps(vec![
    StepSpec::plugin("echo", PluginType::Run).with_name("Publish"),
    StepSpec::plugin("echo", PluginType::Run).with_if("false"),
  ]));
  h.engine.start().await;

  assert!(h.logs.lines_at("step_1.log", LogLevel::Debug).contains(&"Publish".to_string()));
  assert!(h
    .logs
    .lines_at("step_2.log", LogLevel::Debug)
    .contains(&"[skipped] Run echo".to_string()));
}

#[tokio::test]
#[serial]
async fn test_reserved_steps_input_warns() {
  setup_tracing();
  let h = harness(
    EngineConfig::default()
      .with_inputs(json!({ "steps": ["not", "allowed"] }))
      .with_steps(vec![StepSpec::plugin("echo", PluginType::Run)]),
  );
  let ctx = h.engine.start().await;

  assert_eq!(ctx.status, StepStatus::Success);
  assert_eq!(h.logs.lines_at("step_1.log", LogLevel::Warn).len(), 1);
}

#[tokio::test]
#[serial]
async fn test_loggers_are_closed_before_upload() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let factory = MemoryLoggerFactory::default();
  let uploader = Arc::new(CloseCheckingUploader {
    store: factory.store.clone(),
    uploads: Mutex::new(Vec::new()),
  });
  let engine = Engine::builder(EngineConfig::default().with_log_prefix(dir.path()).with_steps(vec![
    StepSpec::plugin("echo", PluginType::Run),
    StepSpec::plugin("broken", PluginType::Run).continue_on_error(true),
    StepSpec::plugin("broken", PluginType::Run),
    StepSpec::plugin("echo", PluginType::Run),
  ]))
  .with_plugin_loader(registry())
  .with_logger_factory(Arc::new(factory))
  .with_log_uploader(uploader.clone())
  .build();

  engine.start().await;

  let uploads = uploader.uploads.lock().clone();
  let keys: Vec<&str> = uploads.iter().map(|(key, _)| key.as_str()).collect();
  assert_eq!(
    keys,
    vec!["step_init.log", "step_1.log", "step_2.log", "step_3.log", "step_4.log", "step_completed.log"]
  );
  assert!(uploads.iter().all(|(_, closed)| *closed), "uploads: {:?}", uploads);
}

#[tokio::test]
#[serial]
async fn test_failed_init_log_is_closed_before_upload() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let factory = MemoryLoggerFactory::default();
  let uploader = Arc::new(CloseCheckingUploader {
    store: factory.store.clone(),
    uploads: Mutex::new(Vec::new()),
  });
  let events = Arc::new(RecordingEvents::default());
  *events.init_error.lock() = Some("checkout failed".to_string());
  let engine = Engine::builder(
    EngineConfig::default()
      .with_log_prefix(dir.path())
      .with_steps(vec![StepSpec::plugin("echo", PluginType::Run)]),
  )
  .with_plugin_loader(registry())
  .with_logger_factory(Arc::new(factory))
  .with_events(events)
  .with_log_uploader(uploader.clone())
  .build();

  let ctx = engine.start().await;
  assert_eq!(ctx.status, StepStatus::Failure);

  let uploads = uploader.uploads.lock().clone();
  assert_eq!(uploads[0], ("step_init.log".to_string(), true));
  assert!(uploads.iter().all(|(_, closed)| *closed), "uploads: {:?}", uploads);
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn test_tracing_output_never_carries_secrets() {
  let capture = CapturedTrace::default();
  let writer = capture.clone();
  let subscriber = tracing_subscriber::fmt()
    .with_max_level(Level::TRACE)
    .with_ansi(false)
    .with_writer(move || writer.clone())
    .finish();
  let _guard = tracing::subscriber::set_default(subscriber);

  let dir = tempfile::tempdir().unwrap();
  let engine = Engine::builder(
    EngineConfig::default()
      .with_cwd(dir.path())
      .with_inputs(json!({ "secrets": { "TOKEN": "s3cr3tvalue" } }))
      .with_steps(vec![
        StepSpec::run("echo ${{ secrets.TOKEN }}"),
        StepSpec::run("echo ${{ secrets.TOKEN }} >&2; exit 1"),
      ]),
  )
  .build();

  let ctx = engine.start().await;
  assert_eq!(ctx.status, StepStatus::Failure);

  let traced = capture.text();
  assert!(traced.contains("Running command."), "trace was: {}", traced);
  assert!(traced.contains("Step failed."), "trace was: {}", traced);
  assert!(traced.contains("[REDACTED]"), "trace was: {}", traced);
  assert!(!traced.contains("s3cr3tvalue"), "trace was: {}", traced);
}
