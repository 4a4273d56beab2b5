// cd_engine/src/pipeline/definition.rs

//! Contains the `Engine` struct, its construction through `EngineOptions`, and the
//! cancellation surface.

use crate::conditional::template::{TemplateCompiler, TeraCompiler};
use crate::config::EngineConfig;
use crate::core::context::{Context, StepEntry};
use crate::core::context_data::ContextData;
use crate::core::env::EnvSnapshot;
use crate::core::plugin::PluginLoader;
use crate::core::record::RecordHandle;
use crate::core::status::StepStatus;
use crate::logging::{collect_secrets, FileLoggerFactory, LogUploader, LoggerFactory, LoggerSource, SecretMasker, StepLogger};
use crate::pipeline::hooks::{EngineEvents, NoopEvents};
use crate::process::registry::ProcessRegistry;
use crate::registry::PluginRegistry;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{event, Level};

pub const INIT_STEP_COUNT: &str = "init";
pub const INIT_STEP_NAME: &str = "Set up task";
pub const COMPLETED_STEP_COUNT: &str = "completed";
pub(crate) const INIT_LOG_BANNER: &str = "Set up task";
pub(crate) const COMPLETED_LOG_BANNER: &str = "Complete task";
pub(crate) const RESERVED_STEPS_WARNING: &str =
  "steps is a built-in field, and the steps field in the inputs will be ignored.";

/// Collaborators and configuration for one engine.
///
/// Everything except the config is optional: without hooks nothing is called, without a
/// plugin loader every plugin step fails with `PluginNotFound`, and without a logger the
/// default file logger is built from `config.log_config`.
pub struct EngineOptions {
  config: EngineConfig,
  events: Option<Arc<dyn EngineEvents>>,
  plugins: Option<Arc<dyn PluginLoader>>,
  logger_factory: Option<Arc<dyn LoggerFactory>>,
  custom_logger: Option<Arc<dyn StepLogger>>,
  uploader: Option<Arc<dyn LogUploader>>,
  compiler: Option<Arc<dyn TemplateCompiler>>,
  env: Option<EnvSnapshot>,
}

impl EngineOptions {
  pub fn new(config: EngineConfig) -> Self {
    Self {
      config,
      events: None,
      plugins: None,
      logger_factory: None,
      custom_logger: None,
      uploader: None,
      compiler: None,
      env: None,
    }
  }

  pub fn with_events(mut self, events: Arc<dyn EngineEvents>) -> Self {
    self.events = Some(events);
    self
  }

  pub fn with_plugin_loader(mut self, loader: Arc<dyn PluginLoader>) -> Self {
    self.plugins = Some(loader);
    self
  }

  pub fn with_logger_factory(mut self, factory: Arc<dyn LoggerFactory>) -> Self {
    self.logger_factory = Some(factory);
    self
  }

  /// Uses `logger` for every log key instead of a factory. Errors are then written at debug level.
  pub fn with_custom_logger(mut self, logger: Arc<dyn StepLogger>) -> Self {
    self.custom_logger = Some(logger);
    self
  }

  /// Only used when `log_config.log_prefix` is also set.
  pub fn with_log_uploader(mut self, uploader: Arc<dyn LogUploader>) -> Self {
    self.uploader = Some(uploader);
    self
  }

  pub fn with_template_compiler(mut self, compiler: Arc<dyn TemplateCompiler>) -> Self {
    self.compiler = Some(compiler);
    self
  }

  /// Overrides the environment snapshot taken from the current process.
  pub fn with_env(mut self, env: EnvSnapshot) -> Self {
    self.env = Some(env);
    self
  }

  pub fn build(self) -> Engine {
    Engine::new(self)
  }
}

/// One run of a step list. An engine is single-use: `start` runs once.
pub struct Engine {
  pub(crate) config: EngineConfig,
  pub(crate) events: Arc<dyn EngineEvents>,
  pub(crate) plugins: Arc<dyn PluginLoader>,
  pub(crate) loggers: LoggerSource,
  pub(crate) uploader: Option<Arc<dyn LogUploader>>,
  pub(crate) compiler: Arc<dyn TemplateCompiler>,
  pub(crate) env: EnvSnapshot,
  /// Applied to every command and error text before it reaches a `tracing` field.
  pub(crate) masker: Arc<SecretMasker>,
  /// Whether `inputs.steps` is set; it is reserved and warned about on every step.
  pub(crate) reserved_steps_input: bool,
  pub(crate) context: ContextData,
  pub(crate) record: RecordHandle,
  pub(crate) processes: ProcessRegistry,
  pub(crate) started: AtomicBool,
}

impl Engine {
  pub fn new(options: EngineOptions) -> Self {
    let EngineOptions {
      config,
      events,
      plugins,
      logger_factory,
      custom_logger,
      uploader,
      compiler,
      env,
    } = options;

    let masker = Arc::new(SecretMasker::new(collect_secrets(&config.inputs)));
    let loggers = match (custom_logger, logger_factory) {
      (Some(logger), _) => {
        event!(Level::DEBUG, "Using custom logger for every log key.");
        LoggerSource::Custom(logger, Arc::clone(&masker))
      }
      (None, Some(factory)) => LoggerSource::Factory(factory),
      (None, None) => LoggerSource::Factory(Arc::new(FileLoggerFactory::new(
        config.log_config.log_prefix.clone(),
        config.log_config.log_level,
        config.log_config.eol.clone(),
        SecretMasker::clone(&masker),
      ))),
    };

    let env = env.unwrap_or_else(|| EnvSnapshot::capture(&config.unset_envs));
    let reserved_steps_input = config.inputs.get("steps").is_some();
    let context = ContextData::new(Context::new(config.resolve_cwd(), config.inputs.clone()));
    event!(Level::DEBUG, cwd = %context.read().cwd.display(), "Engine constructed.");

    Self {
      events: events.unwrap_or_else(|| Arc::new(NoopEvents)),
      plugins: plugins.unwrap_or_else(|| Arc::new(PluginRegistry::new())),
      loggers,
      uploader,
      compiler: compiler.unwrap_or_else(|| Arc::new(TeraCompiler::new())),
      env,
      masker,
      reserved_steps_input,
      context,
      record: RecordHandle::new(),
      processes: ProcessRegistry::new(),
      started: AtomicBool::new(false),
      config,
    }
  }

  pub fn builder(config: EngineConfig) -> EngineOptions {
    EngineOptions::new(config)
  }

  /// A snapshot of the run context as it is right now.
  pub fn context(&self) -> Context {
    self.context.snapshot()
  }

  /// Requests cancellation. Idempotent and non-blocking.
  pub fn cancel(&self) {
    self.cancel_handle().cancel();
  }

  /// A cloneable handle that can cancel this engine from another task.
  pub fn cancel_handle(&self) -> CancelHandle {
    CancelHandle {
      record: self.record.clone(),
      processes: self.processes.clone(),
    }
  }

  /// `text` with every configured secret redacted.
  pub(crate) fn redact(&self, text: &str) -> String {
    self.masker.mask(text)
  }

  pub(crate) fn init_entry(&self) -> Option<StepEntry> {
    self.record.with(|r| r.init_data().cloned())
  }
}

#[derive(Debug, Clone)]
pub struct CancelHandle {
  record: RecordHandle,
  processes: ProcessRegistry,
}

impl CancelHandle {
  /// Marks the run cancelled and signals every live child process.
  ///
  /// After a hard failure the verdict stays `failure`, but live processes are still killed.
  pub fn cancel(&self) {
    let status = self.record.with(|r| {
      r.record_cancel();
      r.status()
    });
    let killed = self.processes.kill_all();
    event!(Level::INFO, status = %status, killed, "Cancellation requested.");
  }

  pub fn is_cancelled(&self) -> bool {
    self.record.status() == StepStatus::Cancel
  }
}
