// cd_engine/src/pipeline/executor.rs

//! The step executor: runs one step (shell command or plugin) and normalizes its outcome
//! into the run-status record and the step's context entry.

use crate::conditional::template::render_expression;
use crate::core::plugin::PluginContext;
use crate::core::status::StepStatus;
use crate::core::step::{PluginType, Step, StepKind};
use crate::error::{error_chain, EngineError, EngineResult};
use crate::logging::{log_file_name, LoggerOverrides, StepLogger};
use crate::pipeline::definition::{Engine, RESERVED_STEPS_WARNING};
use crate::process::shell::{run_shell_command, ShellCommand};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{event, Level};

/// An absolute `working-directory` wins; a relative one is joined onto the run `cwd`.
pub fn resolve_working_dir(cwd: &Path, working_directory: Option<&str>) -> PathBuf {
  match working_directory {
    Some(dir) if Path::new(dir).is_absolute() => PathBuf::from(dir),
    Some(dir) => cwd.join(dir),
    None => cwd.to_path_buf(),
  }
}

fn empty_outputs() -> Value {
  Value::Object(Map::new())
}

impl Engine {
  /// Runs a step that passed gating. `if_passed` is true when an explicit `if` allowed it,
  /// which exempts it from being reclassified as cancelled.
  ///
  /// Only a non-continuable failure returns `Err`, after it has been recorded.
  pub(crate) async fn handle_src(&self, step: &Step, logger: &Arc<dyn StepLogger>, if_passed: bool) -> EngineResult<()> {
    self.invoke_pre_run_hook(step, logger).await;
    let result = self.do_src(step, logger).await;
    let file_name = log_file_name(&step.step_count);

    match result {
      Ok(outputs) => {
        if !if_passed && self.record.status() == StepStatus::Cancel {
          event!(Level::INFO, "Run cancelled while the step was executing.");
          return self.do_cancel(step, logger).await;
        }
        let process_time = self.record.with(|r| {
          r.record_success();
          if let Some(id) = &step.id {
            r.record_outcome(id, StepStatus::Success, outputs.clone());
          }
          r.elapsed_secs()
        });
        self.context.update_step(&step.step_count, |entry| {
          entry.status = StepStatus::Success;
          entry.outputs = outputs;
          entry.process_time = process_time;
        });
        self.context.write().step_count = Some(step.step_count.clone());
        event!(Level::INFO, process_time, "Step succeeded.");

        self.invoke_post_run_hook(step, logger).await;
        logger.close();
        self.upload_log(&file_name).await;
        Ok(())
      }
      Err(err) => {
        let status = if step.continue_on_error {
          StepStatus::ErrorWithContinue
        } else {
          StepStatus::Failure
        };
        let process_time = self.record.with(|r| {
          r.record_failure(step.continue_on_error);
          if let Some(id) = &step.id {
            r.record_outcome(id, status, empty_outputs());
          }
          r.elapsed_secs()
        });

        if step.continue_on_error {
          event!(Level::WARN, error = %self.redact(&err.to_string()), "Step failed; continuing on error.");
          self.context.update_step(&step.step_count, |entry| {
            entry.status = status;
            entry.process_time = process_time;
          });
          logger.close();
          self.upload_log(&file_name).await;
          return Ok(());
        }

        event!(Level::ERROR, error = %self.redact(&err.to_string()), "Step failed.");
        let message = err.to_string();
        self.context.update_step(&step.step_count, |entry| {
          entry.status = status;
          entry.error = Some(message.clone());
          entry.process_time = process_time;
        });
        self.context.write().error = Some(message);
        self.output_error_log(logger, &err);
        logger.close();
        self.upload_log(&file_name).await;
        Err(err)
      }
    }
  }

  /// Dispatches by step kind. The returned value becomes the step's outputs.
  async fn do_src(&self, step: &Step, logger: &Arc<dyn StepLogger>) -> EngineResult<Value> {
    match &step.kind {
      StepKind::Run(run) => {
        let cwd = resolve_working_dir(&self.context.read().cwd, run.working_directory.as_deref());
        self.log_name(step, logger, false);

        let variables = self.variables();
        let command = render_expression(self.compiler.as_ref(), &run.run, &variables)?;
        let env = self.render_env(step, &variables)?;
        event!(Level::DEBUG, command = %self.redact(&command), cwd = %cwd.display(), "Running command.");

        let shell = ShellCommand {
          command,
          cwd,
          env: self.env.overlay(env),
        };
        let stream_logger = self
          .loggers
          .logger(&log_file_name(&step.step_count), &LoggerOverrides::with_eol(""));
        let record = self.record.clone();
        run_shell_command(
          &shell,
          stream_logger,
          &self.config.log_config.eol,
          &self.processes,
          move || record.status() == StepStatus::Cancel,
        )
        .await
      }
      StepKind::Plugin(plugin_step) => {
        self.log_name(step, logger, false);
        let plugin = self.plugins.load(&plugin_step.plugin)?;
        let context = PluginContext {
          context: self.context.snapshot(),
          variables: self.variables(),
        };
        let inputs = plugin_step.inputs.clone().unwrap_or_else(|| json!({}));
        event!(Level::DEBUG, plugin = %plugin_step.plugin, plugin_type = ?plugin_step.plugin_type, "Invoking plugin.");

        let result = match plugin_step.plugin_type {
          PluginType::Run => plugin.run(inputs, context, Arc::clone(logger)).await,
          PluginType::PostRun => plugin.post_run(inputs, context, Arc::clone(logger)).await,
        };
        result.map_err(|source| EngineError::PluginFailure {
          plugin: plugin_step.plugin.clone(),
          source,
        })
      }
    }
  }

  pub(crate) async fn do_skip(&self, step: &Step, logger: &Arc<dyn StepLogger>) -> EngineResult<()> {
    self.finish_without_running(step, logger, StepStatus::Skip).await;
    Ok(())
  }

  pub(crate) async fn do_cancel(&self, step: &Step, logger: &Arc<dyn StepLogger>) -> EngineResult<()> {
    self.finish_without_running(step, logger, StepStatus::Cancel).await;
    Ok(())
  }

  async fn finish_without_running(&self, step: &Step, logger: &Arc<dyn StepLogger>, status: StepStatus) {
    if let Some(id) = &step.id {
      self.record.with(|r| r.record_outcome(id, status, empty_outputs()));
    }
    self.log_name(step, logger, status == StepStatus::Skip);
    self.context.update_step(&step.step_count, |entry| {
      entry.status = status;
      entry.process_time = 0.0;
    });
    self.context.write().step_count = Some(step.step_count.clone());
    event!(Level::INFO, status = %status, "Step not executed.");
    logger.close();
    self.upload_log(&log_file_name(&step.step_count)).await;
  }

  /// Writes the display name into the step entry and the step log.
  fn log_name(&self, step: &Step, logger: &Arc<dyn StepLogger>, skipped: bool) {
    let name = if skipped {
      format!("[skipped] {}", step.display_name())
    } else {
      step.display_name()
    };
    logger.debug(&name);
    self.context.update_step(&step.step_count, |entry| entry.name = name);

    if self.reserved_steps_input {
      logger.warn(RESERVED_STEPS_WARNING);
    }
  }

  /// The object templates and plugins see: `{...inputs, status, steps, env, inputs}`.
  pub(crate) fn variables(&self) -> Value {
    let steps = self.record.steps_value();
    let ctx = self.context.read();
    let mut vars = match &ctx.inputs {
      Value::Object(map) => map.clone(),
      _ => Map::new(),
    };
    let mut env = ctx.input_env();
    env.extend(ctx.env.clone());

    vars.insert("status".to_string(), json!(ctx.status));
    vars.insert("steps".to_string(), steps);
    vars.insert("env".to_string(), json!(env));
    vars.insert("inputs".to_string(), ctx.inputs.clone());
    Value::Object(vars)
  }

  /// Run-level env overlaid with the step's env, every value rendered.
  fn render_env(&self, step: &Step, variables: &Value) -> EngineResult<BTreeMap<String, String>> {
    let mut merged = self.context.read().input_env();
    merged.extend(step.run_env());
    let mut rendered = BTreeMap::new();
    for (key, value) in merged {
      let value = render_expression(self.compiler.as_ref(), &value, variables)?;
      rendered.insert(key, value);
    }
    Ok(rendered)
  }

  /// Errors go to the step log at error level, or at debug level with a custom logger.
  pub(crate) fn output_error_log(&self, logger: &Arc<dyn StepLogger>, err: &EngineError) {
    let message = error_chain(err);
    if self.loggers.is_custom() {
      logger.debug(&message);
    } else {
      logger.error(&message);
    }
  }

  /// Uploads `<log_prefix>/<file_name>` when both an uploader and a prefix are configured.
  pub(crate) async fn upload_log(&self, file_name: &str) {
    let (Some(uploader), Some(prefix)) = (&self.uploader, &self.config.log_config.log_prefix) else {
      return;
    };
    let path = prefix.join(file_name);
    if let Err(source) = uploader.upload(&path).await {
      let err = EngineError::UploadFailure {
        path: path.display().to_string(),
        source,
      };
      event!(Level::WARN, error = %self.redact(&error_chain(&err)), "Log upload failed.");
    }
  }
}
