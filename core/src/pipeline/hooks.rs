// cd_engine/src/pipeline/hooks.rs

//! Lifecycle hooks a caller can attach to an engine run, and the engine-side helpers
//! that invoke them.
//!
//! Only `on_init` can affect the run: its error fails the run and its result may supply the
//! step list. Errors from the other hooks are written to the step log and dropped.

use crate::core::context::StepEntry;
use crate::core::context_data::ContextData;
use crate::core::step::{Step, StepSpec};
use crate::error::EngineError;
use crate::logging::StepLogger;
use crate::pipeline::definition::Engine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{event, Level};

/// What `on_init` may hand back. Unknown fields become the init entry's outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitOutput {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub steps: Option<Vec<StepSpec>>,
  #[serde(flatten)]
  pub outputs: Map<String, Value>,
}

impl InitOutput {
  pub fn with_steps(steps: Vec<StepSpec>) -> Self {
    Self {
      steps: Some(steps),
      ..Default::default()
    }
  }
}

/// Caller hooks. Every method has a no-op default.
///
/// Hooks receive the shared context handle. Lock guards taken from it must be dropped
/// before the hook awaits anything.
#[async_trait]
pub trait EngineEvents: Send + Sync {
  async fn on_init(&self, _context: ContextData, _logger: Arc<dyn StepLogger>) -> anyhow::Result<Option<InitOutput>> {
    Ok(None)
  }

  async fn on_pre_run(&self, _entry: StepEntry, _context: ContextData, _logger: Arc<dyn StepLogger>) -> anyhow::Result<()> {
    Ok(())
  }

  async fn on_post_run(&self, _entry: StepEntry, _context: ContextData, _logger: Arc<dyn StepLogger>) -> anyhow::Result<()> {
    Ok(())
  }

  async fn on_completed(&self, _context: ContextData, _logger: Arc<dyn StepLogger>) -> anyhow::Result<()> {
    Ok(())
  }
}

/// Hooks that do nothing; used when none are attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl EngineEvents for NoopEvents {}

impl Engine {
  pub(crate) async fn invoke_init_hook(&self, logger: &Arc<dyn StepLogger>) -> Result<InitOutput, EngineError> {
    event!(Level::DEBUG, "on_init start");
    let output = self
      .events
      .on_init(self.context.clone(), Arc::clone(logger))
      .await
      .map_err(|source| EngineError::HookFailure { hook: "on_init", source })?;
    event!(Level::DEBUG, "on_init end");
    Ok(output.unwrap_or_default())
  }

  pub(crate) async fn invoke_pre_run_hook(&self, step: &Step, logger: &Arc<dyn StepLogger>) {
    let Some(entry) = self.context.step_entry_cloned(&step.step_count) else {
      return;
    };
    event!(Level::DEBUG, step_count = %step.step_count, "on_pre_run start");
    if let Err(source) = self.events.on_pre_run(entry, self.context.clone(), Arc::clone(logger)).await {
      self.output_error_log(logger, &EngineError::HookFailure { hook: "on_pre_run", source });
    }
  }

  pub(crate) async fn invoke_post_run_hook(&self, step: &Step, logger: &Arc<dyn StepLogger>) {
    let Some(entry) = self.context.step_entry_cloned(&step.step_count) else {
      return;
    };
    event!(Level::DEBUG, step_count = %step.step_count, "on_post_run start");
    if let Err(source) = self.events.on_post_run(entry, self.context.clone(), Arc::clone(logger)).await {
      self.output_error_log(logger, &EngineError::HookFailure { hook: "on_post_run", source });
    }
  }

  pub(crate) async fn invoke_completed_hook(&self, logger: &Arc<dyn StepLogger>) {
    event!(Level::DEBUG, "on_completed start");
    if let Err(source) = self.events.on_completed(self.context.clone(), Arc::clone(logger)).await {
      self.output_error_log(logger, &EngineError::HookFailure { hook: "on_completed", source });
    }
  }
}
