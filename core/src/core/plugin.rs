// cd_engine/src/core/plugin.rs

//! Capability interface for plugin steps.

use crate::core::context::Context;
use crate::error::EngineResult;
use crate::logging::StepLogger;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// The context a plugin receives: the run context plus a `$variables` snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PluginContext {
  #[serde(flatten)]
  pub context: Context,
  /// `{...inputs, status, steps, env, inputs}`, the same object templates render against.
  #[serde(rename = "$variables")]
  pub variables: Value,
}

/// A plugin module. The value a call returns becomes the step's outputs; an error
/// becomes the step's error.
#[async_trait]
pub trait Plugin: Send + Sync {
  async fn run(&self, inputs: Value, context: PluginContext, logger: Arc<dyn StepLogger>) -> anyhow::Result<Value>;

  async fn post_run(&self, inputs: Value, context: PluginContext, logger: Arc<dyn StepLogger>)
    -> anyhow::Result<Value>;
}

/// Resolves a step's `plugin` reference to a loaded plugin.
pub trait PluginLoader: Send + Sync {
  fn load(&self, module_ref: &str) -> EngineResult<Arc<dyn Plugin>>;
}
