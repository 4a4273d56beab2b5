// cd_engine/examples/run_steps.rs

use async_trait::async_trait;
use cd_engine::{
  Engine, EngineConfig, EngineError, EngineEvents, InitOutput, Plugin, PluginContext, PluginRegistry, StepLogger,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

// 1. A plugin: reads its inputs and returns outputs later steps can reference.
struct VersionPlugin;

#[async_trait]
impl Plugin for VersionPlugin {
  async fn run(&self, inputs: Value, context: PluginContext, logger: Arc<dyn StepLogger>) -> anyhow::Result<Value> {
    let branch = context.variables["branch"].as_str().unwrap_or("unknown");
    let prefix = inputs["prefix"].as_str().unwrap_or("v");
    logger.info(&format!("computing version for {}", branch));
    Ok(json!({ "version": format!("{}1.4.{}", prefix, branch.len()) }))
  }

  async fn post_run(&self, _inputs: Value, _context: PluginContext, logger: Arc<dyn StepLogger>) -> anyhow::Result<Value> {
    logger.info("nothing to clean up");
    Ok(json!({}))
  }
}

// 2. Hooks: the init hook names the run; the completed hook reports the verdict.
struct Reporter;

#[async_trait]
impl EngineEvents for Reporter {
  async fn on_init(
    &self,
    _context: cd_engine::ContextData,
    logger: Arc<dyn StepLogger>,
  ) -> anyhow::Result<Option<InitOutput>> {
    logger.info("preparing workspace");
    Ok(Some(InitOutput {
      name: Some("Prepare release".to_string()),
      ..Default::default()
    }))
  }

  async fn on_completed(&self, context: cd_engine::ContextData, _logger: Arc<dyn StepLogger>) -> anyhow::Result<()> {
    info!(status = %context.read().status, "run completed");
    Ok(())
  }
}

#[tokio::main]
async fn main() -> Result<(), EngineError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  let log_dir = std::env::temp_dir().join("cd-engine-demo");
  let config = EngineConfig::from_json_str(
    r#"{
      "inputs": {
        "branch": "main",
        "secrets": { "DEPLOY_TOKEN": "hunter2" },
        "env": { "STAGE": "staging" }
      },
      "steps": [
        { "id": "version", "plugin": "version", "type": "run", "inputs": { "prefix": "v" } },
        { "name": "Build", "run": "echo building ${{ steps.version.outputs.version }} for $STAGE" },
        { "name": "Flaky check", "run": "exit 3", "continue-on-error": true },
        { "name": "Deploy", "run": "echo deploying with $DEPLOY_TOKEN", "env": { "DEPLOY_TOKEN": "hunter2" },
          "if": "${{ success() && branch === 'main' }}" },
        { "name": "Notify failure", "run": "echo failed", "if": "failure()" }
      ]
    }"#,
  )?
  .with_log_prefix(log_dir.clone());

  let registry = PluginRegistry::new().with_plugin("version", Arc::new(VersionPlugin));
  let engine = Engine::builder(config)
    .with_plugin_loader(Arc::new(registry))
    .with_events(Arc::new(Reporter))
    .build();

  let context = engine.start().await;

  for step in &context.steps {
    info!(
      "[{}] {} -> {} ({}s)",
      step.step_count, step.name, step.status, step.process_time
    );
  }
  info!(status = %context.status, logs = %log_dir.display(), "final verdict");
  Ok(())
}
