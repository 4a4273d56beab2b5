// cd_engine/src/core/context.rs

//! The caller-visible run context and its per-step entries.

use crate::core::status::StepStatus;
use crate::core::step::Step;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Result entry for one step (or for the synthetic init phase).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepEntry {
  #[serde(rename = "stepCount")]
  pub step_count: String,
  pub name: String,
  pub status: StepStatus,
  pub outputs: Value,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Seconds, rounded to two decimals.
  pub process_time: f64,
  #[serde(skip)]
  pub definition: Option<Step>,
}

impl StepEntry {
  /// A `pending` entry for a step that has not been touched yet.
  pub fn pending(step: &Step) -> Self {
    Self {
      step_count: step.step_count.clone(),
      name: step.display_name(),
      status: StepStatus::Pending,
      outputs: Value::Object(Default::default()),
      error: None,
      process_time: 0.0,
      definition: Some(step.clone()),
    }
  }
}

/// Owned by the engine for one run and returned from `Engine::start`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
  pub status: StepStatus,
  pub completed: bool,
  pub cwd: PathBuf,
  pub inputs: Value,
  /// Environment of the step currently executing.
  pub env: BTreeMap<String, String>,
  #[serde(rename = "stepCount", skip_serializing_if = "Option::is_none")]
  pub step_count: Option<String>,
  pub steps: Vec<StepEntry>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl Context {
  pub fn new(cwd: PathBuf, inputs: Value) -> Self {
    Self {
      status: StepStatus::Pending,
      completed: false,
      cwd,
      inputs,
      env: BTreeMap::new(),
      step_count: None,
      steps: Vec::new(),
      error: None,
    }
  }

  pub fn step(&self, step_count: &str) -> Option<&StepEntry> {
    self.steps.iter().find(|entry| entry.step_count == step_count)
  }

  pub fn step_mut(&mut self, step_count: &str) -> Option<&mut StepEntry> {
    self.steps.iter_mut().find(|entry| entry.step_count == step_count)
  }

  /// `inputs.env` as a string map. Non-string values are rendered as JSON.
  pub fn input_env(&self) -> BTreeMap<String, String> {
    match self.inputs.get("env") {
      Some(Value::Object(map)) => map
        .iter()
        .map(|(key, value)| {
          let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
          };
          (key.clone(), value)
        })
        .collect(),
      _ => BTreeMap::new(),
    }
  }
}

/// Rounds a duration in seconds to two decimals.
pub fn round_secs(secs: f64) -> f64 {
  (secs * 100.0).round() / 100.0
}
