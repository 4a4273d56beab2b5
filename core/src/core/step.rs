// cd_engine/src/core/step.rs

//! Defines the declarative step model: the caller-facing `StepSpec` shape and the
//! normalized `Step` the engine executes.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Which entry point of a plugin a step invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PluginType {
  #[default]
  #[serde(rename = "run")]
  Run,
  #[serde(rename = "postRun")]
  PostRun,
}

/// A step as written by the caller (JSON/YAML). `stepCount` may be omitted and is
/// assigned by [`parse_steps`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepSpec {
  #[serde(rename = "stepCount", default, skip_serializing_if = "Option::is_none")]
  pub step_count: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub run: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub plugin: Option<String>,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub plugin_type: Option<PluginType>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub inputs: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
  pub if_condition: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub env: Option<BTreeMap<String, String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub working_directory: Option<String>,
  #[serde(default)]
  pub continue_on_error: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
}

impl StepSpec {
  pub fn run(command: impl Into<String>) -> Self {
    Self {
      run: Some(command.into()),
      ..Default::default()
    }
  }

  pub fn plugin(module_ref: impl Into<String>, plugin_type: PluginType) -> Self {
    Self {
      plugin: Some(module_ref.into()),
      plugin_type: Some(plugin_type),
      ..Default::default()
    }
  }

  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.id = Some(id.into());
    self
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_if(mut self, condition: impl Into<String>) -> Self {
    self.if_condition = Some(condition.into());
    self
  }

  pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.get_or_insert_with(BTreeMap::new).insert(key.into(), value.into());
    self
  }

  pub fn with_inputs(mut self, inputs: Value) -> Self {
    self.inputs = Some(inputs);
    self
  }

  pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
    self.working_directory = Some(dir.into());
    self
  }

  pub fn continue_on_error(mut self, enabled: bool) -> Self {
    self.continue_on_error = enabled;
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStep {
  pub run: String,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
  #[serde(rename = "working-directory", skip_serializing_if = "Option::is_none")]
  pub working_directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginStep {
  pub plugin: String,
  #[serde(rename = "type")]
  pub plugin_type: PluginType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub inputs: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepKind {
  Run(RunStep),
  Plugin(PluginStep),
}

/// A normalized step: exactly one of `run` / `plugin`, with a unique `stepCount`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
  #[serde(rename = "stepCount")]
  pub step_count: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
  pub if_condition: Option<String>,
  #[serde(rename = "continue-on-error")]
  pub continue_on_error: bool,
  #[serde(flatten)]
  pub kind: StepKind,
}

impl Step {
  fn from_spec(spec: StepSpec, index: usize) -> EngineResult<Self> {
    let kind = match (spec.run, spec.plugin) {
      (Some(run), None) => StepKind::Run(RunStep {
        run,
        env: spec.env.unwrap_or_default(),
        working_directory: spec.working_directory,
      }),
      (None, Some(plugin)) => StepKind::Plugin(PluginStep {
        plugin,
        plugin_type: spec.plugin_type.unwrap_or_default(),
        inputs: spec.inputs,
      }),
      (Some(_), Some(_)) => {
        return Err(EngineError::InvalidStep {
          index,
          message: "a step cannot declare both 'run' and 'plugin'".to_string(),
        })
      }
      (None, None) => {
        return Err(EngineError::InvalidStep {
          index,
          message: "a step must declare either 'run' or 'plugin'".to_string(),
        })
      }
    };

    Ok(Step {
      step_count: spec.step_count.unwrap_or_else(|| (index + 1).to_string()),
      name: spec.name,
      id: spec.id,
      if_condition: spec.if_condition,
      continue_on_error: spec.continue_on_error,
      kind,
    })
  }

  /// The name shown in logs and step entries when the caller gave none.
  pub fn display_name(&self) -> String {
    if let Some(name) = &self.name {
      return name.clone();
    }
    match &self.kind {
      StepKind::Run(run) => format!("Run {}", run.run),
      StepKind::Plugin(plugin) => match plugin.plugin_type {
        PluginType::Run => format!("Run {}", plugin.plugin),
        PluginType::PostRun => format!("Post Run {}", plugin.plugin),
      },
    }
  }

  pub fn run_env(&self) -> BTreeMap<String, String> {
    match &self.kind {
      StepKind::Run(run) => run.env.clone(),
      StepKind::Plugin(_) => BTreeMap::new(),
    }
  }
}

/// Normalizes caller step specs into executable steps.
///
/// Steps without a `stepCount` get their 1-based position. Duplicate counts are rejected
/// because the count is both the state id and the log-file key.
pub fn parse_steps(specs: Vec<StepSpec>) -> EngineResult<Vec<Step>> {
  let mut seen = HashSet::new();
  specs
    .into_iter()
    .enumerate()
    .map(|(index, spec)| {
      let step = Step::from_spec(spec, index)?;
      if !seen.insert(step.step_count.clone()) {
        return Err(EngineError::InvalidStep {
          index,
          message: format!("duplicate stepCount '{}'", step.step_count),
        });
      }
      Ok(step)
    })
    .collect()
}
