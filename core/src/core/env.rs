// cd_engine/src/core/env.rs

//! Explicit environment snapshot handed to child processes.
//!
//! The engine never mutates the process-wide environment. The marker key and the
//! caller's unset list are applied to a captured copy instead.

use std::collections::BTreeMap;

pub const ENGINE_MARKER_KEY: &str = "CD_ENGINE";
pub const ENGINE_MARKER_VALUE: &str = "true";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
  vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
  /// Captures the current process environment, minus `unset`, plus the engine marker.
  /// Non-unicode entries are dropped.
  pub fn capture(unset: &[String]) -> Self {
    let vars = std::env::vars_os().filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
    Self::from_vars(vars, unset)
  }

  pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>, unset: &[String]) -> Self {
    let mut vars: BTreeMap<String, String> = vars.into_iter().collect();
    for key in unset {
      vars.remove(key);
    }
    vars.insert(ENGINE_MARKER_KEY.to_string(), ENGINE_MARKER_VALUE.to_string());
    Self { vars }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.vars.get(key).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }

  /// Returns the snapshot with `overrides` layered on top.
  pub fn overlay(&self, overrides: BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut merged = self.vars.clone();
    merged.extend(overrides);
    merged
  }
}
