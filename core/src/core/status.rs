// cd_engine/src/core/status.rs

//! Status values shared by the run context, the run-status record and step entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a run or of a single step.
///
/// `Skip` only ever appears on step entries; a run is never reported as skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StepStatus {
  #[default]
  #[serde(rename = "pending")]
  Pending,
  #[serde(rename = "running")]
  Running,
  #[serde(rename = "success")]
  Success,
  #[serde(rename = "failure")]
  Failure,
  #[serde(rename = "cancelled")]
  Cancel,
  #[serde(rename = "skipped")]
  Skip,
  #[serde(rename = "error-with-continue")]
  ErrorWithContinue,
}

impl StepStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      StepStatus::Pending => "pending",
      StepStatus::Running => "running",
      StepStatus::Success => "success",
      StepStatus::Failure => "failure",
      StepStatus::Cancel => "cancelled",
      StepStatus::Skip => "skipped",
      StepStatus::ErrorWithContinue => "error-with-continue",
    }
  }

  /// The status a caller sees once the run is over: a tolerated error counts as success.
  pub fn reported(self) -> Self {
    match self {
      StepStatus::ErrorWithContinue => StepStatus::Success,
      other => other,
    }
  }
}

impl fmt::Display for StepStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
