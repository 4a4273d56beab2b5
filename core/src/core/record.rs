// cd_engine/src/core/record.rs

//! The internal run-status record: the single authoritative verdict of a run.
//!
//! `editStatusAble` is a one-way lock. Once a hard failure or a cancellation clears it,
//! no later outcome can move the verdict. Per-id outcomes are a side index for template
//! lookups and are written regardless of the lock.

use crate::core::context::{round_secs, StepEntry};
use crate::core::status::StepStatus;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Outcome stored under a step's caller-assigned `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
  pub status: StepStatus,
  pub outputs: Value,
}

#[derive(Debug)]
pub struct RunRecord {
  status: StepStatus,
  edit_status_able: bool,
  steps: BTreeMap<String, StepOutcome>,
  init_data: Option<StepEntry>,
  start_time: Instant,
}

impl Default for RunRecord {
  fn default() -> Self {
    Self {
      status: StepStatus::Pending,
      edit_status_able: true,
      steps: BTreeMap::new(),
      init_data: None,
      start_time: Instant::now(),
    }
  }
}

impl RunRecord {
  pub fn status(&self) -> StepStatus {
    self.status
  }

  pub fn is_editable(&self) -> bool {
    self.edit_status_able
  }

  pub fn record_success(&mut self) {
    if self.edit_status_able {
      self.status = StepStatus::Success;
    }
  }

  /// `continue_on_error` downgrades the failure to `error-with-continue` and leaves the lock open.
  pub fn record_failure(&mut self, continue_on_error: bool) {
    if !self.edit_status_able {
      return;
    }
    if continue_on_error {
      self.status = StepStatus::ErrorWithContinue;
    } else {
      self.status = StepStatus::Failure;
      self.edit_status_able = false;
    }
  }

  pub fn record_cancel(&mut self) {
    if !self.edit_status_able {
      return;
    }
    self.status = StepStatus::Cancel;
    self.edit_status_able = false;
  }

  pub fn record_outcome(&mut self, id: &str, status: StepStatus, outputs: Value) {
    self.steps.insert(id.to_string(), StepOutcome { status, outputs });
  }

  pub fn steps(&self) -> &BTreeMap<String, StepOutcome> {
    &self.steps
  }

  pub fn init_data(&self) -> Option<&StepEntry> {
    self.init_data.as_ref()
  }

  pub fn set_init_data(&mut self, entry: StepEntry) {
    self.init_data = Some(entry);
  }

  /// Status as reported to the caller once the run is over.
  pub fn reported_status(&self) -> StepStatus {
    self.status.reported()
  }

  pub fn mark_started(&mut self) {
    self.start_time = Instant::now();
  }

  /// Seconds since the last `mark_started`, rounded to two decimals.
  pub fn elapsed_secs(&self) -> f64 {
    round_secs(self.start_time.elapsed().as_secs_f64())
  }
}

/// Shared handle to the record. Cancellation writes through it from outside the step loop.
#[derive(Debug, Clone, Default)]
pub struct RecordHandle(Arc<Mutex<RunRecord>>);

impl RecordHandle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn status(&self) -> StepStatus {
    self.0.lock().status()
  }

  pub fn reported_status(&self) -> StepStatus {
    self.0.lock().reported_status()
  }

  pub fn with<R>(&self, f: impl FnOnce(&mut RunRecord) -> R) -> R {
    let mut guard = self.0.lock();
    f(&mut guard)
  }

  pub fn steps_value(&self) -> Value {
    serde_json::to_value(self.0.lock().steps()).unwrap_or(Value::Null)
  }
}
