// cd_engine/src/conditional/evaluator.rs

//! Evaluates a step's `if` expression against the current run verdict.

use crate::conditional::template::{render_expression, TemplateCompiler};
use crate::core::status::StepStatus;
use crate::error::EngineResult;
use serde_json::Value;
use tracing::{event, Level};

pub const FAILURE_PREDICATE: &str = "failure()";
pub const SUCCESS_PREDICATE: &str = "success()";
pub const CANCELLED_PREDICATE: &str = "cancelled()";
pub const ALWAYS_PREDICATE: &str = "always()";

fn bool_literal(value: bool) -> &'static str {
  if value {
    "true"
  } else {
    "false"
  }
}

/// Replaces the four reserved predicates with `true`/`false` literals.
///
/// `success()` means "not failure", so it is `true` during a cancelled run.
pub fn rewrite_predicates(condition: &str, status: StepStatus) -> String {
  condition
    .replace(FAILURE_PREDICATE, bool_literal(status == StepStatus::Failure))
    .replace(SUCCESS_PREDICATE, bool_literal(status != StepStatus::Failure))
    .replace(CANCELLED_PREDICATE, bool_literal(status == StepStatus::Cancel))
    .replace(ALWAYS_PREDICATE, "true")
}

pub struct ConditionEvaluator<'a> {
  compiler: &'a dyn TemplateCompiler,
}

impl<'a> ConditionEvaluator<'a> {
  pub fn new(compiler: &'a dyn TemplateCompiler) -> Self {
    Self { compiler }
  }

  /// Rewrites and renders `condition`. The result is whatever the template produced.
  pub fn compile(&self, condition: &str, status: StepStatus, variables: &Value) -> EngineResult<String> {
    let rewritten = rewrite_predicates(condition, status);
    render_expression(self.compiler, &rewritten, variables)
  }

  /// True only when the compiled condition is exactly `"true"`. Compile errors count as false.
  pub fn evaluate(&self, condition: &str, status: StepStatus, variables: &Value) -> bool {
    match self.compile(condition, status, variables) {
      Ok(rendered) => rendered == "true",
      Err(e) => {
        event!(Level::WARN, condition, error = %e, "Condition failed to compile; treating as false.");
        false
      }
    }
  }
}
