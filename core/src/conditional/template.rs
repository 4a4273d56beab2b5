// cd_engine/src/conditional/template.rs

//! Template rendering for `${{ expr }}` placeholders in conditions, commands and env values.

use crate::error::{EngineError, EngineResult};
use serde_json::Value;

/// Renders a string containing `{{ expr }}` placeholders against a variable context.
pub trait TemplateCompiler: Send + Sync {
  fn render(&self, template: &str, variables: &Value) -> EngineResult<String>;
}

/// Default compiler backed by `tera`.
///
/// Expression operators written in the `&&` / `||` / `===` / `!==` / `!x` style are mapped
/// to tera syntax inside `{{ }}` blocks only. Text outside the blocks is left untouched.
///
/// A block holding a bare variable path renders a missing or null value as an empty string.
/// Any other undefined lookup is still a render error.
#[derive(Debug, Default, Clone, Copy)]
pub struct TeraCompiler;

impl TeraCompiler {
  pub fn new() -> Self {
    TeraCompiler
  }

  pub(crate) fn translate(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
      out.push_str(&rest[..open]);
      let after_open = &rest[open + 2..];
      match after_open.find("}}") {
        Some(close) => {
          out.push_str("{{");
          out.push_str(&lenient_lookup(translate_expression(&after_open[..close])));
          out.push_str("}}");
          rest = &after_open[close + 2..];
        }
        None => {
          out.push_str(&rest[open..]);
          rest = "";
        }
      }
    }
    out.push_str(rest);
    out
  }
}

fn translate_expression(expr: &str) -> String {
  let expr = expr
    .replace("!==", "!=")
    .replace("===", "==")
    .replace("&&", " and ")
    .replace("||", " or ");

  let mut out = String::with_capacity(expr.len());
  let mut chars = expr.chars().peekable();
  let mut quote: Option<char> = None;
  while let Some(c) = chars.next() {
    match quote {
      Some(q) => {
        if c == q {
          quote = None;
        }
        out.push(c);
      }
      None => match c {
        '"' | '\'' => {
          quote = Some(c);
          out.push(c);
        }
        '!' if chars.peek() != Some(&'=') => out.push_str(" not "),
        _ => out.push(c),
      },
    }
  }
  out
}

/// `a.b.c` style paths, the only expressions that get an empty-string default.
fn is_variable_path(expr: &str) -> bool {
  if matches!(expr, "true" | "false" | "null") {
    return false;
  }
  expr.split('.').all(|segment| {
    let mut chars = segment.chars();
    match chars.next() {
      Some(first) if first.is_ascii_alphabetic() || first == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
      _ => false,
    }
  })
}

fn lenient_lookup(expr: String) -> String {
  let trimmed = expr.trim();
  if is_variable_path(trimmed) {
    format!(" {} | default(value=\"\") ", trimmed)
  } else {
    expr
  }
}

impl TemplateCompiler for TeraCompiler {
  fn render(&self, template: &str, variables: &Value) -> EngineResult<String> {
    if !template.contains("{{") {
      return Ok(template.to_string());
    }
    let failure = |message: String| EngineError::TemplateFailure {
      template: template.to_string(),
      message,
    };

    let context = tera::Context::from_value(variables.clone()).map_err(|e| failure(e.to_string()))?;
    tera::Tera::one_off(&Self::translate(template), &context, false)
      .map_err(|e| failure(crate::error::error_chain(&e)))
  }
}

/// Rewrites `${{` to `{{` and renders through `compiler`.
pub fn render_expression(compiler: &dyn TemplateCompiler, value: &str, variables: &Value) -> EngineResult<String> {
  let template = value.replace("${{", "{{");
  compiler.render(&template, variables)
}
