pub mod evaluator;
pub mod template;

pub use evaluator::{rewrite_predicates, ConditionEvaluator};
pub use template::{render_expression, TemplateCompiler, TeraCompiler};
