pub mod context;
pub mod context_data;
pub mod env;
pub mod plugin;
pub mod record;
pub mod status;
pub mod step;

pub use context::{Context, StepEntry};
pub use context_data::ContextData;
pub use env::EnvSnapshot;
pub use plugin::{Plugin, PluginContext, PluginLoader};
pub use record::{RecordHandle, RunRecord, StepOutcome};
pub use status::StepStatus;
pub use step::{parse_steps, PluginStep, PluginType, RunStep, Step, StepKind, StepSpec};
