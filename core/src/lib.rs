// src/lib.rs

//! cd-engine: an asynchronous step-orchestration engine for CI/automation runs.
//!
//! An [`Engine`] executes an ordered list of declarative steps, each either a shell command
//! or a plugin call, and reaches one consistent verdict for the run:
//!  - Per-step `if` conditions with `success()`, `failure()`, `cancelled()` and `always()`.
//!  - Cancellation that kills live child processes and marks remaining steps cancelled.
//!  - `continue-on-error` steps whose failure does not fail the run.
//!  - Per-step log files with secret redaction and optional upload.
//!  - Lifecycle hooks around init, every step and completion.

pub mod conditional;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod registry;

// --- Re-exports for the Public API ---

pub use crate::core::context::{Context, StepEntry};
pub use crate::core::context_data::ContextData;
pub use crate::core::env::EnvSnapshot;
pub use crate::core::plugin::{Plugin, PluginContext, PluginLoader};
pub use crate::core::status::StepStatus;
pub use crate::core::step::{parse_steps, PluginType, Step, StepKind, StepSpec};

pub use crate::pipeline::definition::{CancelHandle, Engine, EngineOptions, COMPLETED_STEP_COUNT, INIT_STEP_COUNT, INIT_STEP_NAME};
pub use crate::pipeline::hooks::{EngineEvents, InitOutput};

pub use crate::conditional::template::{TemplateCompiler, TeraCompiler};
pub use crate::config::{EngineConfig, LogConfig};
pub use crate::logging::{FileLoggerFactory, LogLevel, LogUploader, LoggerFactory, LoggerOverrides, StepLogger};
pub use crate::registry::PluginRegistry;

pub use crate::error::{EngineError, EngineResult};

/*
    Typical use:
    1. Build an `EngineConfig` (or parse one with `EngineConfig::from_json_str`) holding the
       run `cwd`, `inputs` and `steps`.
    2. Register plugins in a `PluginRegistry` and attach it, along with any `EngineEvents`
       hooks, through `Engine::builder(config)`.
    3. `let engine = builder.build();` then `engine.start().await` for the final `Context`.
    4. From another task, `engine.cancel_handle().cancel()` stops the run.
*/
