// cd_engine/src/pipeline/mod.rs

//! Defines the `Engine`: construction, the state machine that sequences steps, the step
//! executor and the lifecycle hooks.

pub mod definition;
pub mod execution;
pub mod executor;
pub mod hooks;
pub mod machine;

pub use definition::{CancelHandle, Engine, EngineOptions, COMPLETED_STEP_COUNT, INIT_STEP_COUNT, INIT_STEP_NAME};
pub use executor::resolve_working_dir;
pub use hooks::{EngineEvents, InitOutput, NoopEvents};
pub use machine::{MachineEvent, MachineState, TransitionTable};
