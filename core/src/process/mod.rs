pub mod registry;
pub mod shell;

pub use registry::{ProcessGuard, ProcessRegistry};
pub use shell::{run_shell_command, ShellCommand};
