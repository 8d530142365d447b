//! External tool invocation
//!
//! The orchestrator never touches `std::process` directly. It hands each
//! [`ToolCommand`] to a [`ToolRunner`] and branches on the returned
//! [`ToolStatus`].

use crate::command::ToolCommand;
use crate::error::{BuildError, BuildResult};
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;

/// Completion status of an external tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    /// Exited with status 0
    Success,

    /// Exited with a nonzero status
    Exited(i32),

    /// Terminated by a signal
    Signaled(i32),

    /// Finished without an exit code or signal
    Unknown,
}

impl ToolStatus {
    /// Whether the tool succeeded
    pub fn success(self) -> bool {
        self == ToolStatus::Success
    }
}

impl From<ExitStatus> for ToolStatus {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            return ToolStatus::Success;
        }
        if let Some(code) = status.code() {
            return ToolStatus::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ToolStatus::Signaled(signal);
            }
        }
        ToolStatus::Unknown
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolStatus::Success => write!(f, "success"),
            ToolStatus::Exited(code) => write!(f, "exit code {code}"),
            ToolStatus::Signaled(signal) => write!(f, "terminated by signal {signal}"),
            ToolStatus::Unknown => write!(f, "unknown status"),
        }
    }
}

/// Runs external tools on behalf of the orchestrator
///
/// Implementations must be `Sync`: compiles may run on several threads.
pub trait ToolRunner: Sync {
    /// Run a command to completion and report how it ended
    fn run(&self, command: &ToolCommand) -> BuildResult<ToolStatus>;
}

/// Spawns real processes with inherited stdio
///
/// Compiler and linker diagnostics go straight to the terminal; nothing is
/// captured or parsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, command: &ToolCommand) -> BuildResult<ToolStatus> {
        debug!("Running: {}", command);

        let status = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| BuildError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        Ok(status.into())
    }
}
