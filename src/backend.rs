//! Execution backends.
//!
//! A backend runs one interpolated sbt command and reports the same result
//! shape whichever way it reached sbt: through the server socket or by
//! starting `sbt` as a child process.

mod commandline;
mod server;

pub use commandline::CommandLineBackend;
pub use server::ServerBackend;

use async_trait::async_trait;

use crate::error::ClientError;

/// Result of running a hook command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutput {
    /// Exit code of the command (0 = success).
    pub exit_code: i32,
    /// Captured output: the message transcript for the server path, the
    /// process output for the command-line path.
    pub output: Vec<u8>,
}

impl HookOutput {
    /// Split into `(exit_code, output)`.
    pub fn into_parts(self) -> (i32, Vec<u8>) {
        (self.exit_code, self.output)
    }
}

/// Trait for the ways of reaching sbt.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Run `command` (already interpolated, without the `sbt` program name).
    async fn run(&self, command: &str) -> Result<HookOutput, ClientError>;
}
