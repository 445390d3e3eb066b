//! sbt command-line backend.
//!
//! Starts `sbt` as a one-shot child process with the whole command as a
//! single argument. Used when no server is running.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{Backend, HookOutput};
use crate::error::ClientError;

/// Backend that runs the sbt launcher directly.
#[derive(Debug, Clone)]
pub struct CommandLineBackend {
    program: String,
    working_dir: PathBuf,
    color: bool,
}

impl CommandLineBackend {
    /// Create a backend running `program` inside `working_dir`.
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>, color: bool) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
            color,
        }
    }

    /// Arguments passed to the program for `command`.
    pub fn args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(2);
        if !self.color {
            args.push("--no-colors".to_string());
        }
        args.push(command.to_string());
        args
    }

    fn spawn_error(&self, source: std::io::Error) -> ClientError {
        ClientError::Fallback {
            program: self.program.clone(),
            source,
        }
    }
}

#[async_trait]
impl Backend for CommandLineBackend {
    #[instrument(skip(self))]
    async fn run(&self, command: &str) -> Result<HookOutput, ClientError> {
        debug!(program = %self.program, cwd = %self.working_dir.display(), "Running sbt command line");

        let mut child = Command::new(&self.program)
            .args(self.args(command))
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let mut child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.spawn_error(std::io::Error::other("stdout not captured")))?;
        let mut child_stderr = child
            .stderr
            .take()
            .ok_or_else(|| self.spawn_error(std::io::Error::other("stderr not captured")))?;

        // Drain both pipes together so neither can fill up and stall the child.
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let (r1, r2) = tokio::join!(
            child_stdout.read_to_end(&mut stdout_buf),
            child_stderr.read_to_end(&mut stderr_buf),
        );
        r1.map_err(|e| self.spawn_error(e))?;
        r2.map_err(|e| self.spawn_error(e))?;

        let status = child.wait().await.map_err(|e| self.spawn_error(e))?;

        let mut output = stdout_buf;
        output.extend_from_slice(&stderr_buf);
        let result = HookOutput {
            exit_code: status.code().unwrap_or(-1),
            output,
        };

        debug!(exit_code = result.exit_code, "sbt command line finished");
        Ok(result)
    }
}
