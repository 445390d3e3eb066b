//! sbt-hook-runner
//!
//! Runs an sbt hook through the project's sbt server when one is running,
//! or through the sbt command line otherwise. Output goes to stdout and the
//! process exits with the hook's exit code.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sbt_hook_runner::config::Config;
use sbt_hook_runner::{Dispatcher, Hook};

#[derive(Parser, Debug)]
#[command(name = "sbt-hook-runner")]
#[command(about = "Run sbt hook commands via a running sbt server or the sbt command line")]
struct Args {
    /// sbt command entry point (e.g. "scalafmtCheck")
    #[arg(long)]
    entry: String,

    /// Argument passed verbatim after the entry point (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Files to run the hook on
    files: Vec<String>,

    /// Root directory of the sbt project
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Seconds to wait for the sbt server to complete the command
    #[arg(long)]
    timeout: Option<u64>,

    /// sbt launcher used when no server is running
    #[arg(long)]
    sbt: Option<String>,

    /// Allow ANSI colors from the sbt command line
    #[arg(long)]
    color: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config::from_env();
        if let Some(dir) = &self.project_dir {
            config.project_root.clone_from(dir);
        }
        if let Some(secs) = self.timeout {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(sbt) = &self.sbt {
            config.sbt_executable.clone_from(sbt);
        }
        config.color |= self.color;
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr so stdout carries only hook output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.config();
    debug!(?config, "Loaded configuration");

    let hook = Hook::new(args.entry.clone(), args.args.clone());
    let output = Dispatcher::from_config(&config)
        .run(&hook, args.files.as_slice())
        .await
        .with_context(|| format!("Failed to run sbt hook `{}`", hook.entry))?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&output.output)
        .and_then(|()| stdout.flush())
        .context("Failed to write hook output")?;

    std::process::exit(output.exit_code);
}
