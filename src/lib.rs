//! sbt-hook-runner library
//!
//! Runs sbt hook commands without paying sbt's startup cost when a server is
//! already up:
//! - Server discovery from `project/target/active.json`
//! - Header-framed JSON-RPC client for the server's Unix socket
//! - Command-line fallback when no server is running

pub mod backend;
pub mod client;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod transport;

pub use backend::HookOutput;
pub use dispatch::{build_command, run, Dispatcher, Hook};
pub use error::ClientError;
