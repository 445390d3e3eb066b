//! Runtime configuration.
//!
//! Values come from built-in defaults, then `SBT_HOOK_*` environment
//! variables, then command-line flags (applied by the binary).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default deadline for a server round trip, sized for human-scale commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

/// Top-level configuration for a hook run.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root of the sbt project (where `project/target/active.json` lives).
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// Deadline for the server round trip.
    #[serde(default = "default_timeout", rename = "timeout_seconds", deserialize_with = "seconds")]
    pub timeout: Duration,

    /// Program used by the command-line fallback.
    #[serde(default = "default_executable")]
    pub sbt_executable: String,

    /// Whether the command-line fallback may emit ANSI colors.
    #[serde(default)]
    pub color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            timeout: DEFAULT_TIMEOUT,
            sbt_executable: default_executable(),
            color: false,
        }
    }
}

impl Config {
    /// Create from environment variables, falling back to defaults.
    ///
    /// Reads `SBT_HOOK_PROJECT_ROOT`, `SBT_HOOK_TIMEOUT` (in seconds),
    /// `SBT_HOOK_EXECUTABLE` and `SBT_HOOK_COLOR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            project_root: lookup("SBT_HOOK_PROJECT_ROOT")
                .map_or(defaults.project_root, PathBuf::from),
            timeout: lookup("SBT_HOOK_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .map_or(defaults.timeout, Duration::from_secs),
            sbt_executable: lookup("SBT_HOOK_EXECUTABLE")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.sbt_executable),
            color: lookup("SBT_HOOK_COLOR")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.color),
        }
    }

    /// Parse a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse configuration JSON")?;
        Ok(config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn seconds<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

fn default_project_root() -> PathBuf {
    ".".into()
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_executable() -> String {
    "sbt".into()
}
