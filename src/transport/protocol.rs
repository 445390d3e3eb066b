//! sbt server wire types.
//!
//! Requests are JSON-RPC 2.0 `sbt/exec` calls. Inbound messages are kept as
//! raw JSON values: only the completion of the outstanding request has a
//! shape we depend on, everything else is passed through to the transcript.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC version tag sent with every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name for running a command on the server.
pub const EXEC_METHOD: &str = "sbt/exec";

/// Prefix forced onto every command so the server reloads the build first.
///
/// Reloading on every call is slower than necessary; kept so that edits to
/// the build definition are always picked up.
pub const RELOAD_PREFIX: &str = "reload;";

/// Request sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub jsonrpc: String,
    pub id: i64,
    pub method: String,
    pub params: ExecParams,
}

/// Parameters of an `sbt/exec` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecParams {
    pub command_line: String,
}

impl ExecRequest {
    /// Build an `sbt/exec` request for `command`, prefixed with `reload;`.
    pub fn exec(id: i64, command: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: EXEC_METHOD.to_string(),
            params: ExecParams {
                command_line: format!("{RELOAD_PREFIX}{command}"),
            },
        }
    }
}

/// Outcome carried by a completion message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// `result.exitCode` of a successful run.
    Success { exit_code: i64 },
    /// `error.code` of a failed run.
    Failure { code: i64 },
}

impl Completion {
    /// Extract the outcome from a completion message.
    ///
    /// The success branch wins when `result` is present; otherwise the
    /// error branch is read. Returns `None` when neither yields an integer.
    pub fn from_message(message: &Value) -> Option<Self> {
        if let Some(result) = message.get("result") {
            return result
                .get("exitCode")
                .and_then(Value::as_i64)
                .map(|exit_code| Self::Success { exit_code });
        }
        message
            .get("error")
            .and_then(|error| error.get("code"))
            .and_then(Value::as_i64)
            .map(|code| Self::Failure { code })
    }

    /// Process-style exit code.
    pub const fn exit_code(self) -> i64 {
        match self {
            Self::Success { exit_code } => exit_code,
            Self::Failure { code } => code,
        }
    }
}

/// Identifier of an inbound message, when it has an integral one.
///
/// A float with no fractional part (`7.0`) counts as the integer it equals.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn message_id(message: &Value) -> Option<i64> {
    let id = message.get("id")?;
    id.as_i64().or_else(|| {
        id.as_f64()
            .filter(|f| f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(f))
            .map(|f| f as i64)
    })
}
