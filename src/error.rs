//! Error taxonomy for dispatching a hook.
//!
//! Each top-level variant names the stage that failed, so callers can tell
//! "no server" (silent fallback) apart from "server present but broken".

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while parsing the server descriptor file.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The descriptor is not valid JSON or has no `uri` string.
    #[error("invalid server descriptor: {0}")]
    Parse(#[source] serde_json::Error),

    /// The `uri` field cannot be decomposed into a socket path.
    #[error("cannot extract socket path from uri `{uri}`: {reason}")]
    Format {
        /// The offending URI.
        uri: String,
        /// Why decomposition failed.
        reason: String,
    },
}

/// Errors in the header/body framing or in the shape of a completion.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Reading from or writing to the connection failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A header block ended without a `Content-Length` header.
    #[error("header block is missing Content-Length")]
    MissingContentLength,

    /// A header line could not be parsed.
    #[error("invalid header line: {0:?}")]
    InvalidHeader(String),

    /// The message body is not valid JSON.
    #[error("invalid message body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    /// Declared body length exceeds the framing limit.
    #[error("message exceeds max size: {len} > {max}")]
    MessageTooLarge {
        /// Declared length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A header line ran past the line length limit without a terminator.
    #[error("header line exceeds {max} bytes")]
    HeaderTooLong {
        /// Line length limit.
        max: usize,
    },

    /// A completion message carried neither `result.exitCode` nor `error.code`.
    #[error("response to request {id} has neither result.exitCode nor error.code")]
    MissingOutcome {
        /// Identifier of the request the message completed.
        id: i64,
    },
}

/// Errors surfaced by [`crate::dispatch::run`] and the backends.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The descriptor file exists but cannot be read.
    #[error("failed to read server descriptor {}: {source}", path.display())]
    Detection {
        /// Path of the descriptor file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The descriptor file is malformed.
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    /// The socket named by the descriptor refused the connection.
    #[error("failed to connect to sbt server at {}: {source}", path.display())]
    Connection {
        /// Socket path that was dialled.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The server spoke something other than the expected framing.
    #[error("sbt server protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The stream ended before the response to the request arrived.
    #[error("connection closed before a response to request {id} arrived ({seen} messages seen)")]
    CorrelationExhausted {
        /// Identifier of the outstanding request.
        id: i64,
        /// Number of non-matching messages read before end of stream.
        seen: usize,
    },

    /// The deadline expired before completion.
    #[error("no response from sbt server within {0:?}")]
    Timeout(Duration),

    /// The command-line fallback could not be started.
    #[error("failed to run `{program}`: {source}")]
    Fallback {
        /// Program that failed to spawn.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl ClientError {
    /// Short name of the stage that failed.
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Detection { .. } => "detection",
            Self::Resolution(_) => "resolution",
            Self::Connection { .. } => "connection",
            Self::Protocol(_) => "protocol",
            Self::CorrelationExhausted { .. } => "correlation",
            Self::Timeout(_) => "timeout",
            Self::Fallback { .. } => "fallback",
        }
    }
}
