//! Locating a running sbt server.
//!
//! A running server publishes `project/target/active.json` under the project
//! root. The file holds a URI whose path component is the server's Unix
//! domain socket. It is re-read on every dispatch because a restarted server
//! may listen on a different socket.

use std::io::Read;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{ClientError, ResolveError};

/// Location of the descriptor file, relative to the project root.
pub const ACTIVE_JSON_PATH: &str = "project/target/active.json";

/// Parsed contents of `active.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerDescriptor {
    /// Address of the server, e.g. `local:///tmp/sbt-server.sock`.
    pub uri: String,
}

impl ServerDescriptor {
    /// Filesystem path of the socket named by [`Self::uri`].
    pub fn socket_path(&self) -> Result<PathBuf, ResolveError> {
        socket_path_from_uri(&self.uri)
    }
}

/// Path to the descriptor file of a server running in `root_dir`.
pub fn port_file_path(root_dir: &Path) -> PathBuf {
    root_dir.join(ACTIVE_JSON_PATH)
}

/// Whether an sbt server is running in `root_dir`.
///
/// Only checks for the descriptor file. A stale file left by a dead server
/// still reports `true`; the connect attempt is what catches that.
pub fn is_server_running(root_dir: &Path) -> bool {
    port_file_path(root_dir).exists()
}

/// Parse a descriptor from an open reader.
pub fn read_descriptor<R: Read>(reader: R) -> Result<ServerDescriptor, ResolveError> {
    serde_json::from_reader(reader).map_err(ResolveError::Parse)
}

/// Read the descriptor in `root_dir` and return the socket path it names.
pub fn resolve_socket_path(root_dir: &Path) -> Result<PathBuf, ClientError> {
    let path = port_file_path(root_dir);
    let contents = std::fs::read_to_string(&path).map_err(|source| ClientError::Detection {
        path: path.clone(),
        source,
    })?;
    let descriptor = read_descriptor(contents.as_bytes())?;
    let socket = descriptor.socket_path()?;
    debug!(descriptor = %path.display(), socket = %socket.display(), "Resolved sbt server socket");
    Ok(socket)
}

/// Extract the percent-decoded path component of a socket URI.
pub fn socket_path_from_uri(uri: &str) -> Result<PathBuf, ResolveError> {
    let format_error = |reason: String| ResolveError::Format {
        uri: uri.to_string(),
        reason,
    };

    let url = Url::parse(uri).map_err(|e| format_error(e.to_string()))?;
    if url.host_str().is_some_and(|host| !host.is_empty()) {
        return Err(format_error(format!(
            "expected a local socket, found host `{}`",
            url.host_str().unwrap_or_default()
        )));
    }

    let path = percent_decode_str(url.path())
        .decode_utf8()
        .map_err(|e| format_error(e.to_string()))?;
    if path.is_empty() || !path.starts_with('/') {
        return Err(format_error("no absolute socket path".to_string()));
    }

    Ok(PathBuf::from(path.into_owned()))
}
