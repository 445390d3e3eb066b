//! Unix domain socket connection to the sbt server.

use std::path::Path;

use tokio::net::UnixStream;
use tracing::{debug, instrument};

use crate::error::ClientError;

/// Open a stream connection to the server socket at `path`.
///
/// The stream is owned by the single request that uses it and is closed
/// when dropped, including when the surrounding deadline fires.
#[instrument(skip(path), fields(socket = %path.display()))]
pub async fn connect(path: &Path) -> Result<UnixStream, ClientError> {
    let stream = UnixStream::connect(path)
        .await
        .map_err(|source| ClientError::Connection {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Connected to sbt server");
    Ok(stream)
}
