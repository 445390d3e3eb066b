//! sbt server backend.
//!
//! Resolves the socket from the project's descriptor file on every run,
//! connects, and waits for the completion under the configured deadline.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{Backend, HookOutput};
use crate::client::ServerClient;
use crate::discovery::resolve_socket_path;
use crate::error::ClientError;
use crate::transport::connect;

/// Backend that sends commands to a running sbt server.
#[derive(Debug, Clone)]
pub struct ServerBackend {
    project_root: PathBuf,
    timeout: Duration,
}

impl ServerBackend {
    /// Create a backend for the server running in `project_root`.
    pub fn new(project_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            project_root: project_root.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Backend for ServerBackend {
    #[instrument(skip(self))]
    async fn run(&self, command: &str) -> Result<HookOutput, ClientError> {
        let socket = resolve_socket_path(&self.project_root)?;
        debug!(socket = %socket.display(), timeout = ?self.timeout, "Sending command to sbt server");

        // Connect and round trip share one deadline; dropping the future
        // on expiry closes the socket wherever it was suspended.
        let exchange = async {
            let stream = connect(&socket).await?;
            let output = ServerClient::new(stream).execute(command).await?;
            Ok::<_, ClientError>(output)
        };
        let result = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?;

        debug!(ok = result.is_ok(), "Server round trip finished");
        result
    }
}
