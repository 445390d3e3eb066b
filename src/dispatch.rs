//! Hook dispatch.
//!
//! Builds the sbt command for a hook and picks the transport: the running
//! server when its descriptor file is present, the sbt command line
//! otherwise. Both paths report a [`HookOutput`].

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::backend::{Backend, CommandLineBackend, HookOutput, ServerBackend};
use crate::config::Config;
use crate::discovery::is_server_running;
use crate::error::ClientError;

/// A hook definition: the sbt command to run and its fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Hook {
    /// Command entry point, e.g. `scalafmtCheck` or `testOnly`.
    pub entry: String,

    /// Arguments passed verbatim after the entry point.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Hook {
    pub fn new(entry: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            entry: entry.into(),
            args,
        }
    }
}

/// Build the sbt command line for `hook` applied to `files`.
///
/// The result is `entry args... "file"...`. Arguments are inserted as
/// written, so the hook author quotes them as needed. Each file is wrapped
/// in double quotes so sbt keeps a path containing spaces as one token.
pub fn build_command<S: AsRef<str>>(hook: &Hook, files: &[S]) -> String {
    let mut parts = vec![hook.entry.clone()];
    parts.extend(hook.args.iter().cloned());
    parts.extend(files.iter().map(|file| quote(file.as_ref())));
    parts.retain(|part| !part.is_empty());
    parts.join(" ")
}

fn quote(s: &str) -> String {
    format!("\"{s}\"")
}

/// Routes hook commands to the sbt server or the sbt command line.
pub struct Dispatcher {
    project_root: PathBuf,
    server: Box<dyn Backend>,
    fallback: Box<dyn Backend>,
}

impl Dispatcher {
    /// Create a dispatcher using the standard backends.
    pub fn from_config(config: &Config) -> Self {
        Self::with_backends(
            config.project_root.clone(),
            Box::new(ServerBackend::new(config.project_root.clone(), config.timeout)),
            Box::new(CommandLineBackend::new(
                config.sbt_executable.clone(),
                config.project_root.clone(),
                config.color,
            )),
        )
    }

    /// Create a dispatcher with explicit backends.
    pub fn with_backends(
        project_root: impl Into<PathBuf>,
        server: Box<dyn Backend>,
        fallback: Box<dyn Backend>,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            server,
            fallback,
        }
    }

    /// Run `hook` against `files`.
    ///
    /// A descriptor whose socket refuses connections (a server that died
    /// without cleaning up) falls back to the command line. Any other
    /// server-side failure is returned.
    pub async fn run<S: AsRef<str> + Sync>(
        &self,
        hook: &Hook,
        files: &[S],
    ) -> Result<HookOutput, ClientError> {
        let command = build_command(hook, files);

        if is_server_running(&self.project_root) {
            info!(command = %command, "Running hook via sbt server");
            match self.server.run(&command).await {
                Err(ClientError::Connection { path, source }) => {
                    warn!(
                        socket = %path.display(),
                        error = %source,
                        "sbt server not reachable, falling back to command line"
                    );
                }
                other => return other,
            }
        }

        info!(command = %command, "Running hook via sbt command line");
        self.fallback.run(&command).await
    }
}

/// Run `hook` against `files` with configuration from the environment.
///
/// Returns `(exit_code, output)`; on the server path `output` is the
/// transcript of every message received, one JSON document per line.
pub async fn run<S: AsRef<str> + Sync>(
    hook: &Hook,
    files: &[S],
    timeout: Duration,
) -> Result<(i32, Vec<u8>), ClientError> {
    let config = Config {
        timeout,
        ..Config::from_env()
    };
    let output = Dispatcher::from_config(&config).run(hook, files).await?;
    Ok(output.into_parts())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixListener;

    use super::*;
    use crate::discovery::port_file_path;
    use crate::error::ProtocolError;
    use crate::transport::{ExecRequest, MessageReader};

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn quotes_files_not_args() {
        let hook = Hook::new("touch", files(&["argfile1.txt", "\"arg file1.txt\""]));
        let command = build_command(&hook, files(&["a.txt", "b c.txt"]).as_slice());
        assert_eq!(command, r#"touch argfile1.txt "arg file1.txt" "a.txt" "b c.txt""#);
        assert!(command.contains(r#""a.txt" "b c.txt""#));
    }

    #[test]
    fn command_without_args_or_files() {
        let hook = Hook::new("compile", Vec::new());
        assert_eq!(build_command::<&str>(&hook, &[]), "compile");

        let hook = Hook::new("scalafmtCheck", Vec::new());
        assert_eq!(build_command(&hook, &["src/A.scala"]), r#"scalafmtCheck "src/A.scala""#);
    }

    #[test]
    fn hook_from_json() {
        let hook: Hook = serde_json::from_str(r#"{"entry": "test"}"#).unwrap();
        assert_eq!(hook, Hook::new("test", Vec::new()));
    }

    /// Backend that records commands and returns a canned result.
    #[derive(Clone)]
    struct RecordingBackend {
        commands: Arc<Mutex<Vec<String>>>,
        respond: fn() -> Result<HookOutput, ClientError>,
    }

    impl RecordingBackend {
        fn new(respond: fn() -> Result<HookOutput, ClientError>) -> Self {
            Self {
                commands: Arc::new(Mutex::new(Vec::new())),
                respond,
            }
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Backend for RecordingBackend {
        async fn run(&self, command: &str) -> Result<HookOutput, ClientError> {
            self.commands.lock().unwrap().push(command.to_string());
            (self.respond)()
        }
    }

    fn ok_output() -> Result<HookOutput, ClientError> {
        Ok(HookOutput {
            exit_code: 0,
            output: b"ok\n".to_vec(),
        })
    }

    fn refused() -> Result<HookOutput, ClientError> {
        Err(ClientError::Connection {
            path: PathBuf::from("/tmp/dead.sock"),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        })
    }

    fn broken_protocol() -> Result<HookOutput, ClientError> {
        Err(ProtocolError::MissingContentLength.into())
    }

    fn write_descriptor(root: &Path, uri: &str) {
        let port_file = port_file_path(root);
        std::fs::create_dir_all(port_file.parent().unwrap()).unwrap();
        std::fs::write(port_file, json!({ "uri": uri }).to_string()).unwrap();
    }

    #[tokio::test]
    async fn no_server_uses_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let server = RecordingBackend::new(ok_output);
        let fallback = RecordingBackend::new(ok_output);
        let dispatcher = Dispatcher::with_backends(
            dir.path(),
            Box::new(server.clone()),
            Box::new(fallback.clone()),
        );

        let output = dispatcher
            .run(&Hook::new("compile", Vec::new()), &["A.scala"])
            .await
            .unwrap();
        assert_eq!(output.exit_code, 0);
        assert!(server.commands().is_empty());
        assert_eq!(fallback.commands(), vec![r#"compile "A.scala""#]);
    }

    #[tokio::test]
    async fn server_present_uses_server() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(dir.path(), "local:///tmp/unused.sock");
        let server = RecordingBackend::new(ok_output);
        let fallback = RecordingBackend::new(ok_output);
        let dispatcher = Dispatcher::with_backends(
            dir.path(),
            Box::new(server.clone()),
            Box::new(fallback.clone()),
        );

        dispatcher
            .run(&Hook::new("test", Vec::new()), &[] as &[&str])
            .await
            .unwrap();
        assert_eq!(server.commands(), vec!["test"]);
        assert!(fallback.commands().is_empty());
    }

    #[tokio::test]
    async fn refused_connection_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(dir.path(), "local:///tmp/dead.sock");
        let server = RecordingBackend::new(refused);
        let fallback = RecordingBackend::new(ok_output);
        let dispatcher = Dispatcher::with_backends(
            dir.path(),
            Box::new(server.clone()),
            Box::new(fallback.clone()),
        );

        let output = dispatcher
            .run(&Hook::new("compile", Vec::new()), &[] as &[&str])
            .await
            .unwrap();
        assert_eq!(output.output, b"ok\n");
        assert_eq!(server.commands().len(), 1);
        assert_eq!(fallback.commands().len(), 1);
    }

    #[tokio::test]
    async fn protocol_error_is_not_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(dir.path(), "local:///tmp/broken.sock");
        let fallback = RecordingBackend::new(ok_output);
        let dispatcher = Dispatcher::with_backends(
            dir.path(),
            Box::new(RecordingBackend::new(broken_protocol)),
            Box::new(fallback.clone()),
        );

        let err = dispatcher
            .run(&Hook::new("compile", Vec::new()), &[] as &[&str])
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "protocol");
        assert!(fallback.commands().is_empty());
    }

    /// Accept one connection, read the request, answer with `respond(id)`.
    async fn serve_once(
        listener: UnixListener,
        respond: impl FnOnce(i64) -> Vec<Value>,
    ) -> ExecRequest {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = MessageReader::new(BufReader::new(read_half));
        let req: ExecRequest =
            serde_json::from_value(reader.next_message().await.unwrap().unwrap()).unwrap();
        for message in respond(req.id) {
            let body = serde_json::to_vec(&message).unwrap();
            let header = format!(
                "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: {}\r\n\r\n",
                body.len()
            );
            write_half.write_all(header.as_bytes()).await.unwrap();
            write_half.write_all(&body).await.unwrap();
        }
        req
    }

    #[tokio::test]
    async fn end_to_end_through_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("sbt.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        write_descriptor(dir.path(), &format!("local://{}", socket.display()));

        let server_task = tokio::spawn(serve_once(listener, |id| {
            vec![
                json!({"jsonrpc": "2.0", "method": "build/logMessage", "params": {"type": 3, "message": "[info] compiling"}}),
                json!({"jsonrpc": "2.0", "id": id, "result": {"status": "Done", "exitCode": 0}}),
            ]
        }));

        let config = Config {
            project_root: dir.path().to_path_buf(),
            timeout: Duration::from_secs(5),
            sbt_executable: "/nonexistent/sbt".to_string(),
            color: false,
        };
        let hook = Hook::new("touch", files(&["argfile1.txt"]));
        let output = Dispatcher::from_config(&config)
            .run(&hook, &["a.txt", "b c.txt"])
            .await
            .unwrap();
        let req = server_task.await.unwrap();

        assert_eq!(
            req.params.command_line,
            r#"reload;touch argfile1.txt "a.txt" "b c.txt""#
        );
        assert_eq!(output.exit_code, 0);
        let transcript = String::from_utf8(output.output).unwrap();
        let lines: Vec<&str> = transcript.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[info] compiling"));
        assert!(lines[1].contains(&format!("\"id\":{}", req.id)));
    }

    #[tokio::test]
    async fn end_to_end_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("slow.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        write_descriptor(dir.path(), &format!("unix://{}", socket.display()));

        let server_task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            // Returns once the client gives up and closes its end.
            stream.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let config = Config {
            project_root: dir.path().to_path_buf(),
            timeout: Duration::from_millis(200),
            ..Config::default()
        };
        let err = Dispatcher::from_config(&config)
            .run(&Hook::new("compile", Vec::new()), &[] as &[&str])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)), "{err:?}");

        let request = tokio::time::timeout(Duration::from_secs(5), server_task)
            .await
            .expect("connection was not released")
            .unwrap();
        assert!(String::from_utf8(request).unwrap().contains("reload;compile"));
    }

    #[tokio::test]
    async fn stale_descriptor_falls_back_to_command_line() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(
            dir.path(),
            &format!("local://{}", dir.path().join("gone.sock").display()),
        );

        let config = Config {
            project_root: dir.path().to_path_buf(),
            sbt_executable: "echo".to_string(),
            color: true,
            ..Config::default()
        };
        let output = Dispatcher::from_config(&config)
            .run(&Hook::new("compile", Vec::new()), &["a b.scala"])
            .await
            .unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.output, b"compile \"a b.scala\"\n");
    }

    #[tokio::test]
    async fn malformed_descriptor_is_resolution_error() {
        let dir = tempfile::tempdir().unwrap();
        let port_file = port_file_path(dir.path());
        std::fs::create_dir_all(port_file.parent().unwrap()).unwrap();
        std::fs::write(port_file, "{ not json").unwrap();

        let config = Config {
            project_root: dir.path().to_path_buf(),
            sbt_executable: "echo".to_string(),
            ..Config::default()
        };
        let err = Dispatcher::from_config(&config)
            .run(&Hook::new("compile", Vec::new()), &[] as &[&str])
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "resolution");
    }
}
