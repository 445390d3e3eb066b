//! Request/response correlation against a connected sbt server.
//!
//! One connection carries one request. [`ServerClient::submit`] consumes the
//! idle client and returns a [`PendingRequest`]; waiting on it reads messages
//! in arrival order, recording each in the transcript, until the message
//! whose `id` matches the request arrives. Reading stops there even if the
//! server has more to say.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};
use tracing::{debug, info};

use crate::backend::HookOutput;
use crate::error::{ClientError, ProtocolError};
use crate::transport::protocol::message_id;
use crate::transport::{send_request, Completion, ExecRequest, MessageReader};

/// Range request ids are drawn from.
///
/// Collisions are possible but harmless with a single request per connection.
pub const REQUEST_ID_RANGE: RangeInclusive<i64> = 1..=2_147_483_647;

/// Pick a random request id.
pub fn generate_request_id() -> i64 {
    rand::thread_rng().gen_range(REQUEST_ID_RANGE)
}

/// A connection with no request submitted yet.
pub struct ServerClient<S> {
    reader: MessageReader<BufReader<ReadHalf<S>>>,
    writer: WriteHalf<S>,
}

impl<S: AsyncRead + AsyncWrite> ServerClient<S> {
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: MessageReader::new(BufReader::new(read_half)),
            writer: write_half,
        }
    }

    /// Send an `sbt/exec` request for `command` with a fresh random id.
    pub async fn submit(self, command: &str) -> Result<PendingRequest<S>, ClientError> {
        self.submit_with_id(generate_request_id(), command).await
    }

    /// Send an `sbt/exec` request for `command` with the given id.
    pub async fn submit_with_id(
        mut self,
        id: i64,
        command: &str,
    ) -> Result<PendingRequest<S>, ClientError> {
        let req = ExecRequest::exec(id, command);
        debug!(id, command_line = %req.params.command_line, "Submitting request");
        send_request(&mut self.writer, &req).await?;

        Ok(PendingRequest {
            id,
            reader: self.reader,
            _writer: self.writer,
            transcript: Vec::new(),
            seen: 0,
        })
    }

    /// Submit `command` and wait for its completion.
    pub async fn execute(self, command: &str) -> Result<HookOutput, ClientError> {
        self.submit(command).await?.wait().await
    }
}

/// A submitted request awaiting its completion message.
pub struct PendingRequest<S> {
    id: i64,
    reader: MessageReader<BufReader<ReadHalf<S>>>,
    // Held so the connection stays fully open until the wait ends.
    _writer: WriteHalf<S>,
    transcript: Vec<u8>,
    seen: usize,
}

impl<S: AsyncRead + AsyncWrite> PendingRequest<S> {
    /// Identifier of the submitted request.
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// Read messages until the completion for this request arrives.
    ///
    /// End of stream before completion is [`ClientError::CorrelationExhausted`]:
    /// the server answers every request, so it means an id collision or a
    /// dropped connection rather than something to retry.
    pub async fn wait(mut self) -> Result<HookOutput, ClientError> {
        while let Some(message) = self.reader.next_message().await? {
            self.record(&message)?;

            if message_id(&message) == Some(self.id) {
                let completion = Completion::from_message(&message)
                    .ok_or(ProtocolError::MissingOutcome { id: self.id })?;
                info!(
                    id = self.id,
                    exit_code = completion.exit_code(),
                    messages = self.seen,
                    "Request completed"
                );
                return Ok(HookOutput {
                    exit_code: exit_code_of(completion),
                    output: self.transcript,
                });
            }
        }

        Err(ClientError::CorrelationExhausted {
            id: self.id,
            seen: self.seen,
        })
    }

    fn record(&mut self, message: &Value) -> Result<(), ProtocolError> {
        self.seen += 1;
        debug!(id = self.id, seen = self.seen, message = %message, "Received message");
        serde_json::to_writer(&mut self.transcript, message).map_err(ProtocolError::InvalidBody)?;
        self.transcript.push(b'\n');
        Ok(())
    }
}

/// Process-style exit code of a completion, saturated to `i32`.
pub fn exit_code_of(completion: Completion) -> i32 {
    let code = completion.exit_code();
    i32::try_from(code).unwrap_or(if code < 0 { i32::MIN } else { i32::MAX })
}

/// Run `command` over `stream`, giving up after `timeout`.
///
/// On expiry the read loop is abandoned and the stream dropped.
pub async fn execute_with_timeout<S: AsyncRead + AsyncWrite>(
    stream: S,
    command: &str,
    timeout: Duration,
) -> Result<HookOutput, ClientError> {
    tokio::time::timeout(timeout, ServerClient::new(stream).execute(command))
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
}
