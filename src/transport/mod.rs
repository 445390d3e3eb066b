//! Transport layer for client ↔ sbt server communication.
//!
//! Messages are framed the way language servers frame them: a header block
//! of `Name: value` lines ended by a blank line, then exactly
//! `Content-Length` bytes of JSON.
//!
//! ```text
//! Content-Type: application/vscode-jsonrpc; charset=utf-8\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of JSON>\r\n
//! ```

pub mod protocol;
pub mod unix_socket;

pub use protocol::{Completion, ExecRequest};
pub use unix_socket::connect;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// Maximum body size (64 MB). Safety valve against malformed headers.
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Longest accepted header line, terminator included.
const MAX_HEADER_LINE: usize = 8 * 1024;

/// Content type announced on outbound messages.
pub const CONTENT_TYPE: &str = "application/vscode-jsonrpc; charset=utf-8";

/// Encode a request as a complete frame, including the trailing CRLF.
pub fn encode_request(req: &ExecRequest) -> Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(req).map_err(ProtocolError::InvalidBody)?;

    let mut frame = format!(
        "Content-Type: {CONTENT_TYPE}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    frame.extend_from_slice(&body);
    frame.extend_from_slice(b"\r\n");
    Ok(frame)
}

/// Write a framed request to a writer.
pub async fn send_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    req: &ExecRequest,
) -> Result<(), ProtocolError> {
    let frame = encode_request(req)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Pull-based reader over the inbound message stream.
///
/// Each call to [`MessageReader::next_message`] yields the next message in
/// arrival order. The sequence ends at end of stream and cannot be restarted.
pub struct MessageReader<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> MessageReader<R> {
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Recover the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next framed message.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between messages.
    /// End of stream inside a header block or body is an error.
    pub async fn next_message(&mut self) -> Result<Option<Value>, ProtocolError> {
        let Some(len) = self.read_headers().await? else {
            return Ok(None);
        };
        if len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                len,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut body = vec![0u8; len];
        self.reader.read_exact(&mut body).await?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(ProtocolError::InvalidBody)
    }

    /// Read a header block and return its `Content-Length`.
    async fn read_headers(&mut self) -> Result<Option<usize>, ProtocolError> {
        let mut content_length = None;
        let mut seen_header = false;

        loop {
            let mut line = String::new();
            let read = (&mut self.reader)
                .take(MAX_HEADER_LINE as u64)
                .read_line(&mut line)
                .await?;
            if read == MAX_HEADER_LINE && !line.ends_with('\n') {
                return Err(ProtocolError::HeaderTooLong {
                    max: MAX_HEADER_LINE,
                });
            }
            if read == 0 {
                if seen_header {
                    return Err(ProtocolError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed while reading headers",
                    )));
                }
                return Ok(None);
            }

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if seen_header {
                    break;
                }
                // Stray line terminator after the previous body
                continue;
            }
            seen_header = true;

            let (name, value) = parse_header(line)?;
            if name.eq_ignore_ascii_case("Content-Length") {
                let len = value
                    .parse()
                    .map_err(|_| ProtocolError::InvalidHeader(line.to_string()))?;
                content_length = Some(len);
            }
        }

        content_length
            .map(Some)
            .ok_or(ProtocolError::MissingContentLength)
    }
}

/// Split a header line on its first colon.
fn parse_header(line: &str) -> Result<(&str, &str), ProtocolError> {
    line.split_once(':')
        .map(|(name, value)| (name.trim(), value.trim()))
        .ok_or_else(|| ProtocolError::InvalidHeader(line.to_string()))
}
