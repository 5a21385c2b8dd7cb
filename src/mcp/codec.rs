//! Newline-delimited message codec.
//!
//! One JSON value per line in both directions. Every outgoing message is
//! flushed as soon as it is written.

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::transport::JsonRpcRequest;
use crate::errors::{CodeIndexError, Result};

/// Decodes one line into a request or notification.
///
/// Text that is not JSON fails with `MalformedMessage`; JSON that is not a
/// protocol envelope fails with `InvalidRequest`, carrying the `id` member
/// when one could be recovered.
pub fn decode_message(line: &str) -> Result<JsonRpcRequest> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| CodeIndexError::MalformedMessage {
            message: e.to_string(),
        })?;
    decode_value(value)
}

/// Decodes an already-parsed JSON value into a request or notification.
pub fn decode_value(value: Value) -> Result<JsonRpcRequest> {
    let id = value.get("id").cloned();
    if !value.is_object() {
        return Err(CodeIndexError::InvalidRequest {
            message: "message must be a JSON object".to_string(),
            id,
        });
    }
    serde_json::from_value(value).map_err(|e| CodeIndexError::InvalidRequest {
        message: e.to_string(),
        id,
    })
}

/// Encodes a message as a single line, without the trailing newline.
pub fn encode_message<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Reads newline-delimited units from a byte stream.
pub struct MessageReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// Returns the next line with its terminator stripped, or `None` at end
    /// of stream. Invalid UTF-8 is replaced rather than rejected, leaving the
    /// decoder to report the line as malformed.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let read = self.inner.read_until(b'\n', &mut self.buf).await?;
        if read == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

/// Writes newline-delimited messages, flushing after each one.
pub struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let mut line = encode_message(message)?;
        line.push('\n');
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
