//! Newline-delimited JSON-RPC 2.0 over a byte stream pair.

use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server closed the connection")]
    Closed,

    #[error("server error {code}: {message}")]
    Remote { code: i64, message: String },
}

impl RpcError {
    pub fn is_method_not_found(&self) -> bool {
        matches!(self, RpcError::Remote { code, .. } if *code == METHOD_NOT_FOUND)
    }
}

/// One client end of a JSON-RPC session.
///
/// Requests are strictly sequential: `request` writes one call and reads
/// until the matching response arrives. Server pings received meanwhile are
/// answered; other server requests get a method-not-found error.
pub struct RpcChannel<R, W> {
    reader: R,
    writer: W,
    next_id: u64,
    line: String,
}

impl<R, W> RpcChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            next_id: 1,
            line: String::new(),
        }
    }

    pub async fn request(&mut self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await?;

        loop {
            let message = self.read_message().await?;

            if let Some(server_method) = message.get("method").and_then(Value::as_str) {
                match message.get("id") {
                    Some(request_id) => {
                        self.answer_server_request(server_method, request_id.clone())
                            .await?
                    }
                    None => debug!("ignoring server notification {}", server_method),
                }
                continue;
            }

            if message.get("id").and_then(Value::as_u64) != Some(id) {
                debug!("ignoring response for unknown id: {}", message);
                continue;
            }

            if let Some(error) = message.get("error") {
                return Err(RpcError::Remote {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                });
            }
            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    pub async fn notify(&mut self, method: &str, params: Value) -> Result<(), RpcError> {
        self.send(&json!({ "jsonrpc": "2.0", "method": method, "params": params }))
            .await
    }

    async fn answer_server_request(&mut self, method: &str, id: Value) -> Result<(), RpcError> {
        let reply = if method == "ping" {
            json!({ "jsonrpc": "2.0", "id": id, "result": {} })
        } else {
            debug!("rejecting server request {}", method);
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": METHOD_NOT_FOUND,
                    "message": format!("method not found: {}", method)
                }
            })
        };
        self.send(&reply).await
    }

    async fn send(&mut self, message: &Value) -> Result<(), RpcError> {
        let mut bytes = serde_json::to_vec(message)?;
        bytes.push(b'\n');
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Next JSON object from the stream. Blank and non-JSON lines (servers
    /// that log to stdout) are skipped.
    async fn read_message(&mut self) -> Result<Value, RpcError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Err(RpcError::Closed);
            }
            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(message) if message.is_object() => return Ok(message),
                _ => debug!("skipping non-JSON-RPC line: {}", line),
            }
        }
    }
}
