//! JSON-RPC over stdio.
//!
//! Newline-delimited JSON: one message per line on the child's stdin and
//! stdout. Request ids are per transport and start at 1.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::errors::RpcError;
use super::protocol::RpcChannel;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Line-delimited JSON-RPC over a writer/reader pair.
///
/// Generic so tests can drive it with in-memory pipes; in production it
/// wraps a child's `ChildStdin` / `ChildStdout`.
pub struct StdioTransport<W, R> {
    server_name: String,
    writer: Option<W>,
    reader: BufReader<R>,
    next_id: u64,
}

impl<W, R> StdioTransport<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    pub fn new(server_name: &str, writer: W, reader: R) -> Self {
        Self {
            server_name: server_name.to_string(),
            writer: Some(writer),
            reader: BufReader::new(reader),
            next_id: 1,
        }
    }

    /// Close the write half; well-behaved servers exit on EOF.
    pub fn close_input(&mut self) {
        self.writer = None;
    }

    async fn write_line(&mut self, mut json: String) -> Result<(), RpcError> {
        json.push('\n');

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| RpcError::transport("stdin already closed"))?;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| RpcError::transport(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| RpcError::transport(format!("failed to flush stdin: {e}")))
    }

    /// Read lines until the response for `id` appears.
    async fn read_response(&mut self, id: u64) -> Result<JsonRpcResponse, RpcError> {
        let mut line_buf = String::new();

        loop {
            line_buf.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| RpcError::transport(format!("failed to read from stdout: {e}")))?;

            if bytes_read == 0 {
                return Err(RpcError::transport(
                    "server stdout closed (process may have exited)",
                ));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.is_response() && resp.answers(id) => return Ok(resp),
                Ok(_) => {
                    tracing::trace!(
                        server = %self.server_name,
                        raw = trimmed,
                        "skipping unrelated message"
                    );
                }
                Err(_) => {
                    // Not JSON-RPC; servers sometimes log to stdout.
                    tracing::debug!(server = %self.server_name, line = trimmed, "stdout noise");
                }
            }
        }
    }
}

#[async_trait]
impl<W, R> RpcChannel for StdioTransport<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, RpcError> {
        let id = self.next_id;
        self.next_id += 1;

        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)
            .map_err(|e| RpcError::transport(format!("failed to serialize request: {e}")))?;

        self.write_line(json).await?;
        self.read_response(id).await
    }

    async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), RpcError> {
        let notification = JsonRpcNotification::new(method, params);
        let json = serde_json::to_string(&notification).map_err(|e| {
            RpcError::transport(format!("failed to serialize notification: {e}"))
        })?;

        self.write_line(json).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_request_matches_id_and_skips_noise() {
        let (client_out, mut server_in) = duplex(4096);
        let (mut server_out, client_in) = duplex(4096);

        let server = tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let n = server_in.read(&mut buf).await.unwrap();
            let line = String::from_utf8_lossy(&buf[..n]).to_string();
            server_out
                .write_all(
                    b"starting calc server...\n\
                      {\"jsonrpc\":\"2.0\",\"method\":\"notifications/message\",\"params\":{}}\n\
                      {\"jsonrpc\":\"2.0\",\"id\":99,\"result\":{}}\n\
                      {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\n",
                )
                .await
                .unwrap();
            line
        });

        let mut transport = StdioTransport::new("calc", client_out, client_in);
        let resp = transport.request("ping", None).await.unwrap();
        assert_eq!(resp.result.unwrap()["ok"], true);

        let sent = server.await.unwrap();
        assert!(sent.ends_with('\n'));
        assert!(sent.contains("\"id\":1"));
        assert!(sent.contains("\"method\":\"ping\""));
    }

    #[tokio::test]
    async fn test_ids_increase_per_transport() {
        let (client_out, _server_in) = duplex(4096);
        let (mut server_out, client_in) = duplex(4096);
        server_out
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\
                  {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"second\":true}}\n",
            )
            .await
            .unwrap();

        let mut transport = StdioTransport::new("calc", client_out, client_in);
        transport.request("a", None).await.unwrap();
        let second = transport.request("b", None).await.unwrap();
        assert_eq!(second.result.unwrap()["second"], true);
    }

    #[tokio::test]
    async fn test_null_result_is_returned_not_skipped() {
        let (client_out, _server_in) = duplex(4096);
        let (mut server_out, client_in) = duplex(4096);
        server_out
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":null}\n")
            .await
            .unwrap();

        let mut transport = StdioTransport::new("calc", client_out, client_in);
        let resp = tokio::time::timeout(std::time::Duration::from_secs(5), transport.request("ping", None))
            .await
            .expect("null result was treated as noise")
            .unwrap();
        assert_eq!(resp.result, Some(serde_json::Value::Null));
    }

    #[tokio::test]
    async fn test_eof_is_transport_error() {
        let (client_out, _server_in) = duplex(4096);
        let (server_out, client_in) = duplex(4096);
        drop(server_out);

        let mut transport = StdioTransport::new("calc", client_out, client_in);
        let err = transport.request("ping", None).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (client_out, _server_in) = duplex(64);
        let (_server_out, client_in) = duplex(64);

        let mut transport = StdioTransport::new("calc", client_out, client_in);
        transport.close_input();
        let err = transport.notify("notifications/initialized", None).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport { .. }));
    }
}
