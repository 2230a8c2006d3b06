//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; events are delimited by a blank line.
//! Only `data:` lines matter here: multiple `data:` lines in one event are
//! joined with `\n`, comments and other fields are ignored.

use futures::{Stream, StreamExt};

use super::errors::RpcError;
use super::types::JsonRpcResponse;

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Buffers partial frames across chunk boundaries.
///
/// Bytes are held until a whole frame has arrived, so a multi-byte
/// character split between two chunks is decoded intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(end) = frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end).collect();
            if let Some(event) = decode_frame(&frame) {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever is left once the stream ends.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let frame = std::mem::take(&mut self.buffer);
        decode_frame(&frame)
    }
}

/// Length of the first complete frame in `buf`, including the blank line
/// that terminates it. Lines end in `\n`, `\r\n`, or a lone `\r`.
fn frame_end(buf: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    let mut i = 0;
    while i < buf.len() {
        let terminator = match buf[i] {
            b'\n' => 1,
            b'\r' => match buf.get(i + 1) {
                Some(b'\n') => 2,
                Some(_) => 1,
                // may be the first half of a CRLF still in flight
                None => return None,
            },
            _ => {
                i += 1;
                continue;
            }
        };
        if i == line_start {
            return Some(i + terminator);
        }
        i += terminator;
        line_start = i;
    }
    None
}

fn decode_frame(frame: &[u8]) -> Option<SseEvent> {
    match std::str::from_utf8(frame) {
        Ok(text) if text.contains('\r') => {
            parse_event(&text.replace("\r\n", "\n").replace('\r', "\n"))
        }
        Ok(text) => parse_event(text),
        Err(e) => {
            tracing::debug!(error = %e, len = frame.len(), "dropping event that is not UTF-8");
            None
        }
    }
}

fn parse_event(raw: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        }
    }

    if data.is_empty() {
        return None;
    }

    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}

/// Read an SSE body until the JSON-RPC response accepted by `wanted`
/// arrives.
///
/// Events that are not JSON-RPC responses (server requests, notifications,
/// keep-alives) are skipped. The stream is dropped on return, which closes
/// the connection.
pub async fn read_response<S, B, E>(
    body: S,
    wanted: impl Fn(&JsonRpcResponse) -> bool,
) -> Result<JsonRpcResponse, RpcError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| RpcError::transport(format!("stream read error: {e}")))?;
        for event in decoder.push(chunk.as_ref()) {
            if let Some(resp) = accept(&event, &wanted) {
                return Ok(resp);
            }
        }
    }

    if let Some(resp) = decoder.finish().and_then(|event| accept(&event, &wanted)) {
        return Ok(resp);
    }

    Err(RpcError::malformed(
        "event stream ended without a matching response",
    ))
}

fn accept(
    event: &SseEvent,
    wanted: &impl Fn(&JsonRpcResponse) -> bool,
) -> Option<JsonRpcResponse> {
    match serde_json::from_str::<JsonRpcResponse>(&event.data) {
        Ok(resp) if resp.is_response() && wanted(&resp) => Some(resp),
        Ok(_) => None,
        Err(e) => {
            tracing::trace!(error = %e, data = %event.data, "skipping non-JSON-RPC event");
            None
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
