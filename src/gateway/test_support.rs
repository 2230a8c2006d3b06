//! Test doubles: an in-memory connector and a loopback HTTP server.
//!
//! The HTTP server understands just enough HTTP/1.1 for reqwest: one
//! request per connection, `Content-Length` bodies, `Connection: close`
//! replies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::config::TransportKind;
use super::connector::BackendConnector;
use super::content::CallResult;
use super::errors::{GatewayError, InvocationFailure};
use super::types::ToolDescriptor;

/// A minimal stdio backend: answers initialize, then one tools/list or tools/call.
pub(crate) const CALC_SCRIPT: &str = r##"
read line
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-03-26","capabilities":{}}}'
read line
read line
case "$line" in
  *tools/list*)
    echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"add","description":"Add two numbers","inputSchema":{"type":"object","properties":{"a":{"type":"number"},"b":{"type":"number"}},"required":["a","b"]}}]}}'
    ;;
  *tools/call*)
    echo '{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"5"}]}}'
    ;;
esac
"##;

// ─── FakeConnector ───────────────────────────────────────────────────────────

/// In-memory backend.
///
/// `invoke` answers `"<server>:<tool>"`, except `add` which sums `a` and
/// `b`, and `fail` which returns a remote error. Optional delays make
/// discovery or calls slow; `in_flight` counts calls whose futures are still alive.
pub(crate) struct FakeConnector {
    name: String,
    tools: Vec<ToolDescriptor>,
    discovery_error: Option<String>,
    delay: Option<Duration>,
    discovery_delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(name: &str, tools: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            tools: tools
                .iter()
                .map(|tool| ToolDescriptor {
                    name: tool.to_string(),
                    description: format!("{tool} from {name}"),
                    input_schema: serde_json::json!({"type": "object", "properties": {}}),
                })
                .collect(),
            discovery_error: None,
            delay: None,
            discovery_delay: None,
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_discovery(name: &str, reason: &str) -> Self {
        let mut fake = Self::new(name, &[]);
        fake.discovery_error = Some(reason.to_string());
        fake
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_discovery_delay(mut self, delay: Duration) -> Self {
        self.discovery_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendConnector for FakeConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport_kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn list_tools(&self, _timeout: Duration) -> Result<Vec<ToolDescriptor>, GatewayError> {
        if let Some(delay) = self.discovery_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.discovery_error {
            Some(reason) => Err(GatewayError::DiscoveryError {
                server: self.name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(self.tools.clone()),
        }
    }

    async fn invoke(
        &self,
        tool: &str,
        arguments: serde_json::Value,
        _timeout: Duration,
    ) -> Result<CallResult, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match tool {
            "add" => {
                let a = arguments["a"].as_f64().unwrap_or_default();
                let b = arguments["b"].as_f64().unwrap_or_default();
                Ok(CallResult::from_text(format!("{}", a + b)))
            }
            "fail" => Err(GatewayError::InvocationError {
                server: self.name.clone(),
                tool: tool.to_string(),
                reason: InvocationFailure::RemoteError {
                    code: -32000,
                    message: "tool failed".into(),
                },
            }),
            _ => Ok(CallResult::from_text(format!("{}:{tool}", self.name))),
        }
    }
}

// ─── MockServer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct MockRequest {
    pub method: String,
    pub path: String,
    /// Lower-cased names.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl MockRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }

    /// The JSON-RPC method, if the body is a JSON-RPC message.
    pub fn rpc_method(&self) -> Option<String> {
        self.json()
            .get("method")
            .and_then(|m| m.as_str())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockResponse {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json".into(),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    /// A JSON-RPC success response echoing the request id.
    pub fn rpc_result(req: &MockRequest, result: serde_json::Value) -> Self {
        Self::json(
            200,
            serde_json::json!({"jsonrpc": "2.0", "id": req.json()["id"], "result": result}),
        )
    }

    pub fn sse(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream".into(),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain".into(),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self::text(status, "")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

type Handler = dyn Fn(&MockRequest) -> MockResponse + Send + Sync;

pub(crate) struct MockServer {
    pub url: String,
    requests: Arc<Mutex<Vec<MockRequest>>>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&MockRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = serve(stream, handler, recorded).await;
                });
            }
        });

        Self {
            url: format!("http://{addr}/mcp"),
            requests,
            task,
        }
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded JSON-RPC methods, in arrival order.
    pub fn rpc_methods(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(MockRequest::rpc_method)
            .collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    handler: Arc<Handler>,
    recorded: Arc<Mutex<Vec<MockRequest>>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;

    let request = MockRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    };
    recorded.lock().unwrap().push(request.clone());

    let response = handler(&request);
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        reason_phrase(response.status),
        response.content_type,
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    let mut stream = reader.into_inner();
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(response.body.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
