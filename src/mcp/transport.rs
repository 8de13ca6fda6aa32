// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Byte-stream transports carrying JSON-RPC messages to an MCP server.
//!
//! Two implementations share the [`Transport`] trait:
//!
//! - [`StdioTransport`] writes newline-delimited JSON to a child process's
//!   stdin and runs one reader task draining its stdout for the lifetime of
//!   the connection. Responses are correlated to callers through a table of
//!   one-shot slots keyed by request id, so any number of calls may be in
//!   flight and complete in any order.
//! - [`HttpTransport`] POSTs each message to `<url>/rpc`; the HTTP exchange
//!   itself pairs request and response.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::config::{expand_env_vars, ServerConfig, TransportType};
use super::error::McpError;
use super::protocol::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;
#[cfg(feature = "telemetry")]
use std::time::Instant;

/// Boxed read half of a stdio-style connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a stdio-style connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// How long a child gets to exit on its own after stdin closes.
const GRACEFUL_EXIT: Duration = Duration::from_millis(500);

/// Deadline and cancellation for a single call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Give up after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,

    /// Give up as soon as this flips to `true`.
    pub cancel: Option<watch::Receiver<bool>>,
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }

    pub fn cancel_on(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// A connection that can carry JSON-RPC calls and notifications.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which wire the transport uses.
    fn kind(&self) -> TransportType;

    /// Send a request and wait for its correlated result.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: CallOptions,
    ) -> Result<Value, McpError>;

    /// Send a notification; no response is expected.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError>;

    /// Release the connection. Safe to call more than once.
    async fn close(&self) -> Result<(), McpError>;

    /// Whether the connection has been closed by either side.
    fn is_closed(&self) -> bool;
}

// ============================================================================
// Pending-call table
// ============================================================================

/// Outstanding calls awaiting a response, keyed by request id.
#[derive(Default)]
pub struct PendingCalls {
    slots: StdRwLock<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot for `id`. Fails if a live call already uses the id.
    pub fn register(&self, id: RequestId) -> Result<oneshot::Receiver<JsonRpcResponse>, McpError> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        if slots.contains_key(&id) {
            return Err(McpError::Transport(format!("duplicate request id {}", id)));
        }
        let (tx, rx) = oneshot::channel();
        slots.insert(id, tx);
        Ok(rx)
    }

    /// Hand a response to its waiting caller. Returns false if nobody waits for it.
    pub fn resolve(&self, response: JsonRpcResponse) -> bool {
        let slot = self
            .slots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&response.id);
        match slot {
            // The receiver may already be gone (caller timed out); that is fine.
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Forget a slot without resolving it.
    pub fn remove(&self, id: &RequestId) {
        self.slots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    /// Drop every slot; waiting callers observe a closed channel.
    pub fn fail_all(&self) -> usize {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        let count = slots.len();
        slots.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes a slot when the call finishes by any path, including being dropped.
struct SlotGuard<'a> {
    pending: &'a PendingCalls,
    id: RequestId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Resolves once `cancel` reads `true`; never resolves without a receiver or
/// after every sender is gone.
pub async fn cancelled(cancel: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = cancel else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(t) => tokio::time::sleep(t).await,
        None => std::future::pending().await,
    }
}

fn timeout_ms(timeout: Option<Duration>) -> u64 {
    timeout.map(|t| t.as_millis() as u64).unwrap_or_default()
}

// ============================================================================
// Stdio transport
// ============================================================================

/// Newline-delimited JSON-RPC over a pair of byte streams, usually a child
/// process's stdout/stdin.
pub struct StdioTransport {
    server: String,
    writer: Arc<Mutex<Option<BoxedWriter>>>,
    pending: Arc<PendingCalls>,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    child: Mutex<Option<Child>>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the configured command and attach to its standard streams.
    pub fn spawn(server: &str, config: &ServerConfig) -> Result<Self, McpError> {
        let command = config.command.as_deref().ok_or_else(|| {
            McpError::Config("Stdio transport requires 'command' field".to_string())
        })?;

        let mut cmd = Command::new(command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &config.env {
            cmd.env(key, expand_env_vars(value));
        }

        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::connection_failed(server, format!("spawn {}: {}", command, e)))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            // kill_on_drop reaps the process.
            return Err(McpError::connection_failed(server, "failed to attach stdio pipes"));
        };

        if let Some(stderr) = child.stderr.take() {
            let name = server.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %name, "stderr: {}", line);
                }
            });
        }

        debug!(server, command, pid = child.id(), "spawned MCP server");
        Ok(Self::start(server, Box::new(stdout), Box::new(stdin), Some(child)))
    }

    /// Run the protocol over already-connected streams (no child process).
    pub fn from_streams(server: &str, reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self::start(server, reader, writer, None)
    }

    fn start(server: &str, reader: BoxedReader, writer: BoxedWriter, child: Option<Child>) -> Self {
        let writer = Arc::new(Mutex::new(Some(writer)));
        let pending = Arc::new(PendingCalls::new());
        let closed = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(read_messages(
            server.to_string(),
            BufReader::new(reader),
            Arc::clone(&pending),
            Arc::clone(&writer),
            Arc::clone(&closed),
        ));

        Self {
            server: server.to_string(),
            writer,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            child: Mutex::new(child),
            reader_task: std::sync::Mutex::new(Some(task)),
        }
    }

    /// Number of calls currently waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn closed_error(&self) -> McpError {
        McpError::ConnectionClosed(self.server.clone())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportType {
        TransportType::Stdio
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: CallOptions,
    ) -> Result<Value, McpError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let id = self.next_request_id();
        let rx = self.pending.register(id.clone())?;
        let _slot = SlotGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        // The reader may have shut down between the first check and registration.
        if self.is_closed() {
            return Err(self.closed_error());
        }

        trace!(server = %self.server, %id, method, "sending request");
        write_frame(&self.writer, &JsonRpcRequest::new(id, method, params)).await?;

        let timeout = options.timeout;
        let response = tokio::select! {
            received = rx => received.map_err(|_| self.closed_error()),
            _ = deadline(timeout) => Err(McpError::Timeout {
                method: method.to_string(),
                timeout_ms: timeout_ms(timeout),
            }),
            _ = cancelled(options.cancel) => Err(McpError::Cancelled(method.to_string())),
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_rpc(method, start.elapsed(), response.is_ok());

        response?.into_result().map_err(McpError::from)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        write_frame(&self.writer, &JsonRpcNotification::new(method, params)).await
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closed.store(true, Ordering::SeqCst);

        // Dropping stdin signals EOF to a well-behaved server.
        self.writer.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(GRACEFUL_EXIT, child.wait()).await {
                Ok(status) => debug!(server = %self.server, ?status, "MCP server exited"),
                Err(_) => {
                    // kill() also waits for the process.
                    if let Err(e) = child.kill().await {
                        warn!(server = %self.server, "failed to kill MCP server: {}", e);
                    }
                }
            }
        }

        let task = self
            .reader_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }

        let dropped = self.pending.fail_all();
        if dropped > 0 {
            debug!(server = %self.server, dropped, "released pending calls on close");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if let Some(task) = self
            .reader_task
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}

async fn write_frame<T: Serialize>(
    writer: &Mutex<Option<BoxedWriter>>,
    frame: &T,
) -> Result<(), McpError> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');

    let mut guard = writer.lock().await;
    let writer = guard
        .as_mut()
        .ok_or_else(|| McpError::Transport("connection writer is closed".to_string()))?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Drain the server's output for the lifetime of the connection.
async fn read_messages(
    server: String,
    reader: BufReader<BoxedReader>,
    pending: Arc<PendingCalls>,
    writer: Arc<Mutex<Option<BoxedWriter>>>,
    closed: Arc<AtomicBool>,
) {
    let mut lines = reader.lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match JsonRpcMessage::parse_line(line) {
                    Ok(JsonRpcMessage::Response(response)) => {
                        let id = response.id.clone();
                        if !pending.resolve(response) {
                            debug!(server = %server, %id, "dropping response with no waiting caller");
                        }
                    }
                    Ok(JsonRpcMessage::Notification(note)) => {
                        debug!(server = %server, method = %note.method, "server notification");
                    }
                    Ok(JsonRpcMessage::Request(request)) => {
                        answer_server_request(&server, &writer, request).await;
                    }
                    Err(e) => {
                        warn!(server = %server, "skipping malformed message: {}", e);
                    }
                }
            }
            Ok(None) => {
                debug!(server = %server, "MCP server closed its output");
                break;
            }
            Err(e) => {
                warn!(server = %server, "error reading from MCP server: {}", e);
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    pending.fail_all();
}

/// The bridge only consumes servers; the one request it honours is `ping`.
async fn answer_server_request(
    server: &str,
    writer: &Mutex<Option<BoxedWriter>>,
    request: JsonRpcRequest,
) {
    let response = match request.method.as_str() {
        "ping" => JsonRpcResponse::success(request.id, Value::Object(Default::default())),
        method => {
            debug!(server, method, "rejecting server-initiated request");
            JsonRpcResponse::failure(
                request.id,
                super::protocol::JsonRpcError::method_not_found(method),
            )
        }
    };
    if let Err(e) = write_frame(writer, &response).await {
        warn!(server, "failed to answer server request: {}", e);
    }
}

// ============================================================================
// HTTP transport
// ============================================================================

/// JSON-RPC over HTTP POST to `<url>/rpc`.
pub struct HttpTransport {
    server: String,
    base_url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Build the HTTP client with auth and custom headers from the config.
    pub fn new(server: &str, config: &ServerConfig) -> Result<Self, McpError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| McpError::Config("HTTP transport requires 'url' field".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = config.expanded_bearer_token() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| McpError::Config(format!("invalid bearer token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| McpError::Config(format!("invalid header name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(&expand_env_vars(value))
                .map_err(|e| McpError::Config(format!("invalid header '{}': {}", key, e)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.startup_timeout())
            .build()
            .map_err(|e| McpError::connection_failed(server, e.to_string()))?;

        Ok(Self {
            server: server.to_string(),
            base_url: url.trim_end_matches('/').to_string(),
            client,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rpc_url(&self) -> String {
        format!("{}/rpc", self.base_url)
    }

    /// Best-effort `GET /health`. Failure is reported, never fatal.
    pub async fn probe_health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(server = %self.server, status = %resp.status(), "health probe failed");
                false
            }
            Err(e) => {
                warn!(server = %self.server, "health probe failed: {}", e);
                false
            }
        }
    }

    fn map_send_error(&self, method: &str, timeout: Option<Duration>, err: reqwest::Error) -> McpError {
        if err.is_timeout() {
            McpError::Timeout {
                method: method.to_string(),
                timeout_ms: timeout_ms(timeout),
            }
        } else {
            McpError::Transport(format!("{} request to '{}' failed: {}", method, self.server, err))
        }
    }

    async fn post<T: Serialize>(
        &self,
        method: &str,
        body: &T,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, McpError> {
        let mut request = self.client.post(self.rpc_url()).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| self.map_send_error(method, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::Transport(format!(
                "{} request to '{}' returned HTTP {}",
                method, self.server, status
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportType {
        TransportType::Http
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: CallOptions,
    ) -> Result<Value, McpError> {
        if self.is_closed() {
            return Err(McpError::ConnectionClosed(self.server.clone()));
        }

        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let body = JsonRpcRequest::new(id.clone(), method, params);
        let timeout = options.timeout;

        let exchange = async {
            let response = self.post(method, &body, timeout).await?;
            response
                .json::<JsonRpcResponse>()
                .await
                .map_err(|e| McpError::InvalidResponse(format!("{}: {}", method, e)))
        };

        let response = tokio::select! {
            result = exchange => result,
            _ = cancelled(options.cancel) => Err(McpError::Cancelled(method.to_string())),
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_rpc(method, start.elapsed(), response.is_ok());

        let response = response?;
        if response.id != id {
            return Err(McpError::InvalidResponse(format!(
                "{}: response id {} does not match request id {}",
                method, response.id, id
            )));
        }
        response.into_result().map_err(McpError::from)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(McpError::ConnectionClosed(self.server.clone()));
        }
        self.post(method, &JsonRpcNotification::new(method, params), None)
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::JsonRpcError;
    use serde_json::json;
    use tokio::io::{duplex, split, AsyncBufReadExt};

    /// A transport wired to the test through an in-memory pipe.
    fn pipe_transport() -> (
        StdioTransport,
        tokio::io::Lines<BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>>,
        tokio::io::WriteHalf<tokio::io::DuplexStream>,
    ) {
        let (client_side, server_side) = duplex(64 * 1024);
        let (client_read, client_write) = split(client_side);
        let (server_read, server_write) = split(server_side);
        let transport =
            StdioTransport::from_streams("test", Box::new(client_read), Box::new(client_write));
        (transport, BufReader::new(server_read).lines(), server_write)
    }

    async fn send_line(writer: &mut tokio::io::WriteHalf<tokio::io::DuplexStream>, value: Value) {
        let mut line = value.to_string();
        line.push('\n');
        writer.write_all(line.as_bytes()).await.unwrap();
    }

    #[test]
    fn test_pending_calls_register_and_resolve() {
        let pending = PendingCalls::new();
        let mut rx = pending.register(RequestId::Number(1)).unwrap();
        assert!(pending.register(RequestId::Number(1)).is_err());
        assert_eq!(pending.len(), 1);

        assert!(pending.resolve(JsonRpcResponse::success(RequestId::Number(1), json!(5))));
        assert!(pending.is_empty());
        assert_eq!(rx.try_recv().unwrap().result, Some(json!(5)));

        assert!(!pending.resolve(JsonRpcResponse::success(RequestId::Number(9), json!(0))));
    }

    #[test]
    fn test_slot_guard_removes_on_drop() {
        let pending = PendingCalls::new();
        let _rx = pending.register(RequestId::Number(3)).unwrap();
        {
            let _guard = SlotGuard {
                pending: &pending,
                id: RequestId::Number(3),
            };
        }
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let (transport, mut server_in, mut server_out) = pipe_transport();

        let server = tokio::spawn(async move {
            let line = server_in.next_line().await.unwrap().unwrap();
            let req: JsonRpcRequest = serde_json::from_str(&line).unwrap();
            assert_eq!(req.method, "tools/list");
            send_line(&mut server_out, json!({"jsonrpc": "2.0", "id": req.id, "result": {"tools": []}}))
                .await;
            server_out
        });

        let result = transport
            .request("tools/list", None, CallOptions::with_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(result, json!({"tools": []}));
        assert_eq!(transport.pending_count(), 0);
        let _ = server.await;
    }

    #[tokio::test]
    async fn test_error_response_becomes_protocol_error() {
        let (transport, mut server_in, mut server_out) = pipe_transport();

        tokio::spawn(async move {
            let line = server_in.next_line().await.unwrap().unwrap();
            let req: JsonRpcRequest = serde_json::from_str(&line).unwrap();
            let resp = JsonRpcResponse::failure(req.id, JsonRpcError::new(-32601, "nope"));
            send_line(&mut server_out, serde_json::to_value(resp).unwrap()).await;
            server_out
        });

        let err = transport
            .request("bogus", None, CallOptions::with_timeout(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Protocol { code: -32601, .. }));
    }

    #[tokio::test]
    async fn test_timeout_releases_slot() {
        let (transport, _server_in, _server_out) = pipe_transport();

        let err = transport
            .request("slow", None, CallOptions::with_timeout(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Timeout { .. }));
        assert_eq!(transport.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_releases_slot() {
        let (transport, _server_in, _server_out) = pipe_transport();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_tx.send(true).unwrap();
        });

        let err = transport
            .request("slow", None, CallOptions::default().cancel_on(cancel_rx))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Cancelled(_)));
        assert_eq!(transport.pending_count(), 0);
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_fails_outstanding_calls() {
        let (transport, server_in, server_out) = pipe_transport();

        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(server_out);
            drop(server_in);
        });

        let err = transport
            .request("never", None, CallOptions::with_timeout(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ConnectionClosed(_)));
        closer.await.unwrap();

        assert!(transport.is_closed());
        let err = transport.request("after", None, CallOptions::default()).await.unwrap_err();
        assert!(matches!(err, McpError::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn test_ping_from_server_is_answered() {
        let (_transport, mut server_in, mut server_out) = pipe_transport();

        send_line(&mut server_out, json!({"jsonrpc": "2.0", "id": "p1", "method": "ping"})).await;
        let line = server_in.next_line().await.unwrap().unwrap();
        let resp: JsonRpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(resp.id, RequestId::String("p1".into()));
        assert_eq!(resp.result, Some(json!({})));

        send_line(&mut server_out, json!({"jsonrpc": "2.0", "id": 9, "method": "sampling/createMessage"}))
            .await;
        let line = server_in.next_line().await.unwrap().unwrap();
        let resp: JsonRpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (transport, _server_in, _server_out) = pipe_transport();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(transport.is_closed());
        assert!(transport.notify("x", None).await.is_err());
    }

    #[tokio::test]
    async fn test_spawn_missing_command_fails() {
        let config = ServerConfig::stdio("/definitely/not/a/real/binary-secretary");
        let err = StdioTransport::spawn("ghost", &config).err().unwrap();
        assert!(matches!(err, McpError::ConnectionFailed { .. }));
    }

    #[test]
    fn test_http_transport_rejects_bad_header() {
        let mut config = ServerConfig::http("http://localhost:1");
        config.headers.insert("bad header".into(), "x".into());
        assert!(matches!(
            HttpTransport::new("h", &config).err().unwrap(),
            McpError::Config(_)
        ));

        let transport = HttpTransport::new("h", &ServerConfig::http("http://localhost:1/")).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:1");
        assert_eq!(transport.rpc_url(), "http://localhost:1/rpc");
    }
}
