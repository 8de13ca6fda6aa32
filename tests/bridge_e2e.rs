// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end bridge tests against in-process MCP servers: a line-based
//! server over an in-memory pipe and an HTTP server on a loopback port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use secretary::bridge::{
    AgentDispatcher, AgentQuery, AgentReply, AgentRequest, AuditEventType, BridgeError,
    McpBridge, MemoryAuditSink, PermissionChecker, ToolCallRequest, ToolMapping,
    BASELINE_CONFIDENCE,
};
use secretary::context::{ContextError, ContextQuery, ContextStore, ContextType};
use secretary::mcp::{error_codes, McpClient, McpError, ServerConfig, StdioTransport};

#[derive(Default)]
struct MockState {
    resource_reads: AtomicUsize,
}

fn reply(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn error_reply(id: Value, code: i32, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

/// Answer one request the way a small filesystem-and-search server would.
fn handle(state: &MockState, id: Value, method: &str, params: &Value) -> Value {
    match method {
        "initialize" => reply(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}, "resources": {}},
                "serverInfo": {"name": "mock-fs", "version": "1.2.0"},
                "instructions": "Search first, then read."
            }),
        ),
        "tools/list" => reply(
            id,
            json!({"tools": [
                {"name": "search", "description": "Search the index"},
                {"name": "fail"},
                {"name": "echo_n"}
            ]}),
        ),
        "tools/call" => {
            let args = &params["arguments"];
            match params["name"].as_str().unwrap_or_default() {
                "search" => {
                    let q = args["query"].as_str().or(args["q"].as_str()).unwrap_or_default();
                    reply(id, json!({"content": [{"type": "text", "text": format!("result for {}", q)}]}))
                }
                "fail" => reply(id, json!({"content": [{"type": "text", "text": "boom"}], "isError": true})),
                "echo_n" => reply(id, json!({"content": [{"type": "text", "text": args["n"].to_string()}]})),
                other => error_reply(id, error_codes::INVALID_PARAMS, &format!("Unknown tool: {}", other)),
            }
        }
        "resources/list" => reply(
            id,
            json!({"resources": [
                {"uri": "file:///a.txt", "name": "a.txt"},
                {"uri": "file:///img.png", "name": "img"},
                {"uri": "file:///gone", "name": "gone"}
            ]}),
        ),
        "resources/read" => {
            state.resource_reads.fetch_add(1, Ordering::SeqCst);
            match params["uri"].as_str().unwrap_or_default() {
                "file:///a.txt" => reply(
                    id,
                    json!({"contents": [{"uri": "file:///a.txt", "mimeType": "text/plain", "text": "hello"}]}),
                ),
                "file:///img.png" => reply(
                    id,
                    json!({"contents": [{"uri": "file:///img.png", "mimeType": "image/png", "blob": "aGk="}]}),
                ),
                "file:///empty" => reply(id, json!({"contents": []})),
                _ => error_reply(id, error_codes::RESOURCE_NOT_FOUND, "Resource not found"),
            }
        }
        other => error_reply(id, error_codes::METHOD_NOT_FOUND, &format!("Method not found: {}", other)),
    }
}

/// Line-based server. Tool calls are answered after a short, varying delay
/// so replies arrive out of order.
async fn serve(stream: DuplexStream, state: Arc<MockState>) {
    let (read, write) = split(stream);
    let write = Arc::new(Mutex::new(write));
    let mut lines = BufReader::new(read).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let msg: Value = serde_json::from_str(&line).unwrap();
        let Some(id) = msg.get("id").cloned() else {
            continue;
        };
        let method = msg["method"].as_str().unwrap_or_default();
        let delay = match method {
            "tools/call" => Duration::from_millis(msg["params"]["arguments"]["n"].as_u64().map_or(0, |n| (100 - n) % 10)),
            _ => Duration::ZERO,
        };
        let response = handle(&state, id, method, &msg["params"]);

        let write = Arc::clone(&write);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut out = response.to_string();
            out.push('\n');
            let _ = write.lock().await.write_all(out.as_bytes()).await;
        });
    }
}

async fn connected_bridge() -> (Arc<McpBridge>, Arc<MockState>) {
    connected_bridge_with_cache_ttl(secretary::bridge::DEFAULT_RESOURCE_TTL).await
}

async fn connected_bridge_with_cache_ttl(ttl: Duration) -> (Arc<McpBridge>, Arc<MockState>) {
    let state = Arc::new(MockState::default());
    let (client_side, server_side) = duplex(1 << 16);
    tokio::spawn(serve(server_side, Arc::clone(&state)));

    let (read, write) = split(client_side);
    let transport = Arc::new(StdioTransport::from_streams("fs", Box::new(read), Box::new(write)));
    let client = Arc::new(McpClient::new("fs", ServerConfig::stdio("mock-fs")));
    client.connect_with_transport(transport).await.unwrap();

    let bridge = Arc::new(McpBridge::with_cache_ttl(Arc::new(ContextStore::new()), ttl));
    bridge.add_client("fs", client).await.unwrap();
    (bridge, state)
}

#[tokio::test]
async fn test_discover_lists_what_the_server_offers() {
    let (bridge, _) = connected_bridge().await;
    let discovery = bridge.discover_server("fs").await.unwrap();

    assert_eq!(discovery.server_info.name, "mock-fs");
    assert_eq!(discovery.protocol_version, "2024-11-05");
    assert_eq!(discovery.instructions.as_deref(), Some("Search first, then read."));

    let tools = discovery.tools.unwrap();
    assert!(tools.iter().any(|t| t.name == "search"));
    assert_eq!(tools[0].source_tag(), "mcp:fs/search");
    assert_eq!(discovery.resources.unwrap().len(), 3);
    assert!(discovery.prompts.is_none());
}

#[tokio::test]
async fn test_query_is_translated_and_answered() {
    let (bridge, _) = connected_bridge().await;
    bridge.register_mapping(ToolMapping::new("search", "fs", "search")).await;
    bridge.register_mapping(ToolMapping::new("explode", "fs", "fail")).await;

    let answer = bridge.answer_query(&AgentQuery::new("search rust async")).await.unwrap();
    assert_eq!(answer.answer, "result for search rust async");
    assert_eq!(answer.confidence, BASELINE_CONFIDENCE);
    assert_eq!(answer.sources, vec!["mcp:fs/search".to_string()]);
    assert!(answer.success);

    let failed = bridge.answer_query(&AgentQuery::new("explode now")).await.unwrap();
    assert_eq!(failed.confidence, 0.0);
    assert!(!failed.success);
    assert!(failed.answer.contains("boom"));

    let err = bridge.answer_query(&AgentQuery::new("weather")).await.unwrap_err();
    assert!(matches!(err, BridgeError::NoMapping(_)));
}

#[tokio::test]
async fn test_protocol_errors_keep_their_code() {
    let (bridge, _) = connected_bridge().await;
    let err = bridge
        .execute_tool_call(&ToolCallRequest::new("fs", "missing", json!({})))
        .await
        .unwrap_err();

    match &err {
        BridgeError::ToolCall { tool, source, .. } => {
            assert_eq!(tool, "missing");
            assert!(matches!(source, McpError::Protocol { code, .. } if *code == error_codes::INVALID_PARAMS));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.to_rpc_error().code, error_codes::INVALID_PARAMS);
}

#[tokio::test]
async fn test_concurrent_calls_are_correlated() {
    let (bridge, _) = connected_bridge().await;

    let mut calls = JoinSet::new();
    for n in 0..100u64 {
        let bridge = Arc::clone(&bridge);
        calls.spawn(async move {
            let request = ToolCallRequest::new("fs", "echo_n", json!({"n": n}));
            let response = bridge.execute_tool_call(&request).await.unwrap();
            (n, response.answer)
        });
    }

    let mut seen = 0;
    while let Some(result) = calls.join_next().await {
        let (n, answer) = result.unwrap();
        assert_eq!(answer, n.to_string());
        seen += 1;
    }
    assert_eq!(seen, 100);
}

#[tokio::test]
async fn test_fetched_resource_becomes_context() {
    let (bridge, state) = connected_bridge().await;

    let ids = bridge.fetch_resource_as_context("fs", "file:///a.txt").await.unwrap();
    assert_eq!(ids.len(), 1);

    let entry = bridge.store().get(&ids[0]).await.unwrap();
    assert_eq!(entry.entry_type, ContextType::Project);
    assert_eq!(entry.source, "mcp:fs");
    assert_eq!(entry.content, "hello");
    assert_eq!(entry.metadata["uri"], "file:///a.txt");
    assert_eq!(entry.metadata["mimeType"], "text/plain");

    let found = bridge.store().query(&ContextQuery::new().topic("resource")).await;
    assert_eq!(found.total, 1);

    // The fetch refreshed the cache, so a read does not reach the server.
    let cached = bridge.read_resource("fs", "file:///a.txt").await.unwrap();
    assert_eq!(cached.contents[0].text.as_deref(), Some("hello"));
    assert_eq!(state.resource_reads.load(Ordering::SeqCst), 1);
    assert!(bridge.get_cached_resource("file:///a.txt").await.is_some());

    // Fetching always goes to the server.
    bridge.fetch_resource_as_context("fs", "file:///a.txt").await.unwrap();
    assert_eq!(state.resource_reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cached_resource_expires() {
    let (bridge, state) = connected_bridge_with_cache_ttl(Duration::from_millis(40)).await;
    bridge.fetch_resource_as_context("fs", "file:///a.txt").await.unwrap();
    assert!(bridge.get_cached_resource("file:///a.txt").await.is_some());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(bridge.get_cached_resource("file:///a.txt").await.is_none());
    assert_eq!(bridge.cache().len().await, 0);

    bridge.read_resource("fs", "file:///a.txt").await.unwrap();
    assert_eq!(state.resource_reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_binary_and_missing_resources() {
    let (bridge, _) = connected_bridge().await;

    let ids = bridge.fetch_resource_as_context("fs", "file:///img.png").await.unwrap();
    let entry = bridge.store().get(&ids[0]).await.unwrap();
    assert_eq!(entry.content, "aGk=");
    assert_eq!(entry.metadata["encoding"], "base64");

    let err = bridge.fetch_resource_as_context("fs", "file:///empty").await.unwrap_err();
    assert!(matches!(err, BridgeError::ResourceNotFound(_)));

    let err = bridge.fetch_resource_as_context("fs", "file:///gone").await.unwrap_err();
    assert!(matches!(err, BridgeError::Resource { .. }));
    assert_eq!(err.to_rpc_error().code, error_codes::RESOURCE_NOT_FOUND);
    assert!(bridge.get_cached_resource("file:///gone").await.is_none());
}

#[tokio::test]
async fn test_sync_continues_past_failures() {
    let (bridge, _) = connected_bridge().await;

    let err = bridge.sync_all_resources().await.unwrap_err();
    let BridgeError::Sync { report, failures } = err else {
        panic!("expected a sync error");
    };
    assert_eq!(report.servers, 1);
    assert_eq!(report.resources, 2);
    assert_eq!(report.entries, 2);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].uri.as_deref(), Some("file:///gone"));

    let stats = bridge.store().stats().await;
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.by_type[&ContextType::Project], 2);
}

#[tokio::test]
async fn test_removed_client_is_gone() {
    let (bridge, _) = connected_bridge().await;
    let client = bridge.remove_client("fs").await.unwrap();
    assert!(!client.is_ready().await);

    let err = bridge
        .execute_tool_call(&ToolCallRequest::new("fs", "search", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ServerNotFound(_)));

    let status = bridge.status().await;
    assert!(status.servers.is_empty());
}

struct NoDiscovery;

impl PermissionChecker for NoDiscovery {
    fn check_permission(&self, _agent_id: &str, _resource: &str, action: &str) -> bool {
        action != "discover"
    }
}

#[tokio::test]
async fn test_dispatcher_checks_and_audits() {
    let (bridge, _) = connected_bridge().await;
    bridge.register_mapping(ToolMapping::new("search", "fs", "search")).await;
    let audit = Arc::new(MemoryAuditSink::new());
    let dispatcher = AgentDispatcher::new("secretary", bridge, Arc::new(NoDiscovery), audit.clone());

    let reply = dispatcher
        .dispatch("planner", AgentRequest::Query(AgentQuery::new("search docs")))
        .await
        .unwrap();
    let AgentReply::Answer(answer) = reply else {
        panic!("expected an answer");
    };
    assert_eq!(answer.answer, "result for search docs");

    let reply = dispatcher
        .dispatch(
            "planner",
            AgentRequest::FetchResource {
                server: "fs".into(),
                uri: "file:///a.txt".into(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(reply, AgentReply::Context { ref entry_ids } if entry_ids.len() == 1));

    let err = dispatcher
        .dispatch("planner", AgentRequest::Discover { server: "fs".into() })
        .await
        .unwrap_err();
    assert_eq!(err.code, error_codes::PERMISSION_DENIED);

    let events: Vec<_> = audit.records().iter().map(|r| r.event_type).collect();
    assert_eq!(
        events,
        vec![
            AuditEventType::ToolCall,
            AuditEventType::ResourceFetch,
            AuditEventType::PermissionDenied
        ]
    );
    assert!(audit.records().iter().all(|r| r.from_agent == "planner" && r.to_agent == "secretary"));
}

// ----------------------------------------------------------------------------
// HTTP
// ----------------------------------------------------------------------------

async fn http_rpc(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(msg): Json<Value>) -> Response {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sekrit") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some(id) = msg.get("id").cloned() else {
        return StatusCode::ACCEPTED.into_response();
    };
    let method = msg["method"].as_str().unwrap_or_default();
    Json(handle(&state, id, method, &msg["params"])).into_response()
}

async fn http_server() -> (String, Arc<MockState>) {
    let state = Arc::new(MockState::default());
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/rpc", post(http_rpc))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/", addr), state)
}

#[tokio::test]
async fn test_http_server_connects_lazily() {
    let (url, state) = http_server().await;
    let bridge = McpBridge::new(Arc::new(ContextStore::new()));
    bridge
        .add_server("web", ServerConfig::http(url).with_bearer_token("sekrit"))
        .await
        .unwrap();
    bridge.register_mapping(ToolMapping::new("search", "web", "search")).await;

    let answer = bridge.answer_query(&AgentQuery::new("search http")).await.unwrap();
    assert_eq!(answer.answer, "result for search http");
    assert!(bridge.get_client("web").await.unwrap().is_ready().await);

    let cached = bridge.read_resource("web", "file:///a.txt").await.unwrap();
    assert_eq!(cached.contents[0].text.as_deref(), Some("hello"));
    bridge.read_resource("web", "file:///a.txt").await.unwrap();
    assert_eq!(state.resource_reads.load(Ordering::SeqCst), 1);

    bridge.shutdown().await;
    assert_eq!(bridge.status().await.connected_servers, 0);
}

#[tokio::test]
async fn test_http_rejection_is_a_server_error() {
    let (url, _) = http_server().await;
    let bridge = McpBridge::new(Arc::new(ContextStore::new()));
    bridge
        .add_server("web", ServerConfig::http(url).with_bearer_token("wrong"))
        .await
        .unwrap();

    let err = bridge.discover_server("web").await.unwrap_err();
    assert!(matches!(err, BridgeError::Server { .. }));
    assert!(err.to_string().contains("web"));
}

#[tokio::test]
async fn test_expired_context_is_reported_as_expired() {
    let store = Arc::new(ContextStore::new());
    let id = store
        .store(
            secretary::context::ContextEntry::new(ContextType::Activity, "test", "brief")
                .with_ttl(Duration::from_millis(20)),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(store.get(&id).await, Err(ContextError::Expired { .. })));
}
