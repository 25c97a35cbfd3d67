//! End-to-end lifecycle tests for the connection manager and the probe
//! tools, using a stub client where transport death must be simulated and
//! mockito where a real HTTP handshake is wanted.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    async_trait::async_trait,
    mockito::Matcher,
    serde_json::{Value, json},
};

use {
    mcp_probe_client::{
        Error as ClientError, InitializeResult, McpClientTrait, McpPromptDef, McpResourceDef,
        McpToolDef, PromptsGetResult, ResourcesReadResult, ToolContent, ToolsCallResult,
    },
    mcp_probe_harness::{
        ConnectionError, ConnectionManager, ProbeTool, TransportKind,
        tools::{connection::DisconnectTool, tools::CallToolTool},
    },
};

struct FakeClient {
    url: String,
    alive: AtomicBool,
    fail_calls: bool,
}

impl FakeClient {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            alive: AtomicBool::new(true),
            fail_calls: false,
        }
    }

    fn failing(url: &str) -> Self {
        Self {
            fail_calls: true,
            ..Self::new(url)
        }
    }

    fn die(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl McpClientTrait for FakeClient {
    fn server_url(&self) -> &str {
        &self.url
    }

    fn server_info(&self) -> Option<&InitializeResult> {
        None
    }

    async fn list_tools(&self) -> mcp_probe_client::Result<Vec<McpToolDef>> {
        Ok(vec![])
    }

    async fn call_tool(
        &self,
        name: &str,
        _arguments: Value,
    ) -> mcp_probe_client::Result<ToolsCallResult> {
        if self.fail_calls {
            return Err(ClientError::message(format!("Tool '{name}' not found")));
        }
        Ok(ToolsCallResult {
            content: vec![ToolContent::Text { text: "8".into() }],
            is_error: false,
        })
    }

    async fn list_resources(&self) -> mcp_probe_client::Result<Vec<McpResourceDef>> {
        Ok(vec![])
    }

    async fn read_resource(&self, _uri: &str) -> mcp_probe_client::Result<ResourcesReadResult> {
        Ok(ResourcesReadResult { contents: vec![] })
    }

    async fn list_prompts(&self) -> mcp_probe_client::Result<Vec<McpPromptDef>> {
        Ok(vec![])
    }

    async fn get_prompt(
        &self,
        _name: &str,
        _arguments: Option<Value>,
    ) -> mcp_probe_client::Result<PromptsGetResult> {
        Ok(PromptsGetResult {
            description: None,
            messages: vec![],
        })
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.die();
    }
}

/// Mock the initialize + initialized exchange on a mockito server.
async fn mock_handshake(server: &mut mockito::Server) {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": "initialize"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"jsonrpc":"2.0","id":1,"result":{
                "protocolVersion":"2024-11-05",
                "capabilities":{"tools":{}},
                "serverInfo":{"name":"target-server","version":"0.9.0"}}}"#,
        )
        .create_async()
        .await;
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(
            json!({"method": "notifications/initialized"}),
        ))
        .with_status(202)
        .create_async()
        .await;
}

#[tokio::test]
async fn test_full_lifecycle_with_transport_death() {
    let manager = Arc::new(ConnectionManager::default());
    let client = Arc::new(FakeClient::new("http://test.example/mcp"));
    manager.install(client.clone(), TransportKind::StreamableHttp, false);

    // Fresh connection: all counters zero.
    let state = manager.status().unwrap();
    assert_eq!(state.server_url, "http://test.example/mcp");
    assert_eq!(state.transport, TransportKind::StreamableHttp);
    assert_eq!(state.statistics.tools_called, 0);
    assert_eq!(state.statistics.errors, 0);
    assert!(!state.headers_provided);

    // Three successful tool calls bump tools_called to 3 and nothing else.
    let call_tool = CallToolTool::new(&manager);
    for _ in 0..3 {
        let out = call_tool
            .execute(json!({"tool_name": "add", "arguments": {"a": 5, "b": 3}}))
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["tool_call"]["result"], "8");
    }
    let state = manager.status().unwrap();
    assert_eq!(state.statistics.tools_called, 3);
    assert_eq!(state.statistics.resources_accessed, 0);
    assert_eq!(state.statistics.prompts_executed, 0);
    assert_eq!(state.statistics.errors, 0);

    // The transport dies; the next operation observes it exactly once.
    client.die();
    let err = manager.require_connection().await.unwrap_err();
    assert!(matches!(err, ConnectionError::ConnectionLost));

    // The slot was cleared lazily: status now reports no connection.
    assert!(manager.status().is_none());
    let err = manager.require_connection().await.unwrap_err();
    assert!(matches!(err, ConnectionError::NotConnected));
}

#[tokio::test]
async fn test_failed_tool_call_increments_errors_only() {
    let manager = Arc::new(ConnectionManager::default());
    manager.install(
        Arc::new(FakeClient::failing("http://test.example/mcp")),
        TransportKind::StreamableHttp,
        false,
    );

    let call_tool = CallToolTool::new(&manager);
    let out = call_tool
        .execute(json!({"tool_name": "missing_tool"}))
        .await
        .unwrap();
    assert_eq!(out["success"], false);
    assert_eq!(out["error"]["error_type"], "tool_not_found");

    let state = manager.status().unwrap();
    assert_eq!(state.statistics.errors, 1);
    assert_eq!(state.statistics.tools_called, 0);
}

#[tokio::test]
async fn test_counters_survive_unknown_stat_names() {
    let manager = ConnectionManager::default();
    manager.install(
        Arc::new(FakeClient::new("http://test.example/mcp")),
        TransportKind::StreamableHttp,
        false,
    );

    manager.increment_stat("tools_called");
    manager.increment_stat("bogus");
    manager.increment_stat("errors");

    let stats = manager.status().unwrap().statistics;
    assert_eq!(stats.tools_called, 1);
    assert_eq!(stats.errors, 1);
}

#[tokio::test]
async fn test_install_replaces_previous_connection() {
    let manager = ConnectionManager::default();
    manager.install(
        Arc::new(FakeClient::new("http://one.example/mcp")),
        TransportKind::StreamableHttp,
        false,
    );
    manager.increment_stat("tools_called");

    manager.install(
        Arc::new(FakeClient::new("http://two.example/mcp")),
        TransportKind::StreamableHttp,
        true,
    );

    let state = manager.status().unwrap();
    assert_eq!(state.server_url, "http://two.example/mcp");
    assert!(state.headers_provided);
    // Counters reset with the new connection.
    assert_eq!(state.statistics.tools_called, 0);
}

#[tokio::test]
async fn test_disconnect_tool_reports_previous_connection() {
    let manager = Arc::new(ConnectionManager::default());
    manager.install(
        Arc::new(FakeClient::new("http://test.example/mcp")),
        TransportKind::StreamableHttp,
        false,
    );
    manager.increment_stat("tools_called");

    let out = DisconnectTool::new(&manager).execute(json!({})).await.unwrap();
    assert_eq!(out["success"], true);
    assert_eq!(out["was_connected"], true);
    let previous = &out["metadata"]["previous_connection"];
    assert_eq!(previous["server_url"], "http://test.example/mcp");
    assert_eq!(previous["transport"], "streamable-http");
    assert_eq!(previous["statistics"]["tools_called"], 1);

    assert!(manager.status().is_none());
}

#[tokio::test]
async fn test_connect_over_http() {
    let mut server = mockito::Server::new_async().await;
    mock_handshake(&mut server).await;

    let manager = ConnectionManager::default();
    let state = manager.connect(&server.url(), None).await.unwrap();

    assert_eq!(state.transport, TransportKind::StreamableHttp);
    assert!(!state.headers_provided);
    let info = state.server_info.unwrap();
    assert_eq!(info.name.as_deref(), Some("target-server"));
    assert_eq!(info.version.as_deref(), Some("0.9.0"));
    let caps = info.capabilities.unwrap();
    assert!(caps.tools);
    assert!(!caps.resources);

    let closed = manager.disconnect().await.unwrap();
    assert_eq!(closed.server_url, server.url());
    assert!(manager.status().is_none());
}

#[tokio::test]
async fn test_connect_with_headers_sets_flag() {
    let mut server = mockito::Server::new_async().await;
    mock_handshake(&mut server).await;

    let manager = ConnectionManager::default();
    let headers = std::collections::HashMap::from([(
        "Authorization".to_string(),
        "Bearer token".to_string(),
    )]);
    let state = manager.connect(&server.url(), Some(headers)).await.unwrap();
    assert!(state.headers_provided);
}

#[tokio::test]
async fn test_connect_failure_leaves_no_connection() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let manager = ConnectionManager::default();
    let err = manager.connect(&server.url(), None).await.unwrap_err();
    assert!(matches!(err, ConnectionError::Handshake { .. }));
    assert!(manager.status().is_none());
}

#[tokio::test]
async fn test_concurrent_connects_leave_one_connection() {
    let mut server_a = mockito::Server::new_async().await;
    let mut server_b = mockito::Server::new_async().await;
    mock_handshake(&mut server_a).await;
    mock_handshake(&mut server_b).await;

    let manager = Arc::new(ConnectionManager::default());

    let first = tokio::spawn({
        let manager = manager.clone();
        let url = server_a.url();
        async move { manager.connect(&url, None).await }
    });
    let second = tokio::spawn({
        let manager = manager.clone();
        let url = server_b.url();
        async move { manager.connect(&url, None).await }
    });

    let (first, second) = tokio::join!(first, second);
    first.unwrap().unwrap();
    second.unwrap().unwrap();

    // Exactly one connection is installed afterward, never torn state.
    let state = manager.status().unwrap();
    assert!(state.server_url == server_a.url() || state.server_url == server_b.url());
    assert_eq!(state.statistics.tools_called, 0);
    assert_eq!(state.statistics.errors, 0);
}

#[tokio::test]
async fn test_connect_timeout_is_reported_as_timeout() {
    // A bound listener that never accepts: the TCP connect succeeds but the
    // handshake hangs until the connect bound expires.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let manager = ConnectionManager::new(std::time::Duration::from_secs(1));
    let err = manager.connect(&url, None).await.unwrap_err();

    assert!(matches!(err, ConnectionError::Timeout { seconds: 1, .. }));
    assert_eq!(
        err.to_string(),
        format!("Connection to {url} timed out after 1s")
    );
    assert!(manager.status().is_none());
}

#[tokio::test]
async fn test_reconnect_tears_down_previous_client() {
    let mut server = mockito::Server::new_async().await;
    mock_handshake(&mut server).await;

    let manager = ConnectionManager::default();
    let old_client = Arc::new(FakeClient::new("http://old.example/mcp"));
    manager.install(old_client.clone(), TransportKind::StreamableHttp, false);

    manager.connect(&server.url(), None).await.unwrap();

    // The previous client was shut down during the reconnect.
    assert!(!old_client.is_alive().await);
    assert_eq!(manager.status().unwrap().server_url, server.url());
}
