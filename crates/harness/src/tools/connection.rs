//! Connection lifecycle tools: connect, disconnect, status.

use std::{collections::HashMap, sync::Arc, time::Instant};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    chrono::Utc,
    serde_json::{Value, json},
    tracing::{error, info},
};

use crate::{
    connection::{ConnectionError, ConnectionManager},
    registry::ProbeTool,
    tools::{elapsed_ms, error_detail, round2},
};

fn parse_headers(params: &Value) -> Result<Option<HashMap<String, String>>> {
    let Some(raw) = params.get("headers") else {
        return Ok(None);
    };
    if raw.is_null() {
        return Ok(None);
    }
    let obj = raw
        .as_object()
        .context("'headers' must be an object of string values")?;

    let mut headers = HashMap::new();
    for (key, value) in obj {
        let value = value
            .as_str()
            .with_context(|| format!("header '{key}' must be a string"))?;
        headers.insert(key.clone(), value.to_string());
    }
    Ok(Some(headers))
}

/// Connect to a target MCP server.
pub struct ConnectToServerTool {
    manager: Arc<ConnectionManager>,
}

impl ConnectToServerTool {
    pub fn new(manager: &Arc<ConnectionManager>) -> Self {
        Self {
            manager: Arc::clone(manager),
        }
    }
}

#[async_trait]
impl ProbeTool for ConnectToServerTool {
    fn name(&self) -> &str {
        "connect_to_server"
    }

    fn description(&self) -> &str {
        "Connect to an MCP server by URL (streamable HTTP or SSE) or local command (stdio)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Server URL (http://..., https://...) or command/path for stdio",
                },
                "headers": {
                    "type": "object",
                    "description": "Optional HTTP headers for authenticated connections. Ignored for stdio.",
                    "additionalProperties": {"type": "string"},
                },
            },
            "required": ["url"],
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let start = Instant::now();
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .context("connect_to_server requires a 'url' string argument")?
            .to_string();
        let headers = parse_headers(&params)?;

        match self.manager.connect(&url, headers).await {
            Ok(state) => {
                info!(url = %url, transport = %state.transport, "connect_to_server succeeded");
                Ok(json!({
                    "success": true,
                    "connection": serde_json::to_value(&state)?,
                    "message": format!("Successfully connected to {url}"),
                    "metadata": {
                        "request_time_ms": elapsed_ms(start),
                        "transport": state.transport,
                        "server_url": state.server_url,
                        "headers_provided": state.headers_provided,
                    },
                }))
            },
            Err(e) => {
                error!(url = %url, error = %e, "connect_to_server failed");
                let suggestion = match &e {
                    ConnectionError::Timeout { .. } => {
                        "The connection timed out. Check server availability and network connectivity"
                    },
                    _ if !url.starts_with("http") => {
                        "For local commands, ensure the path is valid and the server executable has correct permissions"
                    },
                    _ => "Check that the server URL is correct and the server is running",
                };
                Ok(json!({
                    "success": false,
                    "error": error_detail(
                        "connection_failed",
                        e.to_string(),
                        json!({"url": url}),
                        suggestion,
                    ),
                    "connection": Value::Null,
                    "metadata": {
                        "request_time_ms": elapsed_ms(start),
                        "attempted_url": url,
                    },
                }))
            },
        }
    }
}

/// Close the current connection. Always succeeds.
pub struct DisconnectTool {
    manager: Arc<ConnectionManager>,
}

impl DisconnectTool {
    pub fn new(manager: &Arc<ConnectionManager>) -> Self {
        Self {
            manager: Arc::clone(manager),
        }
    }
}

#[async_trait]
impl ProbeTool for DisconnectTool {
    fn name(&self) -> &str {
        "disconnect"
    }

    fn description(&self) -> &str {
        "Close the current MCP server connection"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value) -> Result<Value> {
        let start = Instant::now();
        let previous = self.manager.disconnect().await;
        let was_connected = previous.is_some();

        let message = if was_connected {
            "Successfully disconnected from MCP server"
        } else {
            "No active connection to disconnect"
        };

        let mut metadata = json!({
            "request_time_ms": elapsed_ms(start),
            "was_connected": was_connected,
        });
        if let Some(previous) = previous {
            let duration_seconds = round2(
                (Utc::now() - previous.connected_at).num_milliseconds() as f64 / 1000.0,
            );
            metadata["previous_connection"] = json!({
                "server_url": previous.server_url,
                "transport": previous.transport,
                "duration_seconds": duration_seconds,
                "statistics": previous.statistics,
            });
        }

        info!(was_connected, "disconnect completed");
        Ok(json!({
            "success": true,
            "message": message,
            "was_connected": was_connected,
            "metadata": metadata,
        }))
    }
}

/// Report the current connection state. Always succeeds.
pub struct GetConnectionStatusTool {
    manager: Arc<ConnectionManager>,
}

impl GetConnectionStatusTool {
    pub fn new(manager: &Arc<ConnectionManager>) -> Self {
        Self {
            manager: Arc::clone(manager),
        }
    }
}

#[async_trait]
impl ProbeTool for GetConnectionStatusTool {
    fn name(&self) -> &str {
        "get_connection_status"
    }

    fn description(&self) -> &str {
        "Check the current MCP server connection state and usage statistics"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value) -> Result<Value> {
        let start = Instant::now();
        let state = self.manager.status();
        let connected = state.is_some();

        let mut metadata = json!({"request_time_ms": elapsed_ms(start)});
        let (message, connection) = match state {
            Some(state) => {
                let duration_seconds = round2(
                    (Utc::now() - state.connected_at).num_milliseconds() as f64 / 1000.0,
                );
                metadata["connection_duration_seconds"] = json!(duration_seconds);
                (
                    format!("Connected to {}", state.server_url),
                    serde_json::to_value(&state)?,
                )
            },
            None => ("Not connected to any MCP server".to_string(), Value::Null),
        };

        Ok(json!({
            "success": true,
            "connected": connected,
            "connection": connection,
            "message": message,
            "metadata": metadata,
        }))
    }
}
