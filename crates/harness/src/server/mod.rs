//! The probe's own MCP server surface: JSON-RPC dispatch over stdio or
//! streamable HTTP.

pub mod http;
pub mod stdio;

use {
    serde_json::{Value, json},
    tracing::{debug, warn},
};

use crate::registry::ToolRegistry;

pub const SERVER_NAME: &str = "mcp-probe";

// JSON-RPC error codes.
const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

fn error_response(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message.into()},
    })
}

/// MCP server dispatching JSON-RPC requests to the probe tool registry.
pub struct McpServer {
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Handle one raw JSON-RPC message. Returns `None` when the message is
    /// a notification and no response must be sent.
    pub async fn handle_message(&self, raw: &str) -> Option<Value> {
        match serde_json::from_str::<Value>(raw) {
            Ok(message) => self.handle_value(message).await,
            Err(e) => {
                warn!(error = %e, "received unparseable JSON-RPC message");
                Some(error_response(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {e}"),
                ))
            },
        }
    }

    /// Handle one parsed JSON-RPC message.
    pub async fn handle_value(&self, message: Value) -> Option<Value> {
        let id = message.get("id").cloned();
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            return Some(error_response(
                id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "Missing method",
            ));
        };

        // Notifications get no response.
        if id.is_none() || method.starts_with("notifications/") {
            debug!(method = %method, "received notification");
            return None;
        }
        let id = id.unwrap_or(Value::Null);
        let params = message.get("params").cloned().unwrap_or(json!({}));

        debug!(method = %method, "handling MCP request");
        let result = match method {
            "initialize" => Ok(json!({
                "protocolVersion": mcp_probe_client::types::PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({"tools": self.registry.list_definitions()})),
            "tools/call" => self.handle_tools_call(params).await,
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        };

        Some(match result {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err((code, message)) => error_response(id, code, message),
        })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, (i64, String)> {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Err((INVALID_PARAMS, "tools/call requires a tool name".into()));
        };
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let Some(tool) = self.registry.get(name) else {
            warn!(tool = %name, "unknown tool called");
            return Err((INVALID_PARAMS, format!("Unknown tool: {name}")));
        };

        match tool.execute(arguments).await {
            Ok(value) => {
                let text = match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Ok(json!({
                    "content": [{"type": "text", "text": text}],
                    "isError": false,
                }))
            },
            Err(e) => {
                warn!(tool = %name, error = %e, "tool rejected its arguments");
                Err((INVALID_PARAMS, e.to_string()))
            },
        }
    }
}
