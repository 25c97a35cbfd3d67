//! Tool discovery and execution against the target server.

use std::{sync::Arc, time::Instant};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    chrono::Utc,
    serde_json::{Value, json},
    tracing::{error, info},
};

use mcp_probe_client::ToolContent;

use crate::{
    connection::ConnectionManager,
    registry::ProbeTool,
    tools::{classify_remote_error, elapsed_ms, error_detail, not_connected_detail},
};

/// Collapse MCP tool-call content into a single JSON value: one text block
/// becomes a plain string, anything else is kept as the raw content list.
fn shape_call_result(content: &[ToolContent]) -> Result<Value> {
    if let [ToolContent::Text { text }] = content {
        return Ok(json!(text));
    }
    Ok(serde_json::to_value(content)?)
}

/// List the tools exposed by the connected server.
pub struct ListToolsTool {
    manager: Arc<ConnectionManager>,
}

impl ListToolsTool {
    pub fn new(manager: &Arc<ConnectionManager>) -> Self {
        Self {
            manager: Arc::clone(manager),
        }
    }
}

#[async_trait]
impl ProbeTool for ListToolsTool {
    fn name(&self) -> &str {
        "list_tools"
    }

    fn description(&self) -> &str {
        "List all tools exposed by the connected MCP server"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value) -> Result<Value> {
        let start = Instant::now();

        let active = match self.manager.require_connection().await {
            Ok(active) => active,
            Err(e) => {
                return Ok(json!({
                    "success": false,
                    "error": not_connected_detail(e.to_string()),
                    "tools": [],
                    "metadata": {"request_time_ms": elapsed_ms(start)},
                }));
            },
        };

        match active.client.list_tools().await {
            Ok(tools) => {
                let total = tools.len();
                let tools: Vec<Value> = tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.input_schema,
                        })
                    })
                    .collect();

                let server_name = active
                    .state
                    .server_info
                    .as_ref()
                    .and_then(|info| info.name.clone());

                info!(total, "listed target server tools");
                Ok(json!({
                    "success": true,
                    "tools": tools,
                    "metadata": {
                        "total_tools": total,
                        "server_url": active.state.server_url,
                        "server_name": server_name,
                        "retrieved_at": Utc::now().to_rfc3339(),
                        "request_time_ms": elapsed_ms(start),
                    },
                }))
            },
            Err(e) => {
                error!(error = %e, "list_tools failed");
                self.manager.increment_stat("errors");
                Ok(json!({
                    "success": false,
                    "error": error_detail(
                        "execution_error",
                        format!("Failed to list tools: {e}"),
                        json!({"server_url": active.state.server_url}),
                        "Check that the target server is still running and reachable",
                    ),
                    "tools": [],
                    "metadata": {"request_time_ms": elapsed_ms(start)},
                }))
            },
        }
    }
}

/// Call a tool on the connected server.
pub struct CallToolTool {
    manager: Arc<ConnectionManager>,
}

impl CallToolTool {
    pub fn new(manager: &Arc<ConnectionManager>) -> Self {
        Self {
            manager: Arc::clone(manager),
        }
    }
}

#[async_trait]
impl ProbeTool for CallToolTool {
    fn name(&self) -> &str {
        "call_tool"
    }

    fn description(&self) -> &str {
        "Call a tool on the connected MCP server with the given arguments"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool_name": {"type": "string", "description": "Name of the tool to call"},
                "arguments": {
                    "type": "object",
                    "description": "Arguments to pass to the tool",
                },
            },
            "required": ["tool_name"],
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let start = Instant::now();
        let tool_name = params
            .get("tool_name")
            .and_then(Value::as_str)
            .context("call_tool requires a 'tool_name' string argument")?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let active = match self.manager.require_connection().await {
            Ok(active) => active,
            Err(e) => {
                return Ok(json!({
                    "success": false,
                    "error": not_connected_detail(e.to_string()),
                    "tool_call": Value::Null,
                    "metadata": {"request_time_ms": elapsed_ms(start)},
                }));
            },
        };

        let exec_start = Instant::now();
        match active.client.call_tool(&tool_name, arguments.clone()).await {
            Ok(result) => {
                self.manager.increment_stat("tools_called");
                let duration_ms = elapsed_ms(exec_start);
                info!(tool = %tool_name, duration_ms, "tool call succeeded");

                Ok(json!({
                    "success": true,
                    "tool_call": {
                        "tool_name": tool_name,
                        "arguments": arguments,
                        "result": shape_call_result(&result.content)?,
                        "execution": {
                            "success": !result.is_error,
                            "duration_ms": duration_ms,
                        },
                    },
                    "metadata": {
                        "request_time_ms": elapsed_ms(start),
                        "server_url": active.state.server_url,
                        "connection_statistics": active.state.statistics.snapshot(),
                    },
                }))
            },
            Err(e) => {
                self.manager.increment_stat("errors");
                let error_type = classify_remote_error(&e.to_string(), "tool_not_found");
                let suggestion = match error_type {
                    "tool_not_found" => "Use list_tools() to see the available tools",
                    "invalid_arguments" => "Check the tool's input schema for the required arguments",
                    _ => "Check the target server logs for details",
                };
                error!(tool = %tool_name, error = %e, error_type, "tool call failed");

                Ok(json!({
                    "success": false,
                    "error": error_detail(
                        error_type,
                        e.to_string(),
                        json!({"tool_name": tool_name, "arguments": arguments}),
                        suggestion,
                    ),
                    "tool_call": Value::Null,
                    "metadata": {
                        "request_time_ms": elapsed_ms(start),
                        "server_url": active.state.server_url,
                        "connection_statistics": active.state.statistics.snapshot(),
                    },
                }))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::default())
    }

    #[tokio::test]
    async fn test_list_tools_not_connected() {
        let tool = ListToolsTool::new(&manager());
        let out = tool.execute(json!({})).await.unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["error"]["error_type"], "not_connected");
        assert!(out["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Not connected"));
        assert!(out["error"]["suggestion"]
            .as_str()
            .unwrap()
            .contains("connect_to_server()"));
        assert_eq!(out["tools"], json!([]));
        assert!(out["metadata"]["request_time_ms"].is_number());
    }

    #[tokio::test]
    async fn test_call_tool_requires_name() {
        let tool = CallToolTool::new(&manager());
        assert!(tool.execute(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_call_tool_not_connected() {
        let tool = CallToolTool::new(&manager());
        let out = tool
            .execute(json!({"tool_name": "add", "arguments": {"a": 1, "b": 2}}))
            .await
            .unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["error"]["error_type"], "not_connected");
        assert!(out["tool_call"].is_null());
    }

    #[test]
    fn test_shape_call_result_single_text() {
        let content = vec![ToolContent::Text { text: "8".into() }];
        assert_eq!(shape_call_result(&content).unwrap(), json!("8"));
    }

    #[test]
    fn test_shape_call_result_multiple_blocks() {
        let content = vec![
            ToolContent::Text { text: "a".into() },
            ToolContent::Text { text: "b".into() },
        ];
        let shaped = shape_call_result(&content).unwrap();
        assert!(shaped.is_array());
        assert_eq!(shaped.as_array().unwrap().len(), 2);
    }
}
