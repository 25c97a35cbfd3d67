//! Resource discovery and retrieval against the target server.

use std::{sync::Arc, time::Instant};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    chrono::Utc,
    serde_json::{Value, json},
    tracing::{error, info},
};

use crate::{
    connection::ConnectionManager,
    registry::ProbeTool,
    tools::{classify_remote_error, elapsed_ms, error_detail, not_connected_detail},
};

/// List the resources advertised by the connected server.
pub struct ListResourcesTool {
    manager: Arc<ConnectionManager>,
}

impl ListResourcesTool {
    pub fn new(manager: &Arc<ConnectionManager>) -> Self {
        Self {
            manager: Arc::clone(manager),
        }
    }
}

#[async_trait]
impl ProbeTool for ListResourcesTool {
    fn name(&self) -> &str {
        "list_resources"
    }

    fn description(&self) -> &str {
        "List all resources advertised by the connected MCP server"
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
                    "resources": [],
                    "metadata": {"request_time_ms": elapsed_ms(start)},
                }));
            },
        };

        match active.client.list_resources().await {
            Ok(resources) => {
                let total = resources.len();
                let resources: Vec<Value> = resources
                    .iter()
                    .map(|r| {
                        json!({
                            "uri": r.uri,
                            "name": r.name,
                            "description": r.description,
                            "mimeType": r.mime_type,
                        })
                    })
                    .collect();

                info!(total, "listed target server resources");
                Ok(json!({
                    "success": true,
                    "resources": resources,
                    "metadata": {
                        "total_resources": total,
                        "server_url": active.state.server_url,
                        "retrieved_at": Utc::now().to_rfc3339(),
                        "request_time_ms": elapsed_ms(start),
                    },
                }))
            },
            Err(e) => {
                error!(error = %e, "list_resources failed");
                self.manager.increment_stat("errors");
                Ok(json!({
                    "success": false,
                    "error": error_detail(
                        "execution_error",
                        format!("Failed to list resources: {e}"),
                        json!({"server_url": active.state.server_url}),
                        "Check that the target server is still running and reachable",
                    ),
                    "resources": [],
                    "metadata": {"request_time_ms": elapsed_ms(start)},
                }))
            },
        }
    }
}

/// Read one resource from the connected server by URI.
pub struct ReadResourceTool {
    manager: Arc<ConnectionManager>,
}

impl ReadResourceTool {
    pub fn new(manager: &Arc<ConnectionManager>) -> Self {
        Self {
            manager: Arc::clone(manager),
        }
    }
}

#[async_trait]
impl ProbeTool for ReadResourceTool {
    fn name(&self) -> &str {
        "read_resource"
    }

    fn description(&self) -> &str {
        "Read a resource from the connected MCP server by URI"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "uri": {"type": "string", "description": "URI of the resource to read"},
            },
            "required": ["uri"],
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let start = Instant::now();
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .context("read_resource requires a 'uri' string argument")?
            .to_string();

        let active = match self.manager.require_connection().await {
            Ok(active) => active,
            Err(e) => {
                return Ok(json!({
                    "success": false,
                    "error": not_connected_detail(e.to_string()),
                    "resource": Value::Null,
                    "metadata": {"request_time_ms": elapsed_ms(start)},
                }));
            },
        };

        match active.client.read_resource(&uri).await {
            Ok(result) => {
                self.manager.increment_stat("resources_accessed");

                // Text wins over blob when a server sends both.
                let first = result.contents.first();
                let content = first
                    .and_then(|c| c.text.clone().or_else(|| c.blob.clone()))
                    .unwrap_or_default();
                let mime_type = first.and_then(|c| c.mime_type.clone());
                let content_size = content.len();

                info!(uri = %uri, content_size, "read target server resource");
                Ok(json!({
                    "success": true,
                    "resource": {
                        "uri": uri,
                        "content": content,
                        "mime_type": mime_type,
                    },
                    "metadata": {
                        "content_size": content_size,
                        "request_time_ms": elapsed_ms(start),
                        "server_url": active.state.server_url,
                        "connection_statistics": active.state.statistics.snapshot(),
                    },
                }))
            },
            Err(e) => {
                self.manager.increment_stat("errors");
                let error_type = classify_remote_error(&e.to_string(), "resource_not_found");
                let suggestion = match error_type {
                    "resource_not_found" => "Use list_resources() to see the available resources",
                    _ => "Check the target server logs for details",
                };
                error!(uri = %uri, error = %e, error_type, "read_resource failed");

                Ok(json!({
                    "success": false,
                    "error": error_detail(
                        error_type,
                        e.to_string(),
                        json!({"uri": uri}),
                        suggestion,
                    ),
                    "resource": Value::Null,
                    "metadata": {
                        "request_time_ms": elapsed_ms(start),
                        "server_url": active.state.server_url,
                    },
                }))
            },
        }
    }
}
