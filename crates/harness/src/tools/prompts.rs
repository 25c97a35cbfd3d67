//! Prompt discovery and retrieval against the target server.

use std::{sync::Arc, time::Instant};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    chrono::Utc,
    serde_json::{Value, json},
    tracing::{error, info},
};

use mcp_probe_client::PromptMessage;

use crate::{
    connection::ConnectionManager,
    registry::ProbeTool,
    tools::{classify_remote_error, elapsed_ms, error_detail, not_connected_detail},
};

/// Flatten a prompt message into `{role, content}` with plain-text content
/// where the server sent a text block.
pub(crate) fn shape_message(message: &PromptMessage) -> Value {
    let content = message
        .content
        .get("text")
        .and_then(Value::as_str)
        .map(|text| json!(text))
        .unwrap_or_else(|| message.content.clone());
    json!({"role": message.role, "content": content})
}

/// List the prompts advertised by the connected server.
pub struct ListPromptsTool {
    manager: Arc<ConnectionManager>,
}

impl ListPromptsTool {
    pub fn new(manager: &Arc<ConnectionManager>) -> Self {
        Self {
            manager: Arc::clone(manager),
        }
    }
}

#[async_trait]
impl ProbeTool for ListPromptsTool {
    fn name(&self) -> &str {
        "list_prompts"
    }

    fn description(&self) -> &str {
        "List all prompts advertised by the connected MCP server"
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
                    "prompts": [],
                    "metadata": {"request_time_ms": elapsed_ms(start)},
                }));
            },
        };

        match active.client.list_prompts().await {
            Ok(prompts) => {
                let total = prompts.len();
                let prompts: Vec<Value> = prompts
                    .iter()
                    .map(|p| {
                        let arguments: Vec<Value> = p
                            .arguments
                            .iter()
                            .map(|a| {
                                json!({
                                    "name": a.name,
                                    "description": a.description,
                                    "required": a.required,
                                })
                            })
                            .collect();
                        json!({
                            "name": p.name,
                            "description": p.description,
                            "arguments": arguments,
                        })
                    })
                    .collect();

                info!(total, "listed target server prompts");
                Ok(json!({
                    "success": true,
                    "prompts": prompts,
                    "metadata": {
                        "total_prompts": total,
                        "server_url": active.state.server_url,
                        "retrieved_at": Utc::now().to_rfc3339(),
                        "request_time_ms": elapsed_ms(start),
                    },
                }))
            },
            Err(e) => {
                error!(error = %e, "list_prompts failed");
                self.manager.increment_stat("errors");
                Ok(json!({
                    "success": false,
                    "error": error_detail(
                        "execution_error",
                        format!("Failed to list prompts: {e}"),
                        json!({"server_url": active.state.server_url}),
                        "Check that the target server is still running and reachable",
                    ),
                    "prompts": [],
                    "metadata": {"request_time_ms": elapsed_ms(start)},
                }))
            },
        }
    }
}

/// Retrieve a rendered prompt from the connected server.
pub struct GetPromptTool {
    manager: Arc<ConnectionManager>,
}

impl GetPromptTool {
    pub fn new(manager: &Arc<ConnectionManager>) -> Self {
        Self {
            manager: Arc::clone(manager),
        }
    }
}

#[async_trait]
impl ProbeTool for GetPromptTool {
    fn name(&self) -> &str {
        "get_prompt"
    }

    fn description(&self) -> &str {
        "Retrieve a rendered prompt from the connected MCP server"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt_name": {"type": "string", "description": "Name of the prompt"},
                "arguments": {
                    "type": "object",
                    "description": "Arguments for prompt template rendering",
                },
            },
            "required": ["prompt_name"],
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let start = Instant::now();
        let prompt_name = params
            .get("prompt_name")
            .and_then(Value::as_str)
            .context("get_prompt requires a 'prompt_name' string argument")?
            .to_string();
        let arguments = params.get("arguments").cloned().filter(|v| !v.is_null());

        let active = match self.manager.require_connection().await {
            Ok(active) => active,
            Err(e) => {
                return Ok(json!({
                    "success": false,
                    "error": not_connected_detail(e.to_string()),
                    "prompt": Value::Null,
                    "metadata": {"request_time_ms": elapsed_ms(start)},
                }));
            },
        };

        match active.client.get_prompt(&prompt_name, arguments.clone()).await {
            Ok(result) => {
                self.manager.increment_stat("prompts_executed");
                let messages: Vec<Value> = result.messages.iter().map(shape_message).collect();

                info!(prompt = %prompt_name, messages = messages.len(), "retrieved prompt");
                Ok(json!({
                    "success": true,
                    "prompt": {
                        "name": prompt_name,
                        "description": result.description,
                        "messages": messages,
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
                let error_type = classify_remote_error(&e.to_string(), "prompt_not_found");
                let suggestion = match error_type {
                    "prompt_not_found" => "Use list_prompts() to see the available prompts",
                    "invalid_arguments" => "Check the prompt's declared arguments",
                    _ => "Check the target server logs for details",
                };
                error!(prompt = %prompt_name, error = %e, error_type, "get_prompt failed");

                Ok(json!({
                    "success": false,
                    "error": error_detail(
                        error_type,
                        e.to_string(),
                        json!({"prompt_name": prompt_name, "arguments": arguments}),
                        suggestion,
                    ),
                    "prompt": Value::Null,
                    "metadata": {
                        "request_time_ms": elapsed_ms(start),
                        "server_url": active.state.server_url,
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
    async fn test_list_prompts_not_connected() {
        let tool = ListPromptsTool::new(&manager());
        let out = tool.execute(json!({})).await.unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["error"]["error_type"], "not_connected");
        assert_eq!(out["prompts"], json!([]));
    }

    #[tokio::test]
    async fn test_get_prompt_not_connected() {
        let tool = GetPromptTool::new(&manager());
        let out = tool
            .execute(json!({"prompt_name": "greeting"}))
            .await
            .unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["error"]["error_type"], "not_connected");
        assert!(out["prompt"].is_null());
    }

    #[tokio::test]
    async fn test_get_prompt_requires_name() {
        let tool = GetPromptTool::new(&manager());
        assert!(tool.execute(json!({})).await.is_err());
    }

    #[test]
    fn test_shape_message_extracts_text() {
        let message = PromptMessage {
            role: "user".into(),
            content: json!({"type": "text", "text": "Hello Alice"}),
        };
        assert_eq!(
            shape_message(&message),
            json!({"role": "user", "content": "Hello Alice"})
        );
    }

    #[test]
    fn test_shape_message_keeps_non_text_content() {
        let message = PromptMessage {
            role: "user".into(),
            content: json!({"type": "image", "data": "...", "mimeType": "image/png"}),
        };
        let shaped = shape_message(&message);
        assert_eq!(shaped["content"]["type"], "image");
    }
}
