//! Probe tools: each tool performs one operation against the target server
//! and shapes a `{success, ..., metadata}` JSON envelope.

pub mod builtin;
pub mod connection;
pub mod llm;
pub mod prompts;
pub mod resources;
pub mod tools;

use std::{sync::Arc, time::Instant};

use serde_json::{Value, json};

use crate::{connection::ConnectionManager, registry::ToolRegistry};

/// Build the full probe tool registry backed by one connection manager.
///
/// `transport_label` is the transport this server itself is being served
/// over; it is only reported by `health_check`.
pub fn build_registry(manager: &Arc<ConnectionManager>, transport_label: &str) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(builtin::HealthCheckTool::new(transport_label)));
    registry.register(Box::new(builtin::PingTool));
    registry.register(Box::new(builtin::EchoTool));
    registry.register(Box::new(builtin::AddTool));

    registry.register(Box::new(connection::ConnectToServerTool::new(manager)));
    registry.register(Box::new(connection::DisconnectTool::new(manager)));
    registry.register(Box::new(connection::GetConnectionStatusTool::new(manager)));

    registry.register(Box::new(tools::ListToolsTool::new(manager)));
    registry.register(Box::new(tools::CallToolTool::new(manager)));

    registry.register(Box::new(resources::ListResourcesTool::new(manager)));
    registry.register(Box::new(resources::ReadResourceTool::new(manager)));

    registry.register(Box::new(prompts::ListPromptsTool::new(manager)));
    registry.register(Box::new(prompts::GetPromptTool::new(manager)));

    registry.register(Box::new(llm::ExecutePromptWithLlmTool::new(manager)));

    registry
}

/// Milliseconds elapsed since `start`, rounded to two decimals.
pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    round2(start.elapsed().as_secs_f64() * 1000.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Build the `error` object of a failure envelope.
pub(crate) fn error_detail(
    error_type: &str,
    message: impl Into<String>,
    details: Value,
    suggestion: &str,
) -> Value {
    json!({
        "error_type": error_type,
        "message": message.into(),
        "details": details,
        "suggestion": suggestion,
    })
}

/// The `error` object used when no connection is active.
pub(crate) fn not_connected_detail(message: impl Into<String>) -> Value {
    error_detail(
        "not_connected",
        message,
        Value::Null,
        "Use connect_to_server() to establish a connection first",
    )
}

/// Best-effort classification of a remote-call failure by its message.
/// `not_found` is the type to report when the message looks like a lookup
/// failure (e.g. `tool_not_found`).
pub(crate) fn classify_remote_error(message: &str, not_found: &'static str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("not found") || lower.contains("unknown") {
        not_found
    } else if lower.contains("invalid argument") || lower.contains("validation") {
        "invalid_arguments"
    } else {
        "execution_error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.3456), 12.35);
        assert_eq!(round2(3.014), 3.01);
        assert_eq!(round2(2.0), 2.0);
    }

    #[test]
    fn test_classify_remote_error() {
        assert_eq!(
            classify_remote_error("Tool 'x' not found", "tool_not_found"),
            "tool_not_found"
        );
        assert_eq!(
            classify_remote_error("Unknown prompt: greeting", "prompt_not_found"),
            "prompt_not_found"
        );
        assert_eq!(
            classify_remote_error("Invalid arguments: a must be a number", "tool_not_found"),
            "invalid_arguments"
        );
        assert_eq!(
            classify_remote_error("validation error for b", "tool_not_found"),
            "invalid_arguments"
        );
        assert_eq!(
            classify_remote_error("Division by zero", "tool_not_found"),
            "execution_error"
        );
    }

    #[test]
    fn test_build_registry_has_all_tools() {
        let manager = Arc::new(ConnectionManager::default());
        let registry = build_registry(&manager, "stdio");
        let names = registry.tool_names();
        for expected in [
            "health_check",
            "ping",
            "echo",
            "add",
            "connect_to_server",
            "disconnect",
            "get_connection_status",
            "list_tools",
            "call_tool",
            "list_resources",
            "read_resource",
            "list_prompts",
            "get_prompt",
            "execute_prompt_with_llm",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
        assert_eq!(registry.len(), 14);
    }
}
