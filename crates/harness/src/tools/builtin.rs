//! Built-in tools that need no target connection: quick checks that the
//! probe server itself is reachable and behaving.

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    serde_json::{Value, json},
    tracing::debug,
};

use crate::registry::ProbeTool;

/// Reports the probe server's own health.
pub struct HealthCheckTool {
    transport_label: String,
}

impl HealthCheckTool {
    pub fn new(transport_label: &str) -> Self {
        Self {
            transport_label: transport_label.to_string(),
        }
    }
}

#[async_trait]
impl ProbeTool for HealthCheckTool {
    fn name(&self) -> &str {
        "health_check"
    }

    fn description(&self) -> &str {
        "Check that the probe server is up and responding"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value) -> Result<Value> {
        debug!("health check requested");
        Ok(json!({
            "status": "healthy",
            "server": "mcp-probe",
            "version": env!("CARGO_PKG_VERSION"),
            "transport": self.transport_label,
        }))
    }
}

/// Minimal liveness check.
pub struct PingTool;

#[async_trait]
impl ProbeTool for PingTool {
    fn name(&self) -> &str {
        "ping"
    }

    fn description(&self) -> &str {
        "Reply with pong"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value) -> Result<Value> {
        debug!("ping received");
        Ok(json!("pong"))
    }
}

/// Echoes the given message back unchanged.
pub struct EchoTool;

#[async_trait]
impl ProbeTool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo a message back unchanged"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Message to echo"},
            },
            "required": ["message"],
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .context("echo requires a 'message' string argument")?;
        debug!(message = %message, "echo tool called");
        Ok(json!(message))
    }
}

/// Adds two integers.
pub struct AddTool;

#[async_trait]
impl ProbeTool for AddTool {
    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Add two integers"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer", "description": "First addend"},
                "b": {"type": "integer", "description": "Second addend"},
            },
            "required": ["a", "b"],
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let a = params
            .get("a")
            .and_then(Value::as_i64)
            .context("add requires an integer argument 'a'")?;
        let b = params
            .get("b")
            .and_then(Value::as_i64)
            .context("add requires an integer argument 'b'")?;
        debug!(a, b, "add tool called");
        Ok(json!(a + b))
    }
}
