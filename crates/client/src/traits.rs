//! Trait abstractions for the MCP transport and client layers.
//!
//! `McpTransport` decouples JSON-RPC framing from the channel carrying it
//! (child-process stdio vs streamable HTTP). `McpClientTrait` lets the
//! harness hold a connection as a trait object, which also makes the
//! connection manager testable with a stub client.

use {async_trait::async_trait, serde_json::Value};

use crate::{
    error::Result,
    types::{
        InitializeResult, JsonRpcResponse, McpPromptDef, McpResourceDef, McpToolDef,
        PromptsGetResult, ResourcesReadResult, ToolsCallResult,
    },
};

/// Transport layer for MCP communication (JSON-RPC).
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and wait for the response.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse>;

    /// Send a JSON-RPC notification (no response expected).
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    /// Check if the underlying connection/process is still alive.
    async fn is_alive(&self) -> bool;

    /// Kill/close the underlying connection/process.
    async fn kill(&self);
}

/// Client-level abstraction for a single MCP server connection.
///
/// A connected client has already completed the initialize handshake;
/// every method here performs exactly one remote call.
#[async_trait]
pub trait McpClientTrait: Send + Sync {
    /// Identifier (URL or path) this client was connected to.
    fn server_url(&self) -> &str;

    /// Initialize result captured during the handshake, when available.
    fn server_info(&self) -> Option<&InitializeResult>;

    /// Fetch the list of tools from the server.
    async fn list_tools(&self) -> Result<Vec<McpToolDef>>;

    /// Call a tool on the server.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResult>;

    /// Fetch the list of resources from the server.
    async fn list_resources(&self) -> Result<Vec<McpResourceDef>>;

    /// Read a resource by URI.
    async fn read_resource(&self, uri: &str) -> Result<ResourcesReadResult>;

    /// Fetch the list of prompts from the server.
    async fn list_prompts(&self) -> Result<Vec<McpPromptDef>>;

    /// Retrieve a rendered prompt by name.
    async fn get_prompt(&self, name: &str, arguments: Option<Value>) -> Result<PromptsGetResult>;

    /// Check if the server process/connection is still alive.
    async fn is_alive(&self) -> bool;

    /// Shut down the server connection.
    async fn shutdown(&self);
}
