//! MCP (Model Context Protocol) client support for mcp-probe.
//!
//! This crate provides:
//! - JSON-RPC 2.0 and MCP protocol types (`types`)
//! - Stdio transport spawning a local server process (`transport`)
//! - Streamable HTTP / legacy SSE transport with opaque header passthrough
//!   (`http_transport`)
//! - MCP client for the protocol handshake and tool/resource/prompt
//!   interactions (`client`)

pub mod client;
pub mod error;
pub mod http_transport;
pub mod traits;
pub mod transport;
pub mod types;

pub use {
    client::McpClient,
    error::{Error, Result},
    http_transport::HttpTransport,
    traits::{McpClientTrait, McpTransport},
    transport::StdioTransport,
    types::{
        InitializeResult, McpPromptArgument, McpPromptDef, McpResourceDef, McpToolDef,
        PromptMessage, PromptsGetResult, ResourceContents, ResourcesReadResult, ServerCapabilities,
        ServerInfo, ToolContent, ToolsCallResult,
    },
};
