//! MCP testing harness: runs as an MCP server whose tools act as an MCP
//! client against a target server.
//!
//! - `connection` — the single-connection lifecycle manager
//! - `tools` — the probe tools and their JSON result envelopes
//! - `registry` — the probe tool trait and registry
//! - `server` — JSON-RPC dispatch plus stdio and streamable-HTTP transports

pub mod connection;
pub mod registry;
pub mod server;
pub mod tools;

pub use {
    connection::{ConnectionError, ConnectionManager, TransportKind, infer_transport},
    registry::{ProbeTool, ToolRegistry},
    server::McpServer,
    tools::build_registry,
};
