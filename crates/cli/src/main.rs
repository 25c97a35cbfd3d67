//! mcp-probe entry point: parse arguments, wire up the connection manager
//! and tool registry, and serve MCP over the selected transport.

use std::sync::Arc;

use {
    anyhow::Result,
    clap::{Parser, ValueEnum},
    tracing::{info, warn},
    tracing_subscriber::EnvFilter,
};

use mcp_probe_harness::{ConnectionManager, McpServer, build_registry, server};

const DEFAULT_PORT: u16 = 8000;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    StreamableHttp,
    Sse,
}

impl Transport {
    fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::StreamableHttp => "streamable-http",
            Self::Sse => "sse",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mcp-probe", version, about = "MCP testing harness server")]
struct Args {
    /// Transport to serve the probe on
    #[arg(long, value_enum, env = "MCP_PROBE_TRANSPORT", default_value = "stdio")]
    transport: Transport,

    /// Bind host for HTTP transports
    #[arg(long, env = "MCP_PROBE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Bind port for HTTP transports (falls back to MCP_PROBE_PORT, then 8000)
    #[arg(long)]
    port: Option<u16>,

    /// Log level filter, e.g. `info` or `mcp_probe_harness=debug`
    #[arg(long, env = "MCP_PROBE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

/// CLI beats the environment; an unparsable environment value falls back
/// to the default with a warning.
fn resolve_port(cli: Option<u16>, env_value: Option<String>) -> u16 {
    if let Some(port) = cli {
        return port;
    }
    match env_value {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(value = %raw, "invalid MCP_PROBE_PORT, using default");
            DEFAULT_PORT
        }),
        None => DEFAULT_PORT,
    }
}

/// Logs go to stderr so a stdio transport keeps stdout protocol-clean.
fn init_telemetry(log_level: &str, json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before anything reads the environment.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_telemetry(&args.log_level, args.json_logs);

    let port = resolve_port(args.port, std::env::var("MCP_PROBE_PORT").ok());

    let manager = Arc::new(ConnectionManager::from_env());
    let registry = build_registry(&manager, args.transport.as_str());
    let mcp_server = Arc::new(McpServer::new(registry));

    info!(
        transport = args.transport.as_str(),
        version = env!("CARGO_PKG_VERSION"),
        "starting mcp-probe"
    );

    match args.transport {
        Transport::Stdio => server::stdio::serve(mcp_server).await,
        Transport::StreamableHttp | Transport::Sse => {
            server::http::serve(mcp_server, &args.host, port).await
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["mcp-probe"]).unwrap();
        assert_eq!(args.transport, Transport::Stdio);
        assert_eq!(args.host, "127.0.0.1");
        assert!(args.port.is_none());
        assert_eq!(args.log_level, "info");
        assert!(!args.json_logs);
    }

    #[test]
    fn test_transport_values() {
        let args =
            Args::try_parse_from(["mcp-probe", "--transport", "streamable-http"]).unwrap();
        assert_eq!(args.transport, Transport::StreamableHttp);
        assert_eq!(args.transport.as_str(), "streamable-http");

        let args = Args::try_parse_from(["mcp-probe", "--transport", "sse"]).unwrap();
        assert_eq!(args.transport, Transport::Sse);

        assert!(Args::try_parse_from(["mcp-probe", "--transport", "carrier-pigeon"]).is_err());
    }

    #[test]
    fn test_resolve_port_priority() {
        assert_eq!(resolve_port(Some(9100), Some("9200".into())), 9100);
        assert_eq!(resolve_port(None, Some("9200".into())), 9200);
        assert_eq!(resolve_port(None, Some("not-a-port".into())), DEFAULT_PORT);
        assert_eq!(resolve_port(None, None), DEFAULT_PORT);
    }
}
