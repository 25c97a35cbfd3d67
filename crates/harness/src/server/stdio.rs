//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! Logging must stay on stderr: stdout carries nothing but protocol frames.

use std::sync::Arc;

use {
    anyhow::Result,
    tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    tracing::info,
};

use crate::server::McpServer;

/// Serve MCP on stdin/stdout until stdin closes.
pub async fn serve(server: Arc<McpServer>) -> Result<()> {
    info!("serving MCP over stdio");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(response) = server.handle_message(line).await {
            let mut payload = serde_json::to_string(&response)?;
            payload.push('\n');
            stdout.write_all(payload.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}
