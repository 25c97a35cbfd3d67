//! Streamable HTTP transport: `POST /mcp` with `Mcp-Session-Id` tracking,
//! plus a legacy `POST /sse` route serving the same dispatch.

use std::sync::Arc;

use {
    anyhow::{Context, Result},
    axum::{
        Router,
        extract::State,
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Response},
        routing::post,
    },
    serde_json::Value,
    tracing::{debug, info},
    uuid::Uuid,
};

use crate::server::McpServer;

const SESSION_HEADER: &str = "mcp-session-id";

/// Build the HTTP router for the probe server.
pub fn router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/mcp", post(handle_post))
        .route("/sse", post(handle_post))
        .with_state(server)
}

/// Bind and serve until the process is stopped.
pub async fn serve(server: Arc<McpServer>, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "serving MCP over streamable HTTP");
    axum::serve(listener, router(server)).await?;
    Ok(())
}

async fn handle_post(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Some(session) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        debug!(session = %session, "request carries session id");
    }

    let method = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|m| m.get("method").and_then(Value::as_str).map(str::to_string));

    match server.handle_message(&body).await {
        // Notifications are acknowledged without a body.
        None => StatusCode::ACCEPTED.into_response(),
        Some(response) => {
            let mut http_response = axum::Json(response).into_response();
            // A new session id is issued on initialize; clients echo it back
            // on subsequent requests.
            if method.as_deref() == Some("initialize") {
                let session = Uuid::new_v4().to_string();
                if let Ok(value) = HeaderValue::from_str(&session) {
                    http_response.headers_mut().insert(SESSION_HEADER, value);
                }
                info!(session = %session, "MCP session initialized");
            }
            http_response
        },
    }
}
