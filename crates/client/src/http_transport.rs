//! HTTP transport for remote MCP servers (streamable HTTP, plus legacy SSE
//! endpoints).
//!
//! JSON-RPC requests go out as HTTP POST; responses arrive either as plain
//! JSON or as a short-lived `text/event-stream` body. Caller-supplied
//! headers are attached verbatim to every request — they are opaque to this
//! transport and never logged.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    reqwest::{
        Client,
        header::{HeaderMap, HeaderName, HeaderValue},
    },
    tokio::sync::RwLock,
    tracing::{debug, warn},
};

use crate::{
    error::{Context, Error, Result},
    traits::McpTransport,
    types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION},
};

const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
const MCP_SESSION_ID_HEADER: &str = "Mcp-Session-Id";
const STREAMABLE_ACCEPT_HEADER: &str = "application/json, text/event-stream";

/// HTTP-based transport for a remote MCP server.
pub struct HttpTransport {
    client: Client,
    url: String,
    next_id: AtomicU64,
    /// Session identifier issued by streamable HTTP servers.
    session_id: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Create a transport pointing at the given MCP server URL.
    ///
    /// `headers`, when present, become default headers on every request.
    pub fn new(
        url: &str,
        headers: Option<&HashMap<String, String>>,
        timeout: Duration,
    ) -> Result<Arc<Self>> {
        let mut builder = Client::builder().timeout(timeout);

        if let Some(headers) = headers {
            builder = builder.default_headers(Self::build_header_map(headers)?);
        }

        let client = builder
            .build()
            .context("failed to build HTTP client for MCP transport")?;

        Ok(Arc::new(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
            session_id: RwLock::new(None),
        }))
    }

    fn build_header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::message(format!("invalid header name '{name}': {e}")))?;
            // Header values are opaque credentials; keep them out of errors.
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::message(format!("invalid value for header '{name}'")))?;
            map.insert(name, value);
        }
        Ok(map)
    }

    async fn build_post(&self) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", STREAMABLE_ACCEPT_HEADER)
            .header(MCP_PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION);

        if let Some(session_id) = self.session_id.read().await.clone() {
            req = req.header(MCP_SESSION_ID_HEADER, session_id);
        }

        req
    }

    async fn store_session_id_from_response(&self, response: &reqwest::Response) {
        let Some(raw) = response.headers().get(MCP_SESSION_ID_HEADER) else {
            return;
        };
        let Ok(session_id) = raw.to_str() else {
            return;
        };
        if session_id.trim().is_empty() {
            return;
        }

        let mut slot = self.session_id.write().await;
        let session_id = session_id.to_string();
        if slot.as_ref() != Some(&session_id) {
            debug!(
                url = %self.url,
                session_id = %session_id,
                "updated MCP streamable HTTP session id"
            );
            *slot = Some(session_id);
        }
    }

    fn response_is_event_stream(resp: &reqwest::Response) -> bool {
        resp.headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| {
                ct.split(';')
                    .next()
                    .is_some_and(|base| base.trim() == "text/event-stream")
            })
            .unwrap_or(false)
    }

    fn parse_event_stream_response(body: &str, method: &str) -> Result<JsonRpcResponse> {
        let mut data = String::new();

        for line in body.lines() {
            let trimmed = line.trim_end();
            if let Some(rest) = trimmed.strip_prefix("data:") {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(rest.trim_start());
                continue;
            }

            if trimmed.is_empty() && !data.is_empty() {
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&data) {
                    return Ok(resp);
                }
                data.clear();
            }
        }

        if !data.is_empty()
            && let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&data)
        {
            return Ok(resp);
        }

        Err(Error::message(format!(
            "failed to parse JSON-RPC response from event stream for '{method}'"
        )))
    }

    async fn post(&self, method: &str, body: &impl serde::Serialize) -> Result<reqwest::Response> {
        let req = self.build_post().await;
        let http_resp = req
            .json(body)
            .send()
            .await
            .with_context(|| format!("HTTP POST to '{}' for '{method}' failed", self.url))?;

        self.store_session_id_from_response(&http_resp).await;
        Ok(http_resp)
    }
}

#[async_trait::async_trait]
impl McpTransport for HttpTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);

        debug!(method = %method, id = %id, url = %self.url, "client -> MCP server");

        let http_resp = self.post(method, &req).await?;

        if !http_resp.status().is_success() {
            let status = http_resp.status();
            let body = http_resp.text().await.unwrap_or_default();
            return Err(Error::message(format!(
                "MCP server returned HTTP {status} for '{method}': {body}"
            )));
        }

        let resp: JsonRpcResponse = if Self::response_is_event_stream(&http_resp) {
            let body = http_resp
                .text()
                .await
                .with_context(|| format!("failed to read event stream response for '{method}'"))?;
            Self::parse_event_stream_response(&body, method)?
        } else {
            http_resp
                .json()
                .await
                .with_context(|| format!("failed to parse JSON-RPC response for '{method}'"))?
        };

        if let Some(ref err) = resp.error {
            return Err(Error::message(format!(
                "MCP error on '{method}': code={} message={}",
                err.code, err.message
            )));
        }

        Ok(resp)
    }

    async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<()> {
        let notif = JsonRpcNotification {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
        };

        debug!(method = %method, url = %self.url, "client -> MCP server (notification)");

        let http_resp = self.post(method, &notif).await?;

        if !http_resp.status().is_success() {
            let status = http_resp.status();
            warn!(method = %method, %status, "MCP notification returned non-success");
        }

        Ok(())
    }

    async fn is_alive(&self) -> bool {
        // Lightweight GET to check connectivity and session continuity.
        let mut req = self
            .client
            .get(&self.url)
            .timeout(Duration::from_secs(5))
            .header("Accept", STREAMABLE_ACCEPT_HEADER)
            .header(MCP_PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION);

        if let Some(session_id) = self.session_id.read().await.clone() {
            req = req.header(MCP_SESSION_ID_HEADER, session_id);
        }

        match req.send().await {
            Ok(resp) => {
                self.store_session_id_from_response(&resp).await;
                true
            },
            Err(_) => false,
        }
    }

    async fn kill(&self) {
        let session_id = {
            let mut slot = self.session_id.write().await;
            slot.take()
        };

        let Some(session_id) = session_id else {
            return;
        };

        let req = self
            .client
            .delete(&self.url)
            .timeout(Duration::from_secs(5))
            .header(MCP_PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION)
            .header(MCP_SESSION_ID_HEADER, session_id);

        if let Err(e) = req.send().await {
            warn!(url = %self.url, error = %e, "failed to close MCP streamable HTTP session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_transport_creation() {
        let transport = HttpTransport::new("http://localhost:8080/mcp", None, TIMEOUT);
        assert!(transport.is_ok());
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let mut headers = HashMap::new();
        headers.insert("bad header\n".to_string(), "x".to_string());
        let result = HttpTransport::new("http://localhost:8080/mcp", Some(&headers), TIMEOUT);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_is_alive_unreachable() {
        let transport = HttpTransport::new("http://127.0.0.1:1/mcp", None, TIMEOUT).unwrap();
        assert!(!transport.is_alive().await);
    }

    #[tokio::test]
    async fn test_request_unreachable() {
        let transport = HttpTransport::new("http://127.0.0.1:1/mcp", None, TIMEOUT).unwrap();
        let result = transport.request("test", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_request_plain_json() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), None, TIMEOUT).unwrap();
        let resp = transport.request("test", None).await.unwrap();
        assert!(resp.result.is_some());
    }

    #[tokio::test]
    async fn test_custom_headers_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer token-123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#)
            .create_async()
            .await;

        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer token-123".to_string());

        let transport = HttpTransport::new(&server.url(), Some(&headers), TIMEOUT).unwrap();
        let resp = transport.request("test", None).await.unwrap();
        assert!(resp.result.is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_status_surfaces() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), None, TIMEOUT).unwrap();
        let err = transport.request("test", None).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_jsonrpc_error_surfaces() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#,
            )
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), None, TIMEOUT).unwrap();
        let err = transport.request("nope", None).await.unwrap_err();
        assert!(err.to_string().contains("Method not found"));
    }

    #[tokio::test]
    async fn test_session_id_propagated() {
        let mut server = mockito::Server::new_async().await;

        let first = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("mcp-session-id", "session-123")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#)
            .create_async()
            .await;

        let second = server
            .mock("POST", "/")
            .match_header("mcp-session-id", "session-123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":2,"result":{"ok":true}}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), None, TIMEOUT).unwrap();
        transport.request("initialize", None).await.unwrap();
        transport.request("tools/list", None).await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_parses_event_stream_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(
                "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\n\n",
            )
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), None, TIMEOUT).unwrap();
        let resp = transport.request("initialize", None).await.unwrap();
        assert!(resp.result.is_some());
    }

    #[tokio::test]
    async fn test_kill_sends_delete_with_session_id() {
        let mut server = mockito::Server::new_async().await;
        let init = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("mcp-session-id", "session-to-close")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/")
            .match_header("mcp-session-id", "session-to-close")
            .with_status(204)
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), None, TIMEOUT).unwrap();
        transport.request("initialize", None).await.unwrap();
        transport.kill().await;

        init.assert_async().await;
        delete.assert_async().await;
    }
}
