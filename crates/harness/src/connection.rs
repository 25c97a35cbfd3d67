//! Single-connection lifecycle owner.
//!
//! The manager holds at most one active connection to a target MCP server.
//! Connect and disconnect are serialized behind an async mutex; status reads
//! and counter updates go through a plain snapshot slot so they never wait
//! on an in-flight connect. Liveness is checked lazily: a dead transport is
//! only noticed (and the slot cleared) when the next operation asks for the
//! connection.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
    tracing::{debug, info, warn},
};

use mcp_probe_client::{McpClient, McpClientTrait};

/// Default bound on the connect handshake, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Environment variable overriding the connect timeout (seconds).
pub const CONNECT_TIMEOUT_ENV: &str = "MCP_PROBE_CONNECT_TIMEOUT";

// ── Errors ──────────────────────────────────────────────────────────

/// Failures surfaced by the connection manager.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("Failed to connect to {url}: {reason}")]
    Handshake { url: String, reason: String },

    #[error("Not connected to any MCP server. Use connect() first.")]
    NotConnected,

    #[error("Connection to MCP server was lost. Please reconnect.")]
    ConnectionLost,

    #[error("Server URL must not be empty")]
    EmptyUrl,
}

// ── Transport inference ─────────────────────────────────────────────

/// Transport protocol used to reach a target server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransportKind {
    #[serde(rename = "stdio")]
    Stdio,
    #[serde(rename = "sse")]
    Sse,
    #[serde(rename = "streamable-http")]
    StreamableHttp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::StreamableHttp => "streamable-http",
        }
    }

    /// True for transports that carry HTTP headers.
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Sse | Self::StreamableHttp)
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Infer the transport from the shape of the identifier: http(s) URLs use
/// streamable HTTP unless they end in `/sse`, anything else is treated as
/// a local command run over stdio.
pub fn infer_transport(identifier: &str) -> TransportKind {
    let lower = identifier.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        if lower.ends_with("/sse") {
            TransportKind::Sse
        } else {
            TransportKind::StreamableHttp
        }
    } else {
        TransportKind::Stdio
    }
}

// ── Connection state ────────────────────────────────────────────────

/// Capability presence flags captured from the initialize handshake.
#[derive(Debug, Clone, Serialize)]
pub struct PeerCapabilities {
    pub tools: bool,
    pub resources: bool,
    pub prompts: bool,
}

/// Best-effort peer metadata captured at connect time.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<PeerCapabilities>,
}

/// The four fixed usage counters of a connection.
///
/// Counters are atomics so handlers can bump them without any lock and
/// status reads stay wait-free.
#[derive(Debug, Default)]
pub struct Statistics {
    tools_called: AtomicU64,
    resources_accessed: AtomicU64,
    prompts_executed: AtomicU64,
    errors: AtomicU64,
}

impl Statistics {
    /// Increment the named counter. Unknown names are ignored.
    pub fn increment(&self, name: &str) -> bool {
        let counter = match name {
            "tools_called" => &self.tools_called,
            "resources_accessed" => &self.resources_accessed,
            "prompts_executed" => &self.prompts_executed,
            "errors" => &self.errors,
            _ => return false,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tools_called: self.tools_called.load(Ordering::Relaxed),
            resources_accessed: self.resources_accessed.load(Ordering::Relaxed),
            prompts_executed: self.prompts_executed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the usage counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSnapshot {
    pub tools_called: u64,
    pub resources_accessed: u64,
    pub prompts_executed: u64,
    pub errors: u64,
}

/// Live state of the active connection.
#[derive(Debug)]
pub struct ConnectionState {
    pub server_url: String,
    pub transport: TransportKind,
    pub connected_at: DateTime<Utc>,
    pub server_info: Option<PeerInfo>,
    pub statistics: Statistics,
    pub headers_provided: bool,
}

/// Serializable snapshot of [`ConnectionState`].
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub server_url: String,
    pub transport: TransportKind,
    pub connected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<PeerInfo>,
    pub statistics: StatsSnapshot,
    pub headers_provided: bool,
}

impl ConnectionState {
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            server_url: self.server_url.clone(),
            transport: self.transport,
            connected_at: self.connected_at,
            server_info: self.server_info.clone(),
            statistics: self.statistics.snapshot(),
            headers_provided: self.headers_provided,
        }
    }
}

/// An established connection: the client handle plus its tracked state.
pub struct ActiveConnection {
    pub client: Arc<dyn McpClientTrait>,
    pub state: ConnectionState,
}

impl ActiveConnection {
    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }
}

impl std::fmt::Debug for ActiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveConnection")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// ── Manager ─────────────────────────────────────────────────────────

/// Owns the single active connection to a target MCP server.
///
/// There is no global instance: the manager is constructed once at startup
/// and handed to every tool that needs it.
pub struct ConnectionManager {
    connect_timeout: Duration,
    /// Serializes connect/disconnect. Never held across status reads.
    lifecycle: tokio::sync::Mutex<()>,
    /// Snapshot slot for the active connection, readable without awaiting.
    active: Mutex<Option<Arc<ActiveConnection>>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
    }
}

impl ConnectionManager {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            lifecycle: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    /// Build a manager with the timeout taken from `MCP_PROBE_CONNECT_TIMEOUT`
    /// (seconds). Unset or unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let secs = std::env::var(CONNECT_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        Self::new(Duration::from_secs(secs))
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<ActiveConnection>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect to a target server, replacing any existing connection.
    ///
    /// Headers are honored only for stream transports; for stdio they are
    /// ignored with a debug log. On failure the slot is left empty.
    pub async fn connect(
        &self,
        url: &str,
        headers: Option<HashMap<String, String>>,
    ) -> Result<StateSnapshot, ConnectionError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ConnectionError::EmptyUrl);
        }

        let _guard = self.lifecycle.lock().await;

        // Tear down any existing connection first; teardown errors are
        // swallowed so a broken old connection cannot block a new one.
        let existing = self.slot().take();
        if let Some(existing) = existing {
            info!(url = %existing.state.server_url, "closing existing connection before reconnect");
            existing.client.shutdown().await;
        }

        let kind = infer_transport(url);
        let headers = headers.filter(|h| !h.is_empty());
        let timeout_secs = self.connect_timeout.as_secs();

        info!(url = %url, transport = %kind, timeout_secs, "connecting to MCP server");

        let headers_provided = headers.is_some() && kind.is_stream();
        if headers.is_some() && !kind.is_stream() {
            debug!(url = %url, "headers ignored for stdio transport");
        }

        let connect = async {
            match kind {
                TransportKind::Stdio => McpClient::connect_stdio(url, self.connect_timeout).await,
                TransportKind::Sse | TransportKind::StreamableHttp => {
                    McpClient::connect_http(url, headers.as_ref(), self.connect_timeout).await
                },
            }
        };

        let client = match tokio::time::timeout(self.connect_timeout, connect).await {
            Err(_) => {
                warn!(url = %url, timeout_secs, "connect timed out");
                return Err(ConnectionError::Timeout {
                    url: url.into(),
                    seconds: timeout_secs,
                });
            },
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "connect failed");
                return Err(ConnectionError::Handshake {
                    url: url.into(),
                    reason: e.to_string(),
                });
            },
            Ok(Ok(client)) => client,
        };

        Ok(self.install(Arc::new(client), kind, headers_provided))
    }

    /// Store an already-connected client as the active connection.
    ///
    /// This is the tail of `connect`; it is public so tests and embedders
    /// can inject a client without a real transport.
    pub fn install(
        &self,
        client: Arc<dyn McpClientTrait>,
        transport: TransportKind,
        headers_provided: bool,
    ) -> StateSnapshot {
        // Peer metadata is best-effort: absent info never fails the install.
        let server_info = client.server_info().map(|init| PeerInfo {
            name: Some(init.server_info.name.clone()),
            version: init.server_info.version.clone(),
            capabilities: Some(PeerCapabilities {
                tools: init.capabilities.tools.is_some(),
                resources: init.capabilities.resources.is_some(),
                prompts: init.capabilities.prompts.is_some(),
            }),
        });

        let state = ConnectionState {
            server_url: client.server_url().to_string(),
            transport,
            connected_at: Utc::now(),
            server_info,
            statistics: Statistics::default(),
            headers_provided,
        };

        info!(
            url = %state.server_url,
            transport = %state.transport,
            "connected to MCP server"
        );

        let active = Arc::new(ActiveConnection { client, state });
        let snapshot = active.snapshot();
        *self.slot() = Some(active);
        snapshot
    }

    /// Close the active connection, if any. Idempotent; returns the final
    /// snapshot of the connection that was closed.
    pub async fn disconnect(&self) -> Option<StateSnapshot> {
        let _guard = self.lifecycle.lock().await;

        let existing = self.slot().take()?;
        let snapshot = existing.snapshot();
        info!(url = %snapshot.server_url, "disconnecting from MCP server");
        // Teardown errors are swallowed.
        existing.client.shutdown().await;
        Some(snapshot)
    }

    /// Non-blocking snapshot of the current connection state.
    pub fn status(&self) -> Option<StateSnapshot> {
        self.slot().as_ref().map(|active| active.snapshot())
    }

    /// Return the active connection for exactly one remote operation.
    ///
    /// Probes transport liveness first; a dead transport clears the slot
    /// and surfaces as `ConnectionLost`. The slot is cleared without the
    /// lifecycle mutex, so a concurrent connect may race the clear; the
    /// compare below keeps a freshly installed connection from being
    /// evicted by a stale death observation.
    pub async fn require_connection(&self) -> Result<Arc<ActiveConnection>, ConnectionError> {
        let active = self
            .slot()
            .clone()
            .ok_or(ConnectionError::NotConnected)?;

        if !active.client.is_alive().await {
            warn!(url = %active.state.server_url, "connection to MCP server lost");
            let mut slot = self.slot();
            if slot
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &active))
            {
                *slot = None;
            }
            return Err(ConnectionError::ConnectionLost);
        }

        Ok(active)
    }

    /// Increment a usage counter on the active connection. A missing
    /// connection or an unknown counter name is a silent no-op.
    pub fn increment_stat(&self, name: &str) {
        let active = self.slot().clone();
        if let Some(active) = active {
            if !active.state.statistics.increment(name) {
                debug!(stat = %name, "ignoring unknown statistic");
            }
        }
    }
}
