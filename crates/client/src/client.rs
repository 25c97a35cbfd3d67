//! MCP client: performs the protocol handshake against a single server and
//! exposes one method per remote operation.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    error::{Context, Result},
    http_transport::HttpTransport,
    traits::{McpClientTrait, McpTransport},
    transport::StdioTransport,
    types::{
        ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, McpPromptDef,
        McpResourceDef, McpToolDef, PROTOCOL_VERSION, PromptsGetParams, PromptsGetResult,
        PromptsListResult, ResourcesListResult, ResourcesReadParams, ResourcesReadResult,
        ToolsCallParams, ToolsCallResult, ToolsListResult,
    },
};

/// An MCP client connected to a single server.
///
/// A constructed client has always completed the initialize handshake;
/// callers only need to watch for the transport dying underneath it.
pub struct McpClient {
    server_url: String,
    transport: Arc<dyn McpTransport>,
    server_info: Option<InitializeResult>,
}

impl McpClient {
    /// Spawn a local server process and perform the MCP handshake
    /// (initialize + initialized). The command line is split on whitespace:
    /// first token is the program, the rest are arguments.
    pub async fn connect_stdio(command: &str, request_timeout: Duration) -> Result<Self> {
        info!(command = %command, "connecting to MCP server over stdio");
        let mut parts = command.split_whitespace();
        let program = parts.next().context("empty stdio command")?;
        let args: Vec<String> = parts.map(str::to_string).collect();
        let transport = StdioTransport::spawn(program, &args, request_timeout).await?;
        Self::handshake(command, transport).await
    }

    /// Connect to a remote MCP server over streamable HTTP (or a legacy SSE
    /// endpoint). Headers, when given, are attached to every request.
    pub async fn connect_http(
        url: &str,
        headers: Option<&HashMap<String, String>>,
        request_timeout: Duration,
    ) -> Result<Self> {
        info!(url = %url, "connecting to MCP server over HTTP");
        let transport = HttpTransport::new(url, headers, request_timeout)?;
        Self::handshake(url, transport).await
    }

    async fn handshake(server_url: &str, transport: Arc<dyn McpTransport>) -> Result<Self> {
        let mut client = Self {
            server_url: server_url.into(),
            transport,
            server_info: None,
        };

        if let Err(e) = client.initialize().await {
            warn!(url = %server_url, error = %e, "MCP initialize handshake failed");
            client.transport.kill().await;
            return Err(e);
        }
        Ok(client)
    }

    async fn initialize(&mut self) -> Result<()> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: "mcp-probe".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };

        let resp = self
            .transport
            .request("initialize", Some(serde_json::to_value(&params)?))
            .await
            .context("MCP initialize request failed")?;

        // Peer metadata capture is best-effort: a nonconforming initialize
        // result leaves server_info absent but never fails the connect.
        match resp.result {
            Some(value) => match serde_json::from_value::<InitializeResult>(value) {
                Ok(result) => {
                    info!(
                        url = %self.server_url,
                        protocol = %result.protocol_version,
                        server_name = %result.server_info.name,
                        "MCP server initialized"
                    );
                    self.server_info = Some(result);
                },
                Err(e) => {
                    debug!(url = %self.server_url, error = %e, "unparseable initialize result, continuing without peer info");
                },
            },
            None => {
                debug!(url = %self.server_url, "initialize returned no result");
            },
        }

        // Send `initialized` notification to complete the handshake.
        self.transport
            .notify("notifications/initialized", None)
            .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl McpClientTrait for McpClient {
    fn server_url(&self) -> &str {
        &self.server_url
    }

    fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        let resp = self.transport.request("tools/list", None).await?;
        let result: ToolsListResult =
            serde_json::from_value(resp.result.context("tools/list returned no result")?)?;

        debug!(url = %self.server_url, count = result.tools.len(), "fetched MCP tools");
        Ok(result.tools)
    }

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<ToolsCallResult> {
        let params = ToolsCallParams {
            name: name.into(),
            arguments,
        };

        let resp = self
            .transport
            .request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;

        let result: ToolsCallResult =
            serde_json::from_value(resp.result.context("tools/call returned no result")?)?;

        Ok(result)
    }

    async fn list_resources(&self) -> Result<Vec<McpResourceDef>> {
        let resp = self.transport.request("resources/list", None).await?;
        let result: ResourcesListResult =
            serde_json::from_value(resp.result.context("resources/list returned no result")?)?;

        debug!(url = %self.server_url, count = result.resources.len(), "fetched MCP resources");
        Ok(result.resources)
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourcesReadResult> {
        let params = ResourcesReadParams { uri: uri.into() };

        let resp = self
            .transport
            .request("resources/read", Some(serde_json::to_value(&params)?))
            .await?;

        let result: ResourcesReadResult =
            serde_json::from_value(resp.result.context("resources/read returned no result")?)?;

        Ok(result)
    }

    async fn list_prompts(&self) -> Result<Vec<McpPromptDef>> {
        let resp = self.transport.request("prompts/list", None).await?;
        let result: PromptsListResult =
            serde_json::from_value(resp.result.context("prompts/list returned no result")?)?;

        debug!(url = %self.server_url, count = result.prompts.len(), "fetched MCP prompts");
        Ok(result.prompts)
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<PromptsGetResult> {
        let params = PromptsGetParams {
            name: name.into(),
            arguments,
        };

        let resp = self
            .transport
            .request("prompts/get", Some(serde_json::to_value(&params)?))
            .await?;

        let result: PromptsGetResult =
            serde_json::from_value(resp.result.context("prompts/get returned no result")?)?;

        Ok(result)
    }

    async fn is_alive(&self) -> bool {
        self.transport.is_alive().await
    }

    async fn shutdown(&self) {
        self.transport.kill().await;
    }
}
