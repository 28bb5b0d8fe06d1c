use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{McpConfig, SessionConfig, TransportKind};
use crate::error::McpError;

use super::protocol::{
    CallToolResult, Implementation, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, ListToolsResult, McpToolDefinition, PROTOCOL_VERSION,
};
use super::transport::StreamableHttpTransport;

/// An initialized session with one MCP server.
///
/// Open it once with [`McpSession::open`] and release it with
/// [`McpSession::close`]; the server-side session lives until then.
pub struct McpSession {
    transport: StreamableHttpTransport,
    server_info: Implementation,
    instructions: Option<String>,
    next_id: AtomicU64,
}

impl McpSession {
    /// Connect and run the initialize handshake. Every failure is reported as
    /// [`McpError::Connection`].
    pub async fn open(config: &SessionConfig, settings: &McpConfig) -> Result<Self, McpError> {
        match config.transport {
            TransportKind::StreamableHttp => {}
        }

        let transport = StreamableHttpTransport::new(&config.server_url, &config.bearer_token, settings)
            .map_err(|e| McpError::connection(&config.server_url, e))?;

        let mut session = McpSession {
            transport,
            server_info: Implementation {
                name: String::new(),
                version: String::new(),
            },
            instructions: None,
            next_id: AtomicU64::new(1),
        };

        session
            .initialize(&settings.client_name)
            .await
            .map_err(|e| McpError::connection(&config.server_url, e))?;

        tracing::info!(
            server = %session.server_info.name,
            version = %session.server_info.version,
            url = %config.server_url,
            "connected to MCP server"
        );

        Ok(session)
    }

    async fn initialize(&mut self, client_name: &str) -> Result<(), McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: Implementation {
                name: client_name.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let result = self
            .request("initialize", Some(serde_json::to_value(params)?))
            .await?;
        let result: InitializeResult = serde_json::from_value(result)?;

        if result.protocol_version != PROTOCOL_VERSION {
            tracing::debug!(
                requested = PROTOCOL_VERSION,
                negotiated = %result.protocol_version,
                "server negotiated a different protocol version"
            );
        }
        self.transport.set_protocol_version(&result.protocol_version);
        self.server_info = result.server_info;
        self.instructions = result.instructions;

        self.transport
            .notify(&JsonRpcNotification::new("notifications/initialized", None))
            .await
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.transport
            .request(&JsonRpcRequest::new(id, method, params))
            .await
    }

    pub fn server_info(&self) -> &Implementation {
        &self.server_info
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn session_id(&self) -> Option<String> {
        self.transport.session_id()
    }

    /// All tools the server exposes, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult =
                serde_json::from_value(self.request("tools/list", params).await?)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(count = tools.len(), "listed MCP tools");
        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let result = self
            .request(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Terminate the session on the server.
    pub async fn close(&self) -> Result<(), McpError> {
        tracing::debug!(url = %self.transport.url(), "closing MCP session");
        self.transport.terminate().await
    }
}
