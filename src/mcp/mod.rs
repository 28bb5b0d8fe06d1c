//! Client side of the Model Context Protocol over streamable HTTP.
//!
//! - [`McpSession`] - initialized session: tool listing, tool calls, close
//! - [`StreamableHttpTransport`] - JSON-RPC over HTTP POST with JSON or SSE replies
//! - [`protocol`] - JSON-RPC and MCP message types

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::McpSession;
pub use protocol::{CallToolResult, McpContent, McpToolDefinition};
pub use transport::StreamableHttpTransport;
