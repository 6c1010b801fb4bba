//! Client side of the MCP tool gateway.
//!
//! The gateway fronts the Slack workspace API and exposes it as MCP tools over streamable
//! HTTP. This module opens the authenticated session, pages through `tools/list` and
//! dispatches `tools/call`.
pub mod protocol;
pub mod tools;
pub mod transport;

pub use protocol::{CallToolResult, ListToolsResult};
pub use tools::{list_tools, GatewaySystem};
pub use transport::StreamableHttpTransport;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::tool::ToolCall;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned HTTP {0}")]
    Status(u16),

    #[error("gateway rejected the bearer token")]
    Unauthorized,

    #[error("gateway error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed gateway response: {0}")]
    Protocol(String),

    #[error("gateway repeated pagination cursor {0:?}")]
    CursorLoop(String),

    #[error("gateway session already closed")]
    Closed,
}

/// An open, authenticated session with the tool gateway
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Fetch one page of tool descriptors, starting after `cursor`
    async fn list_tools_page(&self, cursor: Option<&str>) -> Result<ListToolsResult, GatewayError>;

    /// Invoke a tool by name
    async fn call_tool(&self, call: &ToolCall) -> Result<CallToolResult, GatewayError>;

    /// Release the session. Further calls fail with [`GatewayError::Closed`].
    async fn close(&self) -> Result<(), GatewayError>;
}
