use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use super::{GatewayError, ToolGateway};
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::systems::System;

/// Collect every tool the gateway advertises, following cursors until none is returned.
///
/// Each call starts again from the first page. Tools are kept in page order and are not
/// deduplicated. A cursor seen twice in one pass is an error rather than a loop.
pub async fn list_tools(gateway: &dyn ToolGateway) -> Result<Vec<Tool>, GatewayError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;
    let mut seen = HashSet::new();

    loop {
        let page = gateway.list_tools_page(cursor.as_deref()).await?;
        tracing::debug!(
            page_size = page.tools.len(),
            next_cursor = ?page.next_cursor,
            "received tools page"
        );
        tools.extend(page.tools);

        match page.next_cursor {
            Some(next) if !next.is_empty() => {
                if !seen.insert(next.clone()) {
                    return Err(GatewayError::CursorLoop(next));
                }
                cursor = Some(next);
            }
            _ => break,
        }
    }

    Ok(tools)
}

/// The gateway's tools exposed to the agent as one system
#[derive(Clone)]
pub struct GatewaySystem {
    gateway: Arc<dyn ToolGateway>,
    tools: Vec<Tool>,
}

impl GatewaySystem {
    pub fn new(gateway: Arc<dyn ToolGateway>, tools: Vec<Tool>) -> Self {
        Self { gateway, tools }
    }
}

#[async_trait]
impl System for GatewaySystem {
    fn name(&self) -> &str {
        "gateway"
    }

    fn description(&self) -> &str {
        "Slack workspace operations provided by the MCP tool gateway"
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        if !self.tools.iter().any(|t| t.name == tool_call.name) {
            return Err(AgentError::ToolNotFound(tool_call.name));
        }

        let result = self
            .gateway
            .call_tool(&tool_call)
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

        if result.is_error {
            let detail: Vec<String> = result.content.iter().map(Content::summary).collect();
            return Err(AgentError::ExecutionError(detail.join("\n")));
        }
        Ok(result.content)
    }
}
