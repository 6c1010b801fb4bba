use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while dispatching a tool call from the agent loop
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Terminal errors of a wrapper invocation, one per stage.
///
/// `Authentication` carries no detail: whatever the identity broker said
/// is logged, never handed back to the caller.
#[derive(Error, Debug)]
pub enum WrapperError {
    #[error("authentication failed")]
    Authentication,

    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("streaming error: {0}")]
    Streaming(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<crate::gateway::GatewayError> for WrapperError {
    fn from(err: crate::gateway::GatewayError) -> Self {
        WrapperError::Transport(err.to_string())
    }
}

pub type WrapperResult<T> = Result<T, WrapperError>;
