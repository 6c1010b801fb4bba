//! These models represent the objects passed around by the agent
//!
//! There are several different related formats we need to interact with:
//! - MCP tool descriptors and tool results, exchanged with the gateway
//! - anthropic messages/tools, sent from the agent to the LLM
//! - stream events, relayed from the agent to the runtime caller
//!
//! These overlap to varying degrees. We always immediately convert those data models
//! into the internal structs using to/from helpers.
pub mod content;
pub mod event;
pub mod message;
pub mod role;
pub mod tool;
