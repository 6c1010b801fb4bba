use anyhow::{anyhow, Result};
use futures::stream::BoxStream;
use serde::Serialize;
use std::collections::HashMap;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::event::StreamEvent;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::{Tool, ToolCall};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::systems::System;

/// Upper bound on model/tool round trips within one reply
pub const MAX_TOOL_ROUNDS: usize = 16;

#[derive(Clone, Debug, Serialize)]
struct ToolInfo {
    name: String,
    description: String,
}

/// Agent integrates a foundational LLM with the systems it needs to pilot
pub struct Agent {
    systems: Vec<Box<dyn System>>,
    provider: Box<dyn Provider>,
    max_rounds: usize,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            systems: Vec::new(),
            provider,
            max_rounds: MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    /// All tools bound to the agent, in system then listing order
    pub fn tools(&self) -> Vec<Tool> {
        self.systems
            .iter()
            .flat_map(|system| system.tools().iter().cloned())
            .collect()
    }

    fn get_system_for_tool(&self, name: &str) -> Option<&dyn System> {
        self.systems
            .iter()
            .find(|sys| sys.tools().iter().any(|t| t.name == name))
            .map(|v| &**v)
    }

    /// Dispatch a single tool call to the system that advertised it
    async fn dispatch_tool_call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let system = self
            .get_system_for_tool(&tool_call.name)
            .ok_or_else(|| AgentError::ToolNotFound(tool_call.name.clone()))?;

        tracing::info!(tool = %tool_call.name, system = %system.name(), "dispatching tool call");
        system.call(tool_call).await
    }

    fn get_system_prompt(&self) -> AgentResult<String> {
        let tools: Vec<ToolInfo> = self
            .tools()
            .into_iter()
            .map(|tool| ToolInfo {
                name: tool.name,
                description: tool.description,
            })
            .collect();
        let mut context = HashMap::new();
        context.insert("tools", tools);
        load_prompt_file("system.md", &context).map_err(|e| AgentError::Internal(e.to_string()))
    }

    /// Stream the agent's reply to one user message.
    ///
    /// Each round asks the provider for the next assistant message, emits its text and
    /// tool-use blocks, runs the requested tools and emits their results. The reply ends
    /// with a `Final` event once the model stops asking for tools.
    pub fn reply(&self, user_message: &str) -> BoxStream<'_, Result<StreamEvent>> {
        let user_message = user_message.to_string();

        Box::pin(async_stream::try_stream! {
            let system_prompt = self.get_system_prompt()?;
            let tools = self.tools();
            let mut messages = vec![Message::user().with_text(user_message)];
            let mut rounds = 0;

            loop {
                if rounds == self.max_rounds {
                    Err::<(), _>(anyhow!("agent exceeded {} tool rounds", self.max_rounds))?;
                }
                rounds += 1;

                let (response, usage) = self.provider.complete(
                    &system_prompt,
                    &messages,
                    &tools,
                ).await?;
                tracing::debug!(round = rounds, total_tokens = ?usage.total_tokens, "model responded");

                for content in &response.content {
                    if let Some(text) = content.as_text() {
                        yield StreamEvent::text(text);
                    } else if let Some(request) = content.as_tool_request() {
                        yield StreamEvent::ToolUse {
                            id: request.id.clone(),
                            name: request.tool_call.name.clone(),
                            input: request.tool_call.arguments.clone(),
                        };
                    }
                }

                let tool_requests: Vec<&ToolRequest> = response.tool_requests();
                if tool_requests.is_empty() {
                    yield StreamEvent::Final { text: response.text() };
                    break;
                }

                // Dispatch in parallel but wait until all are finished
                let futures: Vec<_> = tool_requests
                    .iter()
                    .map(|request| self.dispatch_tool_call(request.tool_call.clone()))
                    .collect();
                let outputs = futures::future::join_all(futures).await;

                let mut message_tool_response = Message::user();
                for (request, output) in tool_requests.iter().zip(outputs.into_iter()) {
                    let (content, is_error) = match &output {
                        Ok(content) => (content.clone(), false),
                        Err(e) => (vec![Content::text(e.to_string())], true),
                    };
                    yield StreamEvent::ToolResult {
                        id: request.id.clone(),
                        content,
                        is_error,
                    };
                    message_tool_response =
                        message_tool_response.with_tool_response(request.id.clone(), output);
                }

                messages.push(response.clone());
                messages.push(message_tool_response);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use serde_json::json;

    // Mock system for testing
    struct MockSystem {
        tools: Vec<Tool>,
    }

    impl MockSystem {
        fn new() -> Self {
            Self {
                tools: vec![Tool::new(
                    "echo",
                    "Echoes back the input",
                    json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]}),
                )],
            }
        }
    }

    #[async_trait]
    impl System for MockSystem {
        fn name(&self) -> &str {
            "test"
        }

        fn description(&self) -> &str {
            "A mock system for testing"
        }

        fn tools(&self) -> &[Tool] {
            &self.tools
        }

        async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
            match tool_call.name.as_str() {
                "echo" => Ok(vec![Content::text(
                    tool_call.arguments["message"].as_str().unwrap_or(""),
                )]),
                _ => Err(AgentError::ToolNotFound(tool_call.name)),
            }
        }
    }

    async fn collect(agent: &Agent, prompt: &str) -> Result<Vec<StreamEvent>> {
        agent.reply(prompt).try_collect().await
    }

    #[tokio::test]
    async fn test_simple_response() -> Result<()> {
        let provider = MockProvider::new(vec![Message::assistant().with_text("Hello!")]);
        let agent = Agent::new(Box::new(provider));

        let events = collect(&agent, "Hi").await?;

        assert_eq!(
            events,
            vec![
                StreamEvent::text("Hello!"),
                StreamEvent::Final {
                    text: "Hello!".to_string()
                }
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_call() -> Result<()> {
        let mut agent = Agent::new(Box::new(MockProvider::new(vec![
            Message::assistant()
                .with_tool_request("1", ToolCall::new("echo", json!({"message": "test"}))),
            Message::assistant().with_text("Done!"),
        ])));
        agent.add_system(Box::new(MockSystem::new()));

        let events = collect(&agent, "Echo test").await?;

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], StreamEvent::ToolUse { name, .. } if name == "echo"));
        assert_eq!(
            events[1],
            StreamEvent::ToolResult {
                id: "1".to_string(),
                content: vec![Content::text("test")],
                is_error: false,
            }
        );
        assert_eq!(events[2], StreamEvent::text("Done!"));
        assert!(matches!(&events[3], StreamEvent::Final { text } if text == "Done!"));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_tool() -> Result<()> {
        let mut agent = Agent::new(Box::new(MockProvider::new(vec![
            Message::assistant().with_tool_request("1", ToolCall::new("invalid_tool", json!({}))),
            Message::assistant().with_text("Error occurred"),
        ])));
        agent.add_system(Box::new(MockSystem::new()));

        let events = collect(&agent, "Invalid tool").await?;

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[1], StreamEvent::ToolResult { is_error: true, .. }));
        assert_eq!(events[2], StreamEvent::text("Error occurred"));
        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_tool_calls_keep_request_order() -> Result<()> {
        let mut agent = Agent::new(Box::new(MockProvider::new(vec![
            Message::assistant()
                .with_tool_request("1", ToolCall::new("echo", json!({"message": "first"})))
                .with_tool_request("2", ToolCall::new("echo", json!({"message": "second"}))),
            Message::assistant().with_text("All done!"),
        ])));
        agent.add_system(Box::new(MockSystem::new()));

        let events = collect(&agent, "Multiple calls").await?;

        let result_ids: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolResult { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(result_ids, ["1", "2"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_round_limit() {
        let looping: Vec<Message> = (0..3)
            .map(|i| {
                Message::assistant()
                    .with_tool_request(i.to_string(), ToolCall::new("echo", json!({"message": "x"})))
            })
            .collect();
        let mut agent = Agent::new(Box::new(MockProvider::new(looping))).with_max_rounds(2);
        agent.add_system(Box::new(MockSystem::new()));

        let err = collect(&agent, "loop").await.unwrap_err();
        assert!(err.to_string().contains("exceeded 2 tool rounds"));
    }

    #[tokio::test]
    async fn test_provider_failure_ends_stream_with_error() {
        let agent = Agent::new(Box::new(MockProvider::with_results(vec![Err(
            "model unavailable".to_string(),
        )])));

        let err = collect(&agent, "hi").await.unwrap_err();
        assert_eq!(err.to_string(), "model unavailable");
    }

    #[test]
    fn test_system_prompt_includes_bound_tools() {
        let mut agent = Agent::new(Box::new(MockProvider::new(vec![])));
        agent.add_system(Box::new(MockSystem::new()));

        let prompt = agent.get_system_prompt().unwrap();
        assert!(prompt.contains("- echo: Echoes back the input"));
    }
}
