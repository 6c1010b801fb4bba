use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, Usage};
use super::configs::AnthropicProviderConfig;
use crate::models::content::Content;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = data.get("usage");
        let input_tokens = usage
            .and_then(|u| u.get("input_tokens"))
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);
        let output_tokens = usage
            .and_then(|u| u.get("output_tokens"))
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn tools_to_anthropic_spec(tools: &[Tool]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema,
                })
            })
            .collect()
    }

    fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .filter(|message| !message.content.is_empty())
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };

                let content: Vec<Value> = message
                    .content
                    .iter()
                    .map(|msg_content| match msg_content {
                        MessageContent::Text(text) => json!({"type": "text", "text": text.text}),
                        MessageContent::ToolRequest(request) => json!({
                            "type": "tool_use",
                            "id": request.id,
                            "name": request.tool_call.name,
                            "input": request.tool_call.arguments,
                        }),
                        MessageContent::ToolResponse(response) => {
                            let (text, is_error) = match &response.tool_result {
                                Ok(contents) => (
                                    contents
                                        .iter()
                                        .map(Content::summary)
                                        .collect::<Vec<_>>()
                                        .join("\n"),
                                    false,
                                ),
                                Err(e) => (e.to_string(), true),
                            };
                            json!({
                                "type": "tool_result",
                                "tool_use_id": response.id,
                                "content": text,
                                "is_error": is_error,
                            })
                        }
                    })
                    .collect();

                json!({ "role": role, "content": content })
            })
            .collect()
    }

    fn response_to_message(response: &Value) -> Result<Message> {
        let blocks = response
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| anyhow!("Invalid response format from Anthropic API"))?;

        let mut message = Message::assistant();
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    let text = block.get("text").and_then(|t| t.as_str()).unwrap_or_default();
                    message = message.with_text(text);
                }
                Some("tool_use") => {
                    let id = block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| anyhow!("tool_use block without id"))?;
                    let name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| anyhow!("tool_use block without name"))?;
                    let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    message = message.with_tool_request(id, ToolCall::new(name, input));
                }
                _ => {} // thinking and other block types are not relayed
            }
        }
        Ok(message)
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(anyhow!("Request failed: {} - {}", status, error_text))
            }
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let mut payload = json!({
            "model": self.config.model,
            "system": system,
            "messages": Self::messages_to_anthropic_spec(messages),
            "max_tokens": self.config.max_tokens,
        });

        if !tools.is_empty() {
            payload["tools"] = json!(Self::tools_to_anthropic_spec(tools));
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }

        let response = self.post(payload).await?;

        let message = Self::response_to_message(&response)?;
        let usage = Self::get_usage(&response);

        Ok((message, usage))
    }
}
