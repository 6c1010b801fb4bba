use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, Usage};

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Result<Message, String>>>>,
    pub seen_tools: Arc<Mutex<Vec<Vec<Tool>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Like `new`, but `Err` entries make `complete` fail at that point
    pub fn with_results(responses: Vec<Result<Message, String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            seen_tools: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _system_prompt: &str,
        _messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        self.seen_tools.lock().unwrap().push(tools.to_vec());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            Ok((Message::assistant().with_text(""), Usage::default()))
        } else {
            match responses.remove(0) {
                Ok(message) => Ok((message, Usage::default())),
                Err(e) => Err(anyhow::anyhow!(e)),
            }
        }
    }
}
