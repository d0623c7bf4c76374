use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Completion, Provider, StopReason, Usage};

/// A mock provider that returns pre-configured responses and records every request
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Completion>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Completion>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The message lists submitted so far, in call order
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

/// A completion that asks for tools
pub fn tool_turn(message: Message) -> Completion {
    Completion {
        message,
        stop_reason: StopReason::ToolUse,
        usage: Usage::default(),
    }
}

/// A completion that ends the exchange
pub fn final_turn(message: Message) -> Completion {
    Completion {
        message,
        stop_reason: StopReason::EndTurn,
        usage: Usage::default(),
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _system_prompt: &str,
        messages: &[Message],
        _tools: &[Tool],
    ) -> Result<Completion> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Err(anyhow!("mock provider has no responses left"))
        } else {
            Ok(responses.remove(0))
        }
    }
}
