use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::errors::{AgentError, AgentResult};
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::{Tool, ToolCall};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::systems::System;

/// How many model calls one reply may take before giving up
pub const DEFAULT_MAX_TURNS: usize = 10;

#[derive(Clone, Debug, Serialize)]
struct SystemInfo {
    name: String,
    description: String,
    instructions: String,
}

impl SystemInfo {
    fn new(name: &str, description: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            instructions: instructions.to_string(),
        }
    }
}

/// Agent integrates a foundational LLM with the systems it needs to pilot
pub struct Agent {
    systems: Vec<Box<dyn System>>,
    provider: Box<dyn Provider>,
    max_turns: usize,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            systems: Vec::new(),
            provider,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    /// Cap the number of model calls per reply
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    fn get_tools(&self) -> Vec<Tool> {
        self.systems
            .iter()
            .flat_map(|system| system.tools().iter().cloned())
            .collect()
    }

    /// Find the system that registered a tool with this name
    fn get_system_for_tool(&self, name: &str) -> Option<&dyn System> {
        self.systems
            .iter()
            .find(|system| system.tools().iter().any(|tool| tool.name == name))
            .map(|v| &**v)
    }

    /// Dispatch a single tool call to the appropriate system
    async fn dispatch_tool_call(&self, tool_call: AgentResult<ToolCall>) -> AgentResult<Value> {
        let call = tool_call?;
        let system = self
            .get_system_for_tool(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        system.call(call).await
    }

    fn get_system_prompt(&self) -> AgentResult<String> {
        let mut context = HashMap::new();
        let systems_info: Vec<SystemInfo> = self
            .systems
            .iter()
            .map(|system| {
                SystemInfo::new(system.name(), system.description(), system.instructions())
            })
            .collect();

        context.insert("systems", systems_info);
        load_prompt_file("system.md", &context).map_err(|e| AgentError::Internal(e.to_string()))
    }

    /// Run the tool loop over the caller's history and return the final answer text.
    ///
    /// Each round sends the whole history, executes every tool the model asked for and
    /// appends the assistant turn followed by one user turn holding the results, in
    /// request order. The loop stops when the model no longer asks for tools, or fails
    /// once `max_turns` model calls have been spent.
    pub async fn reply(&self, mut messages: Vec<Message>) -> Result<String> {
        let tools = self.get_tools();
        let system_prompt = self.get_system_prompt()?;

        for turn in 1..=self.max_turns {
            let completion = self
                .provider
                .complete(&system_prompt, &messages, &tools)
                .await?;

            let tool_requests: Vec<&ToolRequest> = completion.message.tool_requests();
            if !completion.wants_tools() || tool_requests.is_empty() {
                info!(turn, "reply complete");
                return Ok(completion.message.text());
            }
            if turn == self.max_turns {
                // no model call left to receive the results
                break;
            }
            debug!(turn, count = tool_requests.len(), "model requested tools");

            // Independent calls run together; join_all keeps the request order
            let futures: Vec<_> = tool_requests
                .iter()
                .map(|request| self.dispatch_tool_call(request.tool_call.clone()))
                .collect();
            let outputs = futures::future::join_all(futures).await;

            let mut message_tool_response = Message::user();
            for (request, output) in tool_requests.iter().zip(outputs.into_iter()) {
                message_tool_response =
                    message_tool_response.with_tool_response(request.id.clone(), output);
            }

            messages.push(completion.message.clone());
            messages.push(message_tool_response);
        }

        warn!(max_turns = self.max_turns, "tool loop limit exceeded");
        Err(AgentError::ToolLoopLimitExceeded(self.max_turns).into())
    }
}
