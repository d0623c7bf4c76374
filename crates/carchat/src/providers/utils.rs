use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use super::base::{StopReason, Usage};
use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

/// Convert internal Message format to Anthropic's API message specification
pub fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut blocks = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    // the API rejects empty text blocks
                    if !text.text.is_empty() {
                        blocks.push(json!({"type": "text", "text": text.text}));
                    }
                }
                MessageContent::ToolRequest(request) => match &request.tool_call {
                    Ok(tool_call) => blocks.push(json!({
                        "type": "tool_use",
                        "id": request.id,
                        "name": tool_call.name,
                        "input": tool_call.arguments,
                    })),
                    Err(_) => {
                        // an unparsable request still needs its id in the history, since the
                        // matching tool_result always follows it
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": request.id,
                            "name": "invalid_tool",
                            "input": {},
                        }));
                    }
                },
                MessageContent::ToolResponse(response) => {
                    let mut block = json!({
                        "type": "tool_result",
                        "tool_use_id": response.id,
                        "content": response.payload(),
                    });
                    if response.tool_result.is_err() {
                        block["is_error"] = json!(true);
                    }
                    blocks.push(block);
                }
            }
        }

        if blocks.is_empty() {
            continue;
        }
        messages_spec.push(json!({
            "role": message.role.as_str(),
            "content": blocks,
        }));
    }

    messages_spec
}

/// Convert internal Tool format to Anthropic's API tool specification
pub fn tools_to_anthropic_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.input_schema,
        }));
    }

    Ok(result)
}

/// Convert Anthropic's API response to internal Message format
pub fn anthropic_response_to_message(response: &Value) -> Result<(Message, StopReason)> {
    let blocks = response
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow!("Invalid response format from Anthropic API: missing content"))?;

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
                    .and_then(|id| id.as_str())
                    .ok_or_else(|| anyhow!("tool_use block without an id"))?;
                let tool_call = match block.get("name").and_then(|n| n.as_str()) {
                    Some(name) => Ok(ToolCall::new(
                        name,
                        block.get("input").cloned().unwrap_or_else(|| json!({})),
                    )),
                    None => Err(AgentError::InvalidParameters(
                        "tool_use block without a name".to_string(),
                    )),
                };
                message = message.with_tool_request(id, tool_call);
            }
            other => {
                tracing::debug!(block_type = ?other, "skipping unsupported response block");
            }
        }
    }

    let stop_reason = response
        .get("stop_reason")
        .and_then(|r| r.as_str())
        .map(StopReason::from)
        .unwrap_or(StopReason::Other);

    Ok((message, stop_reason))
}

pub fn get_usage(response: &Value) -> Usage {
    let usage = response.get("usage");
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

/// Convert a chat message posted by the browser, in Anthropic's message shape,
/// into the internal Message format
pub fn message_from_anthropic_spec(value: &Value) -> Result<Message> {
    let role = match value.get("role").and_then(|r| r.as_str()) {
        Some("user") => Role::User,
        Some("assistant") => Role::Assistant,
        Some(other) => return Err(anyhow!("unsupported role: {}", other)),
        None => return Err(anyhow!("message without a role")),
    };
    let mut message = Message {
        role,
        content: Vec::new(),
    };

    match value.get("content") {
        Some(Value::String(text)) => message = message.with_text(text.as_str()),
        Some(Value::Array(blocks)) => {
            for block in blocks {
                message = message.with_content(content_from_block(block)?);
            }
        }
        None | Some(Value::Null) => {}
        Some(_) => return Err(anyhow!("message content must be text or a list of blocks")),
    }

    Ok(message)
}

fn content_from_block(block: &Value) -> Result<MessageContent> {
    let field = |name: &str| {
        block
            .get(name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("content block is missing '{}'", name))
    };

    match block.get("type").and_then(|t| t.as_str()) {
        Some("text") => Ok(MessageContent::text(field("text")?)),
        Some("tool_use") => Ok(MessageContent::tool_request(
            field("id")?,
            Ok(ToolCall::new(
                field("name")?,
                block.get("input").cloned().unwrap_or_else(|| json!({})),
            )),
        )),
        Some("tool_result") => {
            let text = match block.get("content") {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Array(parts)) => parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                    .collect(),
                _ => String::new(),
            };
            // results are already serialized text; keep them verbatim
            Ok(MessageContent::tool_response(
                field("tool_use_id")?,
                Ok(Value::String(text)),
            ))
        }
        Some(other) => Err(anyhow!("unsupported content block: {}", other)),
        None => Err(anyhow!("content block without a type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_to_anthropic_spec_with_tools() {
        let messages = vec![
            Message::user().with_text("Porównaj Corollę i Civic"),
            Message::assistant()
                .with_text("")
                .with_tool_request(
                    "a",
                    Ok(ToolCall::new("get_makes", json!({"year": "2020"}))),
                ),
            Message::user()
                .with_tool_response("a", Ok(json!(["Toyota"])))
                .with_tool_response("b", Err(AgentError::NotFound)),
        ];

        let spec = messages_to_anthropic_spec(&messages);
        assert_eq!(spec.len(), 3);
        assert_eq!(
            spec[1],
            json!({
                "role": "assistant",
                "content": [{"type": "tool_use", "id": "a", "name": "get_makes", "input": {"year": "2020"}}]
            })
        );
        assert_eq!(
            spec[2]["content"],
            json!([
                {"type": "tool_result", "tool_use_id": "a", "content": "[\"Toyota\"]"},
                {"type": "tool_result", "tool_use_id": "b", "content": "{\"error\":\"not found\"}", "is_error": true}
            ])
        );
    }

    #[test]
    fn test_empty_messages_are_dropped() {
        let spec = messages_to_anthropic_spec(&[Message::assistant().with_text("")]);
        assert!(spec.is_empty());
    }

    #[test]
    fn test_tools_to_anthropic_spec_duplicate() {
        let tool = Tool::new("get_makes", "makes", json!({"type": "object"}));
        assert!(tools_to_anthropic_spec(&[tool.clone(), tool]).is_err());
    }

    #[test]
    fn test_response_to_message() -> Result<()> {
        let response = json!({
            "content": [
                {"type": "text", "text": "Sprawdzę to."},
                {"type": "tool_use", "id": "toolu_1", "name": "search_cars", "input": {"make": "BMW"}},
                {"type": "tool_use", "id": "toolu_2"}
            ],
            "stop_reason": "tool_use"
        });

        let (message, stop_reason) = anthropic_response_to_message(&response)?;
        assert_eq!(stop_reason, StopReason::ToolUse);
        assert_eq!(message.text(), "Sprawdzę to.");

        let requests = message.tool_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].tool_call,
            Ok(ToolCall::new("search_cars", json!({"make": "BMW"})))
        );
        assert!(requests[1].tool_call.is_err());
        Ok(())
    }

    #[test]
    fn test_response_without_content_fails() {
        assert!(anthropic_response_to_message(&json!({"type": "error"})).is_err());
    }

    #[test]
    fn test_get_usage() {
        let usage = get_usage(&json!({"usage": {"input_tokens": 12, "output_tokens": 15}}));
        assert_eq!(usage, Usage::new(Some(12), Some(15), Some(27)));
        assert_eq!(get_usage(&json!({})), Usage::default());
    }

    #[test]
    fn test_message_from_plain_text() -> Result<()> {
        let message = message_from_anthropic_spec(&json!({"role": "user", "content": "Cześć"}))?;
        assert_eq!(message, Message::user().with_text("Cześć"));
        Ok(())
    }

    #[test]
    fn test_message_from_blocks() -> Result<()> {
        let message = message_from_anthropic_spec(&json!({
            "role": "user",
            "content": [
                {"type": "tool_result", "tool_use_id": "a", "content": "[{\"model_name\":\"X5\"}]"},
                {"type": "text", "text": "i co dalej?"}
            ]
        }))?;

        let response = message.content[0].as_tool_response().unwrap();
        assert_eq!(response.id, "a");
        assert_eq!(response.payload(), "[{\"model_name\":\"X5\"}]");
        assert_eq!(message.content[1].as_text(), Some("i co dalej?"));
        Ok(())
    }

    #[test]
    fn test_message_with_bad_role_fails() {
        assert!(message_from_anthropic_spec(&json!({"role": "system", "content": "x"})).is_err());
        assert!(message_from_anthropic_spec(&json!({"content": "x"})).is_err());
    }
}
