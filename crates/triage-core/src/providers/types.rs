//! Provider-agnostic types for LLM chat with tool calling

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider-agnostic chat message
///
/// This is also the unit of conversation history: a session's history is an
/// ordered `Vec<ChatMessage>`, serialized as `{role, content}` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: ChatMessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: ChatMessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: ChatMessageContent::Text(text.into()),
        }
    }

    /// Concatenated plain text of this message, ignoring tool blocks
    pub fn text(&self) -> String {
        match &self.content {
            ChatMessageContent::Text(text) => text.clone(),
            ChatMessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ChatBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// Content of a chat message, plain text or structured blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatMessageContent {
    Text(String),
    Blocks(Vec<ChatBlock>),
}

/// A single block within a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatBlock {
    Text { text: String },
    ToolCall { id: String, name: String, input: Value },
    ToolResult { tool_call_id: String, content: String },
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// How the model may use the advertised tools on a single call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model decides whether to call a tool
    #[default]
    Auto,
    /// The model must call the named tool
    Required(String),
}

/// Provider-agnostic response from an LLM
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub blocks: Vec<ChatResponseBlock>,
    pub stop_reason: StopReason,
    pub usage: ChatUsage,
}

impl ChatResponse {
    /// Joined text blocks of the response
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ChatResponseBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool calls requested by the model, in order
    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.blocks.iter().filter_map(|b| match b {
            ChatResponseBlock::ToolCall { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }

    /// Convert the response into an assistant history message
    pub fn to_message(&self) -> ChatMessage {
        let blocks = self
            .blocks
            .iter()
            .map(|b| match b {
                ChatResponseBlock::Text { text } => ChatBlock::Text { text: text.clone() },
                ChatResponseBlock::ToolCall { id, name, input } => ChatBlock::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                },
            })
            .collect::<Vec<_>>();

        let content = match blocks.as_slice() {
            [ChatBlock::Text { text }] => ChatMessageContent::Text(text.clone()),
            _ => ChatMessageContent::Blocks(blocks),
        };

        ChatMessage {
            role: ChatRole::Assistant,
            content,
        }
    }
}

/// A block in the response
#[derive(Debug, Clone)]
pub enum ChatResponseBlock {
    Text { text: String },
    ToolCall { id: String, name: String, input: Value },
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Unknown,
}

/// Token usage from a single API call
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Trait that all LLM providers implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "gemini", "openai")
    fn provider_name(&self) -> &str;

    /// Model identifier (e.g. "gemini-2.5-flash")
    fn model(&self) -> &str;

    /// Send a chat request with optional tools and system prompt
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        tool_choice: &ToolChoice,
    ) -> Result<ChatResponse>;
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_role_display() {
        assert_eq!(ChatRole::User.to_string(), "user");
        assert_eq!(ChatRole::Assistant.to_string(), "assistant");
        assert_eq!(ChatRole::System.to_string(), "system");
    }

    #[test]
    fn test_history_entry_parses_plain_role_content() {
        let raw = r#"[{"role": "user", "content": "plan a new widget line"},
                      {"role": "assistant", "content": "Sure."}]"#;
        let history: Vec<ChatMessage> = serde_json::from_str(raw).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ChatMessage::user("plan a new widget line"));
        assert_eq!(history[1].role, ChatRole::Assistant);
    }

    #[test]
    fn test_tool_blocks_serialize_with_type_tag() {
        let msg = ChatMessage {
            role: ChatRole::Assistant,
            content: ChatMessageContent::Blocks(vec![ChatBlock::ToolCall {
                id: "call_1".to_string(),
                name: "estimate_cost".to_string(),
                input: serde_json::json!({"units": 3, "cost_per_unit": 2.0}),
            }]),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"][0]["type"], "tool_call");

        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_single_text_response_becomes_plain_message() {
        let resp = ChatResponse {
            blocks: vec![ChatResponseBlock::Text {
                text: "done".to_string(),
            }],
            stop_reason: StopReason::EndTurn,
            usage: ChatUsage::default(),
        };
        assert_eq!(resp.to_message(), ChatMessage::assistant("done"));
        assert_eq!(resp.tool_calls().count(), 0);
    }

    #[test]
    fn test_message_text_skips_tool_blocks() {
        let msg = ChatMessage {
            role: ChatRole::Assistant,
            content: ChatMessageContent::Blocks(vec![
                ChatBlock::Text {
                    text: "checking".to_string(),
                },
                ChatBlock::ToolCall {
                    id: "c".to_string(),
                    name: "estimate_cost".to_string(),
                    input: Value::Null,
                },
            ]),
        };
        assert_eq!(msg.text(), "checking");
    }
}
