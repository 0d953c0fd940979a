//! Conversation types and the chat-model seam.
//!
//! A [`ConversationState`] is the unit persisted per thread: the ordered
//! [`Message`] history, the running summary produced by compaction, and two
//! counters. Model output content may be a plain string or a list of typed
//! blocks; [`Content::answer_text`] folds either shape into display text.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name attached to the system message that carries the running summary.
pub const SUMMARY_MESSAGE_NAME: &str = "conversation_summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One typed content block, e.g. `{"type": "text", "text": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Message content as returned by a chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl Content {
    /// Normalize to a single display string.
    ///
    /// Plain text is returned as is. For blocks only the first one counts:
    /// its `text` field if present, otherwise the block rendered as JSON.
    /// An empty block list yields an empty string.
    pub fn answer_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => match blocks.first() {
                None => String::new(),
                Some(ContentBlock {
                    text: Some(text), ..
                }) => text.clone(),
                Some(block) => {
                    serde_json::to_string(block).unwrap_or_else(|_| block.kind.clone())
                }
            },
        }
    }

    /// All text in the content, blocks joined by newlines. Used when
    /// sending history back to a model.
    pub fn full_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| b.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Interpret an arbitrary JSON value returned by a provider.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Content::default(),
            Value::String(s) => Content::Text(s.clone()),
            Value::Array(items) => Content::Blocks(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => ContentBlock {
                            kind: "text".to_string(),
                            text: Some(s.clone()),
                        },
                        Value::Object(map) => ContentBlock {
                            kind: map
                                .get("type")
                                .and_then(Value::as_str)
                                .unwrap_or("unknown")
                                .to_string(),
                            text: map.get("text").and_then(Value::as_str).map(str::to_string),
                        },
                        other => ContentBlock {
                            kind: "unknown".to_string(),
                            text: Some(other.to_string()),
                        },
                    })
                    .collect(),
            ),
            other => Content::Text(other.to_string()),
        }
    }
}

/// A model-initiated request to run a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Content,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool-result messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<Content>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(Role::System, text.into())
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, text.into())
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn assistant_with_tools(content: impl Into<Content>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    pub fn tool_result(call: &ToolCall, text: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            ..Self::with_role(Role::Tool, text.into())
        }
    }

    /// The system message holding a conversation summary.
    pub fn summary(summary: &str) -> Self {
        Self {
            name: Some(SUMMARY_MESSAGE_NAME.to_string()),
            ..Self::system(format!("Summary of the conversation so far: {}", summary))
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_summary(&self) -> bool {
        self.role == Role::System && self.name.as_deref() == Some(SUMMARY_MESSAGE_NAME)
    }
}

/// Persisted per-thread conversation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub thread_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub running_summary: Option<String>,
    #[serde(default)]
    pub turn_count: u64,
    #[serde(default)]
    pub llm_calls: u64,
}

impl ConversationState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            running_summary: None,
            turn_count: 0,
            llm_calls: 0,
        }
    }

    /// The most recent assistant message, if any.
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }
}

/// A tool definition offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// An opaque chat-completion capability.
///
/// Implementations own their timeout and retry policy. Returned messages
/// are assistant messages, possibly carrying tool calls.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(
        &self,
        system: Option<&str>,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message>;
}
