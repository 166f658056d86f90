//! Message and Conversation domain types.
//!
//! A conversation is rebuilt from scratch for every user request:
//! system prompt → user utterance → (assistant tool calls → tool results) → reply.
//! Nothing here is persisted between requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions (persona, date, rules)
    System,
    /// Capability execution result
    Tool,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// If this is a tool result, the name of the capability that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a tool result message answering `tool_call_id`, produced by `name`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg.name = Some(name.into());
        msg
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}

/// An ordered sequence of turns for a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Request-scoped ID, used for log correlation only
    pub id: String,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Tool result turns, in order.
    pub fn tool_results(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role == Role::Tool)
    }

    /// Tool call IDs requested by assistant turns that have no matching result yet.
    pub fn unanswered_tool_calls(&self) -> Vec<&str> {
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .map(|tc| tc.id.as_str())
            .filter(|id| {
                !self
                    .tool_results()
                    .any(|r| r.tool_call_id.as_deref() == Some(*id))
            })
            .collect()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
