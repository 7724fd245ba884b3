//! Conversation messages
//!
//! TigerStyle: Explicit roles, validated content, sortable ids.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::MemoryId;

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Messages authored by the end user
    User,
    /// Messages produced by the agent
    Assistant,
    /// Messages steering agent behaviour
    System,
    /// Tool invocation results
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        })
    }
}

/// A single conversation message held in working memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMessage {
    /// Sortable unique identifier; id order equals creation order
    pub id: MemoryId,
    /// Message role
    pub role: MessageRole,
    /// Message text
    pub content: String,
    /// Creation time in epoch milliseconds
    pub created_at: u64,
}

impl MemoryMessage {
    /// Create a message, validating the content
    pub fn new(
        id: MemoryId,
        role: MessageRole,
        content: impl Into<String>,
        created_at: u64,
    ) -> Result<Self> {
        let content = content.into();
        if content.is_empty() {
            return Err(Error::input_invalid("content", "must not be empty"));
        }
        Ok(Self {
            id,
            role,
            content,
            created_at,
        })
    }

    /// Render as `role: content`, the shape indexed as message-type memories
    pub fn render(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}
