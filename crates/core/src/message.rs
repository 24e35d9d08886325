//! Message and Conversation domain types.
//!
//! A [`Conversation`] is the rolling chat history sent to the backend on
//! every generation: one `system` preamble followed by user and assistant
//! turns in arrival order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Persona and instruction preamble
    System,
    /// The person talking to the robot
    User,
    /// The generated reply
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this turn
    pub role: Role,

    /// The text content
    pub content: String,

    /// When the turn was recorded
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }
}

/// An ordered chat history that always starts with its system preamble.
///
/// The preamble is fixed at construction. [`Conversation::reset`] drops
/// every later turn at once; there is no way to remove the preamble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID (for log correlation)
    pub id: String,

    messages: Vec<Message>,

    /// When the last message was added or the history was reset
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a conversation seeded with a system preamble.
    pub fn with_system(preamble: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: vec![Message::system(preamble)],
            updated_at: Utc::now(),
        }
    }

    /// Append a turn.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Discard everything except the system preamble.
    pub fn reset(&mut self) {
        self.updated_at = Utc::now();
        self.messages.truncate(1);
    }

    /// The system preamble.
    pub fn system(&self) -> &Message {
        &self.messages[0]
    }

    /// All turns in order, preamble first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent turn.
    pub fn last(&self) -> &Message {
        // Never empty: the preamble is always present.
        &self.messages[self.messages.len() - 1]
    }

    /// Number of turns, including the preamble.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
