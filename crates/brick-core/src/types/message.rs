use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique message identifier
pub type MessageId = String;

/// Context tag attached to generated replies
pub const AI_CONTEXT_RESPONSE: &str = "response";

/// Context tag attached to replies produced locally while offline
pub const AI_CONTEXT_OFFLINE: &str = "offline";

/// Who produced a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Ai => write!(f, "ai"),
        }
    }
}

/// A single turn of a support conversation.
///
/// Messages are immutable once appended to a log. `id` and `created_at`
/// are assigned by whoever appends them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    #[serde(default)]
    pub user_id: Option<String>,
    pub sender: Sender,
    pub message: String,
    #[serde(default)]
    pub ai_context: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Whether this turn was produced by the assistant
    pub fn is_ai(&self) -> bool {
        self.sender == Sender::Ai
    }

    /// Materialise a turn that never reached a server.
    ///
    /// Local ids carry a `local-` prefix so they can never collide with
    /// ids assigned by a message log.
    pub fn local(draft: NewChatMessage) -> Self {
        draft.into_message(format!("local-{}", Uuid::new_v4()), Utc::now())
    }
}

/// A turn that has not been appended yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChatMessage {
    pub user_id: Option<String>,
    pub sender: Sender,
    pub message: String,
    pub ai_context: Option<String>,
}

impl NewChatMessage {
    /// Create a user turn
    pub fn user(user_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            user_id,
            sender: Sender::User,
            message: message.into(),
            ai_context: None,
        }
    }

    /// Create an assistant turn tagged with the reason it was produced
    pub fn ai(
        user_id: Option<String>,
        message: impl Into<String>,
        ai_context: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            sender: Sender::Ai,
            message: message.into(),
            ai_context: Some(ai_context.into()),
        }
    }

    /// Stamp the draft with an id and timestamp
    pub fn into_message(self, id: MessageId, created_at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id,
            user_id: self.user_id,
            sender: self.sender,
            message: self.message,
            ai_context: self.ai_context,
            created_at,
        }
    }
}
