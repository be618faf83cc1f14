//! # Message Log Trait

use async_trait::async_trait;
use brick_core::{ChatMessage, NewChatMessage};
use chrono::{DateTime, Utc};

use crate::error::{StorageError, StorageResult};

/// Append-only log of chat turns.
///
/// Implementations assign `id` and `created_at` on append and keep
/// append order; `created_at` never goes backwards within a log.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Append a turn and return it as stored
    async fn append(&self, draft: NewChatMessage) -> StorageResult<ChatMessage>;

    /// Turns for `user_id`, oldest first. `None` returns every user's turns
    /// and is meant for administrative listing only.
    async fn list_by_user(&self, user_id: Option<&str>) -> StorageResult<Vec<ChatMessage>>;

    /// The last `limit` turns for `user_id`, oldest first
    async fn recent_by_user(&self, user_id: &str, limit: usize) -> StorageResult<Vec<ChatMessage>> {
        let mut messages = self.list_by_user(Some(user_id)).await?;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Reject drafts that would break the log's invariants
pub(crate) fn validate(draft: &NewChatMessage) -> StorageResult<()> {
    if draft.message.trim().is_empty() {
        return Err(StorageError::invalid("message text must not be empty"));
    }
    Ok(())
}

/// Next timestamp that is not earlier than `last`
pub(crate) fn monotonic_now(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(last) if last > now => last,
        _ => now,
    }
}

pub(crate) fn matches_user(message: &ChatMessage, user_id: Option<&str>) -> bool {
    match user_id {
        Some(user_id) => message.user_id.as_deref() == Some(user_id),
        None => true,
    }
}
