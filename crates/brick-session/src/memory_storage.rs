//! # In-memory message log

use async_trait::async_trait;
use brick_core::{ChatMessage, NewChatMessage};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::storage::{matches_user, monotonic_now, validate, MessageLog};

/// Volatile log, lost on restart
#[derive(Debug, Default)]
pub struct MemoryStorage {
    messages: RwLock<Vec<ChatMessage>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

#[async_trait]
impl MessageLog for MemoryStorage {
    async fn append(&self, draft: NewChatMessage) -> StorageResult<ChatMessage> {
        validate(&draft)?;
        let mut messages = self.messages.write();
        let created_at = monotonic_now(messages.last().map(|m| m.created_at));
        let message = draft.into_message(Uuid::new_v4().to_string(), created_at);
        messages.push(message.clone());
        Ok(message)
    }

    async fn list_by_user(&self, user_id: Option<&str>) -> StorageResult<Vec<ChatMessage>> {
        Ok(self
            .messages
            .read()
            .iter()
            .filter(|m| matches_user(m, user_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use brick_core::Sender;

    #[tokio::test]
    async fn test_append_assigns_id_and_timestamp() {
        let log = MemoryStorage::new();
        let first = log
            .append(NewChatMessage::user(Some("u1".into()), "hello"))
            .await
            .unwrap();
        let second = log
            .append(NewChatMessage::ai(Some("u1".into()), "hi there", "response"))
            .await
            .unwrap();

        assert!(!first.id.is_empty());
        assert_ne!(first.id, second.id);
        assert!(second.created_at >= first.created_at);
        assert_eq!(second.sender, Sender::Ai);
    }

    #[tokio::test]
    async fn test_list_by_user_filters_and_keeps_order() {
        let log = MemoryStorage::new();
        for i in 0..3 {
            log.append(NewChatMessage::user(Some("a".into()), format!("a{}", i)))
                .await
                .unwrap();
            log.append(NewChatMessage::user(Some("b".into()), format!("b{}", i)))
                .await
                .unwrap();
        }
        log.append(NewChatMessage::user(None, "anon")).await.unwrap();

        let a: Vec<_> = log
            .list_by_user(Some("a"))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(a, vec!["a0", "a1", "a2"]);
        assert_eq!(log.list_by_user(None).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_recent_by_user_keeps_tail() {
        let log = MemoryStorage::new();
        for i in 0..25 {
            log.append(NewChatMessage::user(Some("u".into()), format!("m{}", i)))
                .await
                .unwrap();
        }

        let recent = log.recent_by_user("u", 20).await.unwrap();
        assert_eq!(recent.len(), 20);
        assert_eq!(recent.first().unwrap().message, "m5");
        assert_eq!(recent.last().unwrap().message, "m24");
        assert!(log.recent_by_user("nobody", 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_empty_text() {
        let log = MemoryStorage::new();
        let result = log.append(NewChatMessage::user(Some("u".into()), "   ")).await;
        assert!(matches!(result, Err(StorageError::InvalidMessage { .. })));
        assert!(log.is_empty());
    }
}
