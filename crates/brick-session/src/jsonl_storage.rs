//! # JsonlStorage
//!
//! Append-only message log backed by a single JSONL file, one
//! `ChatMessage` per line. The whole file is read into memory on open;
//! appends go to the file first and to the cache second.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use brick_core::{ChatMessage, NewChatMessage};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::storage::{matches_user, monotonic_now, validate, MessageLog};

#[derive(Debug)]
struct LogState {
    file: File,
    messages: Vec<ChatMessage>,
}

/// File-backed message log
#[derive(Debug)]
pub struct JsonlStorage {
    path: PathBuf,
    state: Mutex<LogState>,
}

impl JsonlStorage {
    /// Open (or create) the log at `path`.
    ///
    /// Lines that fail to parse are skipped with a warning so that one
    /// torn write does not make the whole history unreadable.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let messages = if path.exists() {
            Self::read_lines(&path).await?
        } else {
            Vec::new()
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(
            "Opened message log {:?} with {} messages",
            path,
            messages.len()
        );

        Ok(Self {
            path,
            state: Mutex::new(LogState { file, messages }),
        })
    }

    async fn read_lines(path: &Path) -> StorageResult<Vec<ChatMessage>> {
        let content = fs::read_to_string(path).await?;
        let mut messages = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChatMessage>(line) {
                Ok(message) => messages.push(message),
                Err(e) => warn!("Skipping corrupt line {} in {:?}: {}", line_no + 1, path, e),
            }
        }
        Ok(messages)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MessageLog for JsonlStorage {
    async fn append(&self, draft: NewChatMessage) -> StorageResult<ChatMessage> {
        validate(&draft)?;
        let mut state = self.state.lock().await;
        let created_at = monotonic_now(state.messages.last().map(|m| m.created_at));
        let message = draft.into_message(Uuid::new_v4().to_string(), created_at);

        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        state.file.write_all(line.as_bytes()).await?;
        state.file.flush().await?;

        debug!("Appended message {} to {:?}", message.id, self.path);
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn list_by_user(&self, user_id: Option<&str>) -> StorageResult<Vec<ChatMessage>> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| matches_user(m, user_id))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> StorageResult<()> {
        let state = self.state.lock().await;
        state.file.metadata().await?;
        Ok(())
    }
}
