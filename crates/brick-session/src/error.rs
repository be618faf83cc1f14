//! # Storage Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rejected before anything was written
    #[error("Invalid message: {message}")]
    InvalidMessage { message: String },

    #[error("Storage error: {message}")]
    Other { message: String },
}

impl StorageError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
