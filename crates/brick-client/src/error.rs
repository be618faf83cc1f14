use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Frame error: {0}")]
    Frame(#[from] brick_core::FrameError),

    #[error("Message must not be empty")]
    EmptyMessage,
}

pub type Result<T> = std::result::Result<T, ClientError>;
