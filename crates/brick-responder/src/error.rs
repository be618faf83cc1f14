use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResponderError {
    #[error("generation failed: {0}")]
    Failed(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generator returned an empty reply")]
    Empty,
}

pub type Result<T> = std::result::Result<T, ResponderError>;
