//! # Brick Message Log
//!
//! Append-only storage for chat turns, keyed by an optional user id.
//!
//! Two implementations are provided:
//!
//! - [`MemoryStorage`]: volatile, used by tests and `storage.type = "memory"`
//! - [`JsonlStorage`]: one JSON object per line in a single file
//!
//! ```rust,no_run
//! use brick_core::NewChatMessage;
//! use brick_session::{JsonlStorage, MessageLog};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let log = JsonlStorage::open("/tmp/brick/messages.jsonl").await?;
//!     log.append(NewChatMessage::user(Some("investor-1".into()), "Hello!")).await?;
//!     let history = log.recent_by_user("investor-1", 20).await?;
//!     println!("{} turns", history.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod jsonl_storage;
pub mod memory_storage;
pub mod storage;

pub use error::{StorageError, StorageResult};
pub use jsonl_storage::JsonlStorage;
pub use memory_storage::MemoryStorage;
pub use storage::MessageLog;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
