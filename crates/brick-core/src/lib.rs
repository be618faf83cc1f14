//! Brick Core - chat types and wire envelope shared by server and client

pub mod envelope;
pub mod types;

pub use envelope::{
    ChatData, Envelope, EnvelopeKind, ErrorData, FrameError, HistoryData, JoinData,
};
pub use types::{
    ChatMessage, Language, MessageId, NewChatMessage, Sender, AI_CONTEXT_OFFLINE,
    AI_CONTEXT_RESPONSE,
};
