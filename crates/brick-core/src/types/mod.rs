pub mod language;
pub mod message;

pub use language::Language;
pub use message::{
    ChatMessage, MessageId, NewChatMessage, Sender, AI_CONTEXT_OFFLINE, AI_CONTEXT_RESPONSE,
};
