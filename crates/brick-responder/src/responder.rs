use async_trait::async_trait;
use brick_core::Language;

use crate::error::Result;

/// Maps an input turn to reply text.
///
/// The chat layer treats implementations as a black box: they may consult
/// external state but must not touch the chat session itself. Callers are
/// expected to bound the call with a timeout.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Identifier used in logs
    fn responder_id(&self) -> &str;

    /// Produce a reply for `input` in `language`
    async fn generate(&self, input: &str, language: Language) -> Result<String>;
}
