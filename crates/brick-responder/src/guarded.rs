//! Timeout and fallback wrapper around a [`ResponseGenerator`]

use std::sync::Arc;
use std::time::Duration;

use brick_core::Language;
use tracing::warn;

use crate::error::ResponderError;
use crate::responder::ResponseGenerator;

/// Generic apology used whenever the generator cannot produce a reply
pub fn fallback_reply(language: Language) -> &'static str {
    match language {
        Language::En => "Sorry, I couldn't process your request right now. Please try again in a moment.",
        Language::Ar => "عذرا، لم أتمكن من معالجة طلبك الآن. يرجى المحاولة مرة أخرى بعد قليل.",
    }
}

/// Outcome of a guarded generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Set when `text` is the fallback apology
    pub fallback: bool,
}

/// Bounds every call with a timeout and never returns an empty reply
#[derive(Clone)]
pub struct GuardedResponder {
    inner: Arc<dyn ResponseGenerator>,
    timeout: Duration,
}

impl std::fmt::Debug for GuardedResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedResponder")
            .field("inner", &self.inner.responder_id())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GuardedResponder {
    pub fn new(inner: Arc<dyn ResponseGenerator>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn responder_id(&self) -> &str {
        self.inner.responder_id()
    }

    /// Generate a reply, substituting the fallback on error, timeout or
    /// empty output
    pub async fn respond(&self, input: &str, language: Language) -> Reply {
        match self.try_generate(input, language).await {
            Ok(text) => Reply {
                text,
                fallback: false,
            },
            Err(e) => {
                warn!(
                    responder = self.inner.responder_id(),
                    language = %language,
                    "Response generation failed, using fallback: {}",
                    e
                );
                Reply {
                    text: fallback_reply(language).to_string(),
                    fallback: true,
                }
            }
        }
    }

    async fn try_generate(&self, input: &str, language: Language) -> Result<String, ResponderError> {
        let text = tokio::time::timeout(self.timeout, self.inner.generate(input, language))
            .await
            .map_err(|_| ResponderError::Timeout(self.timeout))??;
        if text.trim().is_empty() {
            return Err(ResponderError::Empty);
        }
        Ok(text)
    }
}
