//! Wire envelope
//!
//! Every frame on a chat channel is a single UTF-8 JSON object of the form
//! `{"type": "<kind>", "data": {...}}`. The `type` decides the shape of
//! `data`; frames whose `data` does not match are rejected with a
//! [`FrameError`] that the receiver reports instead of dropping the channel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{ChatMessage, Language};

/// Payload of a `join` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinData {
    pub user_id: String,
}

/// Payload of a `chat` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatData {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

/// Payload of a `history` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryData {
    pub messages: Vec<ChatMessage>,
}

/// Payload of an `error` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
}

/// The closed set of envelope kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Join,
    Chat,
    Typing,
    Ping,
    Pong,
    Message,
    History,
    Error,
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::Join => "join",
            EnvelopeKind::Chat => "chat",
            EnvelopeKind::Typing => "typing",
            EnvelopeKind::Ping => "ping",
            EnvelopeKind::Pong => "pong",
            EnvelopeKind::Message => "message",
            EnvelopeKind::History => "history",
            EnvelopeKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EnvelopeKind {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "join" => Ok(EnvelopeKind::Join),
            "chat" => Ok(EnvelopeKind::Chat),
            "typing" => Ok(EnvelopeKind::Typing),
            "ping" => Ok(EnvelopeKind::Ping),
            "pong" => Ok(EnvelopeKind::Pong),
            "message" => Ok(EnvelopeKind::Message),
            "history" => Ok(EnvelopeKind::History),
            "error" => Ok(EnvelopeKind::Error),
            other => Err(FrameError::UnknownType(other.to_string())),
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Join(JoinData),
    Chat(ChatData),
    Typing,
    Ping,
    Pong,
    Message(ChatMessage),
    History(HistoryData),
    Error(ErrorData),
}

/// Shape shared by every frame before `data` is interpreted
#[derive(Debug, Serialize, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    pub fn join(user_id: impl Into<String>) -> Self {
        Envelope::Join(JoinData {
            user_id: user_id.into(),
        })
    }

    pub fn chat(
        message: impl Into<String>,
        user_id: Option<String>,
        language: Option<Language>,
    ) -> Self {
        Envelope::Chat(ChatData {
            message: message.into(),
            user_id,
            language,
        })
    }

    pub fn history(messages: Vec<ChatMessage>) -> Self {
        Envelope::History(HistoryData { messages })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Envelope::Error(ErrorData {
            message: message.into(),
        })
    }

    /// The kind of this envelope
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Join(_) => EnvelopeKind::Join,
            Envelope::Chat(_) => EnvelopeKind::Chat,
            Envelope::Typing => EnvelopeKind::Typing,
            Envelope::Ping => EnvelopeKind::Ping,
            Envelope::Pong => EnvelopeKind::Pong,
            Envelope::Message(_) => EnvelopeKind::Message,
            Envelope::History(_) => EnvelopeKind::History,
            Envelope::Error(_) => EnvelopeKind::Error,
        }
    }

    /// Serialize into a single text frame
    pub fn encode(&self) -> Result<String, FrameError> {
        let data = match self {
            Envelope::Join(data) => serde_json::to_value(data)?,
            Envelope::Chat(data) => serde_json::to_value(data)?,
            Envelope::Typing | Envelope::Ping | Envelope::Pong => Value::Object(Map::new()),
            Envelope::Message(message) => serde_json::to_value(message)?,
            Envelope::History(data) => serde_json::to_value(data)?,
            Envelope::Error(data) => serde_json::to_value(data)?,
        };
        let frame = RawFrame {
            kind: Some(self.kind().as_str().to_string()),
            data,
        };
        Ok(serde_json::to_string(&frame)?)
    }

    /// Parse a single text frame.
    ///
    /// A missing or `null` `data` is treated as `{}` so that payload-less
    /// kinds can be sent as `{"type":"ping"}`.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let kind: EnvelopeKind = raw.kind.ok_or(FrameError::MissingType)?.parse()?;
        let data = match raw.data {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let envelope = match kind {
            EnvelopeKind::Join => {
                let join: JoinData = payload(kind, data)?;
                if join.user_id.trim().is_empty() {
                    return Err(FrameError::EmptyField {
                        kind,
                        field: "userId",
                    });
                }
                Envelope::Join(join)
            }
            EnvelopeKind::Chat => Envelope::Chat(payload(kind, data)?),
            EnvelopeKind::Typing => Envelope::Typing,
            EnvelopeKind::Ping => Envelope::Ping,
            EnvelopeKind::Pong => Envelope::Pong,
            EnvelopeKind::Message => Envelope::Message(payload(kind, data)?),
            EnvelopeKind::History => Envelope::History(payload(kind, data)?),
            EnvelopeKind::Error => Envelope::Error(payload(kind, data)?),
        };
        Ok(envelope)
    }
}

fn payload<T: serde::de::DeserializeOwned>(kind: EnvelopeKind, data: Value) -> Result<T, FrameError> {
    serde_json::from_value(data).map_err(|source| FrameError::InvalidData { kind, source })
}

/// Reasons a frame could not be turned into an [`Envelope`]
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Failed to parse frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Frame is missing the 'type' field")]
    MissingType,
    #[error("Unrecognized envelope type: {0}")]
    UnknownType(String),
    #[error("Invalid data for '{kind}' envelope: {source}")]
    InvalidData {
        kind: EnvelopeKind,
        source: serde_json::Error,
    },
    #[error("Field '{field}' of '{kind}' envelope must not be empty")]
    EmptyField {
        kind: EnvelopeKind,
        field: &'static str,
    },
}
