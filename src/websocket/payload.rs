//! Payloads and inbound frame classification.
//!
//! Outbound, every [`Payload`] maps to one frame: text and JSON go out as
//! text frames, binary as a binary frame. Inbound, a text frame that parses
//! as JSON is delivered as [`Payload::Json`], any other text frame as
//! [`Payload::Text`].

use std::fmt;

use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use crate::error::Result;

// ============================================================================
// Payload
// ============================================================================

/// One message sent or received over a WebSocket session.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Plain text.
    Text(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Structured data, carried in a text frame.
    Json(Value),
}

impl Payload {
    /// Short name of the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
            Self::Json(_) => "json",
        }
    }

    /// Converts into the frame sent on the wire.
    pub(crate) fn into_message(self) -> Result<Message> {
        Ok(match self {
            Self::Text(text) => Message::Text(text.into()),
            Self::Binary(bytes) => Message::Binary(bytes.into()),
            Self::Json(value) => Message::Text(serde_json::to_string(&value)?.into()),
        })
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "text({} chars)", text.chars().count()),
            Self::Binary(bytes) => write!(f, "binary({} bytes)", bytes.len()),
            Self::Json(value) => write!(f, "json({value})"),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

// ============================================================================
// Classification
// ============================================================================

/// What the session loop does with an inbound frame.
#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    /// Dispatch to callbacks.
    Payload(Payload),
    /// The peer closed the session.
    Close,
    /// Control frame; nothing to do.
    Ignored,
}

/// Classifies an inbound frame by its wire type.
pub(crate) fn classify(message: Message) -> Inbound {
    match message {
        Message::Text(text) => match serde_json::from_str::<Value>(text.as_str()) {
            Ok(value) => Inbound::Payload(Payload::Json(value)),
            Err(_) => Inbound::Payload(Payload::Text(text.as_str().to_string())),
        },
        Message::Binary(bytes) => Inbound::Payload(Payload::Binary(bytes.to_vec())),
        Message::Close(_) => Inbound::Close,
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Inbound::Ignored,
    }
}

// ============================================================================
// Tests
// ============================================================================
