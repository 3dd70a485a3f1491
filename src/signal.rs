//! Signal model and JSON codec for the realtime channel.
//!
//! A signal is the only thing that crosses the channel: `{"action": "..."}`.
//! It never carries data, only a hint that peers should re-fetch from the
//! REST gateway. Unknown fields are ignored so servers can add envelope
//! fields without breaking older clients.

use serde::Serialize;
use serde_json::Value;

/// Action emitted after a local change to a conversation.
pub const UPDATE_CHAT: &str = "update_chat";

/// Error returned by [`Signal::decode`].
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("invalid signal payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("signal payload is not a JSON object")]
    NotAnObject,
    #[error("signal payload has no string `action`")]
    MissingAction,
}

/// A tagged notification carried over the realtime channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Signal {
    pub action: String,
}

/// Recognized interpretation of a signal's `action`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind<'a> {
    UpdateChat,
    /// Forward-compatible catch-all; dispatch ignores these.
    Other(&'a str),
}

impl Signal {
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self { action: action.into() }
    }

    #[must_use]
    pub fn update_chat() -> Self {
        Self::new(UPDATE_CHAT)
    }

    #[must_use]
    pub fn kind(&self) -> SignalKind<'_> {
        match self.action.as_str() {
            UPDATE_CHAT => SignalKind::UpdateChat,
            other => SignalKind::Other(other),
        }
    }

    /// Decode a text frame into a signal.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Decode`] for non-JSON text,
    /// [`SignalError::NotAnObject`] for any other JSON shape, and
    /// [`SignalError::MissingAction`] when `action` is absent or not a string.
    pub fn decode(text: &str) -> Result<Self, SignalError> {
        let value: Value = serde_json::from_str(text)?;
        let object = value.as_object().ok_or(SignalError::NotAnObject)?;
        let action = object
            .get("action")
            .and_then(Value::as_str)
            .ok_or(SignalError::MissingAction)?;
        Ok(Self::new(action))
    }

    /// Encode as the compact JSON text sent on the wire.
    #[must_use]
    pub fn encode(&self) -> String {
        // A single string field always serializes.
        serde_json::json!({ "action": self.action }).to_string()
    }
}

#[cfg(test)]
#[path = "signal_test.rs"]
mod tests;
