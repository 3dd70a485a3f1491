//! REST entities exchanged with the chat backend.
//!
//! Timestamps are RFC 3339 on the wire (`2024-06-01T12:34:56.789012Z`).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type ChatId = i64;
pub type UserId = i64;
pub type MessageId = i64;

/// A visitor or the admin identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl User {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user: User,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A conversation between one visitor and the admin identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub user: User,
    pub admin: User,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_message_timestamp: Option<OffsetDateTime>,
    #[serde(default)]
    pub unread: bool,
    #[serde(default)]
    pub unread_count: i64,
}

impl Chat {
    /// Timestamp of the newest message, if any.
    #[must_use]
    pub fn last_message_at(&self) -> Option<OffsetDateTime> {
        self.messages.last().map(|m| m.created_at)
    }
}

// =============================================================================
// REQUEST BODIES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChat {
    pub user_email: String,
    pub admin_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub user_email: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl NewMessage {
    /// Message stamped with the current UTC time.
    #[must_use]
    pub fn now(chat_id: ChatId, user_email: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            user_email: user_email.into(),
            text: text.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(test)]
#[path = "models_test.rs"]
mod tests;
