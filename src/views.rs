//! View-model transforms for a chat UI: chat list → rooms, messages → rows.
//!
//! Pure functions over the store's snapshot. Nothing here renders.

use std::cmp::Reverse;

use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};
use tracing::warn;

use crate::models::{Chat, ChatId, Message, MessageId, User};

/// Display name shown for the admin identity in every room.
pub const ADMIN_DISPLAY_NAME: &str = "Admin Web Side";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub room_id: ChatId,
    pub room_name: String,
    pub avatar: String,
    pub unread_count: i64,
    /// Preview line; shows the visitor's email.
    pub last_message: String,
    pub users: Vec<RoomUser>,
    /// Newest message time in Unix milliseconds, 0 for an empty chat.
    pub last_message_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    pub id: MessageId,
    pub content: String,
    pub sender_id: String,
    /// `HH:MM`
    pub timestamp: String,
    /// `M/D/YYYY`
    pub date: String,
}

/// Build the room list, newest activity first.
#[must_use]
pub fn rooms_from_chats(chats: &[Chat], admin: &User, avatar: &str) -> Vec<Room> {
    if chats.is_empty() {
        warn!("views: no chats available to build rooms");
        return Vec::new();
    }

    let mut rooms: Vec<Room> = chats
        .iter()
        .map(|chat| Room {
            room_id: chat.id,
            room_name: chat.user.full_name(),
            avatar: avatar.to_owned(),
            unread_count: chat.unread_count,
            last_message: chat.user.email.clone(),
            users: vec![
                RoomUser { id: chat.user.email.clone(), username: chat.user.full_name() },
                RoomUser { id: admin.email.clone(), username: ADMIN_DISPLAY_NAME.to_owned() },
            ],
            last_message_timestamp: chat.last_message_at().map_or(0, unix_millis),
        })
        .collect();

    rooms.sort_by_key(|room| Reverse(room.last_message_timestamp));
    rooms
}

/// Convert messages to display rows in `offset`.
#[must_use]
pub fn message_views(messages: &[Message], offset: UtcOffset) -> Vec<MessageView> {
    messages
        .iter()
        .map(|message| MessageView {
            id: message.id,
            content: message.text.clone(),
            sender_id: message.user.email.clone(),
            timestamp: format_time_at(message.created_at, offset),
            date: format_date_at(message.created_at, offset),
        })
        .collect()
}

/// `HH:MM` in `offset`.
#[must_use]
pub fn format_time_at(at: OffsetDateTime, offset: UtcOffset) -> String {
    let local = at.to_offset(offset);
    format!("{:02}:{:02}", local.hour(), local.minute())
}

/// `M/D/YYYY` in `offset`.
#[must_use]
pub fn format_date_at(at: OffsetDateTime, offset: UtcOffset) -> String {
    let local = at.to_offset(offset);
    format!("{}/{}/{}", u8::from(local.month()), local.day(), local.year())
}

/// The process's local offset, or UTC when it cannot be determined.
#[must_use]
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[path = "views_test.rs"]
mod tests;
