//! Conversation state store.
//!
//! DESIGN
//! ======
//! `ChatStore` holds the session's view of the backend: current visitor,
//! admin identity, chat list, and the open conversation's messages. It is
//! mutated by direct user actions (fetch, send, delete) and by the signal
//! dispatcher, which calls `refresh_open_conversation` on `update_chat`.
//!
//! All state sits behind one `tokio::sync::Mutex`. The open-conversation
//! target is read and written under that lock, and the lock is never held
//! across a gateway call.
//!
//! ERROR HANDLING
//! ==============
//! Gateway and decode failures propagate to the caller unchanged. A refresh
//! whose target changed while the request was in flight is discarded rather
//! than overwriting the newer conversation's messages.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::channel::SignalSink;
use crate::gateway::{GatewayError, RestApi};
use crate::models::{Chat, ChatId, Message, NewChat, NewMessage, NewUser, User, UserId};
use crate::signal::UPDATE_CHAT;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("unexpected response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("request body encode failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("expected a list from {0}")]
    NotAList(String),
    #[error("user is not loaded")]
    MissingUser,
    #[error("invalid chat id: {0}")]
    InvalidChatId(ChatId),
}

/// The conversation currently displayed, and who is viewing it.
///
/// The message endpoint is keyed by both, and viewing as the admin resets
/// the chat's unread count server-side. `generation` changes on every open,
/// so reopening the same chat still invalidates responses in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenConversation {
    pub chat_id: ChatId,
    pub viewer_id: UserId,
    pub generation: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    pub user: Option<User>,
    pub admin: Option<User>,
    pub chats: Vec<Chat>,
    pub messages: Vec<Message>,
    pub open: Option<OpenConversation>,
    opens: u64,
}

// =============================================================================
// PATHS
// =============================================================================

const ADMIN_PATH: &str = "admin_web_side/";
const USER_PATH: &str = "user/";
const CHATS_PATH: &str = "chats/";
const MESSAGES_PATH: &str = "messages/";

fn chat_delete_path(chat_id: ChatId) -> String {
    format!("chat_delete/{chat_id}/")
}

fn messages_path(target: OpenConversation) -> String {
    format!("messages/{}/user/{}", target.chat_id, target.viewer_id)
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Clone)]
pub struct ChatStore {
    api: Arc<dyn RestApi>,
    signals: Arc<dyn SignalSink>,
    state: Arc<Mutex<ChatState>>,
}

impl ChatStore {
    #[must_use]
    pub fn new(api: Arc<dyn RestApi>, signals: Arc<dyn SignalSink>) -> Self {
        Self { api, signals, state: Arc::new(Mutex::new(ChatState::default())) }
    }

    pub async fn snapshot(&self) -> ChatState {
        self.state.lock().await.clone()
    }

    pub async fn open_conversation(&self) -> Option<OpenConversation> {
        self.state.lock().await.open
    }

    /// Get (or create server-side) the admin identity.
    pub async fn fetch_admin(&self) -> Result<User, StoreError> {
        let value = self.api.post(ADMIN_PATH, &Value::Object(serde_json::Map::new())).await?;
        let admin: User = decode(ADMIN_PATH, value)?;
        self.state.lock().await.admin = Some(admin.clone());
        Ok(admin)
    }

    /// Look up the visitor by email, creating it if absent.
    pub async fn fetch_or_create_user(&self, user: &NewUser) -> Result<User, StoreError> {
        let body = serde_json::to_value(user).map_err(StoreError::Encode)?;
        let value = self.api.post(USER_PATH, &body).await?;
        let user: User = decode(USER_PATH, value)?;
        self.state.lock().await.user = Some(user.clone());
        Ok(user)
    }

    /// Open (or reuse) the chat between the loaded visitor and the admin.
    ///
    /// Refreshes the admin first. Replaces the chat list with the single
    /// returned chat.
    pub async fn create_and_assign_chat(&self) -> Result<Chat, StoreError> {
        let admin = self.fetch_admin().await?;
        let user = self.state.lock().await.user.clone().ok_or(StoreError::MissingUser)?;

        let body = serde_json::to_value(NewChat { user_email: user.email, admin_email: admin.email })
            .map_err(StoreError::Encode)?;
        let value = self.api.post(CHATS_PATH, &body).await?;
        let chat: Chat = decode(CHATS_PATH, value)?;
        info!(chat_id = chat.id, "store: chat assigned");

        self.state.lock().await.chats = vec![chat.clone()];
        Ok(chat)
    }

    pub async fn fetch_chats(&self) -> Result<Vec<Chat>, StoreError> {
        let value = self.api.get(CHATS_PATH).await?;
        if !value.is_array() {
            return Err(StoreError::NotAList(CHATS_PATH.to_owned()));
        }
        let chats: Vec<Chat> = decode(CHATS_PATH, value)?;
        self.state.lock().await.chats = chats.clone();
        Ok(chats)
    }

    /// Delete a chat, then reload the chat list.
    pub async fn delete_chat(&self, chat_id: ChatId) -> Result<Vec<Chat>, StoreError> {
        self.api.delete(&chat_delete_path(chat_id)).await?;
        info!(chat_id, "store: chat deleted");
        self.fetch_chats().await
    }

    /// Open `chat_id` as `viewer_id` and load its messages.
    pub async fn fetch_messages(&self, chat_id: ChatId, viewer_id: UserId) -> Result<Vec<Message>, StoreError> {
        if chat_id <= 0 {
            return Err(StoreError::InvalidChatId(chat_id));
        }
        let target = {
            let mut state = self.state.lock().await;
            state.opens += 1;
            let target = OpenConversation { chat_id, viewer_id, generation: state.opens };
            state.open = Some(target);
            target
        };
        self.load_messages(target).await
    }

    /// Re-fetch messages for the open conversation.
    ///
    /// Returns the refreshed chat id, or `None` when no conversation is open.
    pub async fn refresh_open_conversation(&self) -> Result<Option<ChatId>, StoreError> {
        let Some(target) = self.open_conversation().await else {
            return Ok(None);
        };
        self.load_messages(target).await?;
        Ok(Some(target.chat_id))
    }

    /// Forget the open conversation; later signals refresh nothing.
    pub async fn close_conversation(&self) {
        let mut state = self.state.lock().await;
        state.open = None;
        state.messages.clear();
    }

    /// Post a message, then tell peers the chat changed.
    pub async fn send_message(&self, message: &NewMessage) -> Result<Message, StoreError> {
        let body = serde_json::to_value(message).map_err(StoreError::Encode)?;
        let value = self.api.post(MESSAGES_PATH, &body).await?;

        if !self.signals.notify(UPDATE_CHAT) {
            debug!(chat_id = message.chat_id, "store: channel not open, peers not notified");
        }
        decode(MESSAGES_PATH, value)
    }

    async fn load_messages(&self, target: OpenConversation) -> Result<Vec<Message>, StoreError> {
        let path = messages_path(target);
        let value = self.api.get(&path).await?;
        let messages: Vec<Message> = if value.is_array() { decode(&path, value)? } else { Vec::new() };

        let mut state = self.state.lock().await;
        if state.open == Some(target) {
            state.messages = messages.clone();
        } else {
            debug!(chat_id = target.chat_id, "store: discarding messages for a conversation no longer open");
        }
        Ok(messages)
    }
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Decode { path: path.to_owned(), source })
}


#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
