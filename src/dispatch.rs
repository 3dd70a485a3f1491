//! Signal dispatcher: inbound signals → targeted store refreshes.
//!
//! Exactly one dispatcher consumes a session's `SignalStream`, handling
//! signals strictly in arrival order. A refresh failure is returned from
//! [`Dispatcher::handle`]; the run loop logs it and moves on so one bad
//! request never stops later signals.

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::SignalStream;
use crate::models::ChatId;
use crate::signal::{Signal, SignalKind};
use crate::store::{ChatStore, StoreError};

/// What the dispatcher did with one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Messages for this chat were re-fetched.
    Refreshed(ChatId),
    /// `update_chat` arrived with no conversation open.
    NoConversation,
    /// Unrecognized action.
    Ignored(String),
}

#[derive(Clone)]
pub struct Dispatcher {
    store: ChatStore,
}

impl Dispatcher {
    #[must_use]
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }

    /// Handle one signal.
    ///
    /// # Errors
    ///
    /// Returns the store error if the refresh request fails.
    pub async fn handle(&self, signal: &Signal) -> Result<Dispatch, StoreError> {
        match signal.kind() {
            SignalKind::UpdateChat => match self.store.refresh_open_conversation().await? {
                Some(chat_id) => {
                    debug!(chat_id, "dispatch: refreshed open conversation");
                    Ok(Dispatch::Refreshed(chat_id))
                }
                None => {
                    debug!("dispatch: update_chat with no open conversation");
                    Ok(Dispatch::NoConversation)
                }
            },
            SignalKind::Other(action) => {
                info!(action, "dispatch: unknown action received");
                Ok(Dispatch::Ignored(action.to_owned()))
            }
        }
    }

    /// Consume `signals` until the stream ends.
    pub async fn run(self, mut signals: SignalStream) {
        while let Some(signal) = signals.recv().await {
            if let Err(e) = self.handle(&signal).await {
                warn!(action = %signal.action, error = %e, "dispatch: refresh failed");
            }
        }
        debug!("dispatch: signal stream ended");
    }

    pub fn spawn(self, signals: SignalStream) -> JoinHandle<()> {
        tokio::spawn(self.run(signals))
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
