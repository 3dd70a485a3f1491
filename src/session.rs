//! Chat session: channel, gateway, store and dispatcher wired together.
//!
//! LIFECYCLE
//! =========
//! `start` opens the channel, builds the store on top of the gateway with the
//! session's channel slot as its signal sink, and spawns the dispatcher on
//! the channel's signal stream. `reconnect` replaces the channel in that slot
//! and respawns the dispatcher, so the store keeps its state across a drop.
//! `shutdown` (or dropping the session) closes the channel; the dispatcher
//! exits once the stream drains.

use std::sync::{Arc, RwLock};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::channel::{Channel, ChannelOptions, SignalSink};
use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::gateway::{Gateway, GatewayError, RestApi};
use crate::store::ChatStore;

/// Sink the store notifies through; follows the session's current channel.
struct ChannelSlot {
    current: RwLock<Channel>,
}

impl ChannelSlot {
    fn replace(&self, channel: Channel) {
        match self.current.write() {
            Ok(mut current) => *current = channel,
            Err(poisoned) => *poisoned.into_inner() = channel,
        }
    }
}

impl SignalSink for ChannelSlot {
    fn notify(&self, action: &str) -> bool {
        match self.current.read() {
            Ok(channel) => channel.notify(action),
            Err(poisoned) => poisoned.into_inner().notify(action),
        }
    }
}

pub struct ChatSession {
    endpoint: String,
    options: ChannelOptions,
    channel: Channel,
    slot: Arc<ChannelSlot>,
    store: ChatStore,
    dispatch: Option<JoinHandle<()>>,
}

impl ChatSession {
    /// Start a session against the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built from `config`.
    pub fn start(config: &ClientConfig) -> Result<Self, GatewayError> {
        let gateway = Gateway::new(config)?;
        Ok(Self::with_api(config, Arc::new(gateway)))
    }

    /// Start a session with a caller-supplied gateway.
    #[must_use]
    pub fn with_api(config: &ClientConfig, api: Arc<dyn RestApi>) -> Self {
        let options = ChannelOptions { reconnect: config.reconnect };
        let (channel, signals) = Channel::connect_with(config.ws_url.clone(), options);
        let slot = Arc::new(ChannelSlot { current: RwLock::new(channel.clone()) });
        let store = ChatStore::new(api, slot.clone());
        let dispatch = Dispatcher::new(store.clone()).spawn(signals);
        info!(endpoint = %config.ws_url, "session: started");
        Self {
            endpoint: config.ws_url.clone(),
            options,
            channel,
            slot,
            store,
            dispatch: Some(dispatch),
        }
    }

    #[must_use]
    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Replace the channel with a fresh connection to the same endpoint.
    ///
    /// The store keeps its user, chats and open conversation; later signals
    /// on the new connection refresh it as before.
    pub fn reconnect(&mut self) {
        self.channel.close();
        if let Some(old) = self.dispatch.take() {
            old.abort();
        }

        let (channel, signals) = Channel::connect_with(self.endpoint.clone(), self.options);
        self.slot.replace(channel.clone());
        self.channel = channel;
        self.dispatch = Some(Dispatcher::new(self.store.clone()).spawn(signals));
        info!(endpoint = %self.endpoint, "session: reconnecting");
    }

    /// Close the channel and wait for the dispatcher to finish.
    pub async fn shutdown(mut self) {
        self.channel.close();
        if let Some(dispatch) = self.dispatch.take() {
            if let Err(e) = dispatch.await {
                warn!(error = %e, "session: dispatcher task failed");
            }
        }
        info!("session: shut down");
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.channel.close();
        if let Some(dispatch) = self.dispatch.take() {
            dispatch.abort();
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
