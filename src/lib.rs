//! Live-chat client core: a realtime notification channel plus the
//! conversation store it keeps fresh.
//!
//! A session holds one WebSocket [`channel`] to the backend's chat endpoint.
//! Peers emit `{"action":"update_chat"}` after writing through the REST
//! [`gateway`]; every session's [`dispatch`] loop answers by re-fetching the
//! messages of its open conversation in the [`store`].

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod models;
pub mod relay;
pub mod session;
pub mod signal;
pub mod store;
pub mod views;
