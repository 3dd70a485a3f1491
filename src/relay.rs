//! Development relay for the chat notification endpoint.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every session connects to the same non-room-scoped endpoint, `/ws/chat/`.
//! When any peer sends `{"action":"update_chat"}` the relay fans the same
//! signal out to every connected peer, sender included. Nothing is stored;
//! a peer that is not connected at fan-out time simply misses the signal.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register a per-connection sender under a fresh client ID
//! 2. Inbound text → decode → fan out `update_chat`, ignore the rest
//! 3. Close → deregister

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, mpsc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::signal::{Signal, SignalKind};

/// Path of the single well-known channel endpoint.
pub const CHANNEL_PATH: &str = "/ws/chat/";

const PEER_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to bind relay listener: {0}")]
    Bind(std::io::Error),
    #[error("relay server failed: {0}")]
    Serve(std::io::Error),
}

// =============================================================================
// STATE
// =============================================================================

/// Connected peers: client_id -> sender for outgoing signal text.
#[derive(Clone, Default)]
pub struct RelayState {
    pub peers: Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>,
}

impl RelayState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }
}

// =============================================================================
// ROUTER
// =============================================================================

pub fn app(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(CHANNEL_PATH, get(handle_ws))
        .route("/ws/chat", get(handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the relay on an already-bound listener until the server fails.
///
/// # Errors
///
/// Returns [`RelayError::Serve`] if the underlying server stops with an error.
pub async fn serve(listener: TcpListener, state: RelayState) -> Result<(), RelayError> {
    axum::serve(listener, app(state)).await.map_err(RelayError::Serve)
}

/// Bind `0.0.0.0:{port}` and serve the relay.
///
/// # Errors
///
/// Returns [`RelayError::Bind`] if the port cannot be bound.
pub async fn run(port: u16, state: RelayState) -> Result<(), RelayError> {
    let listener = TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(RelayError::Bind)?;
    info!(%port, path = CHANNEL_PATH, "relay listening");
    serve(listener, state).await
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn handle_ws(State(state): State<RelayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

async fn run_ws(mut socket: WebSocket, state: RelayState) {
    let client_id = Uuid::new_v4();
    let (client_tx, mut client_rx) = mpsc::channel::<String>(PEER_QUEUE_CAPACITY);
    state.peers.write().await.insert(client_id, client_tx);
    info!(%client_id, "relay: peer connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => handle_inbound_text(&state, client_id, text.as_str()).await,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(text) = client_rx.recv() => {
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.peers.write().await.remove(&client_id);
    info!(%client_id, "relay: peer disconnected");
}

async fn handle_inbound_text(state: &RelayState, client_id: Uuid, text: &str) {
    let signal = match Signal::decode(text) {
        Ok(signal) => signal,
        Err(e) => {
            warn!(%client_id, error = %e, "relay: invalid inbound signal");
            return;
        }
    };

    match signal.kind() {
        SignalKind::UpdateChat => broadcast(state, &Signal::update_chat()).await,
        SignalKind::Other(action) => debug!(%client_id, action, "relay: ignoring action"),
    }
}

/// Fan a signal out to every connected peer.
pub async fn broadcast(state: &RelayState, signal: &Signal) {
    let text = signal.encode();
    let peers = state.peers.read().await;
    for (client_id, tx) in peers.iter() {
        // Best-effort: a peer with a full queue misses this signal.
        if tx.try_send(text.clone()).is_err() {
            debug!(%client_id, "relay: peer queue full, signal skipped");
        }
    }
}


#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
