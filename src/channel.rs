//! Realtime notification channel: one WebSocket per session.
//!
//! DESIGN
//! ======
//! `Channel::connect` spawns a single connection task and returns immediately
//! with a cloneable handle and the inbound `SignalStream`. The task owns the
//! socket and runs a `select!` loop:
//! - Commands from handles (`notify`, `close`) → write to the socket
//! - Text frames from the server → decode → push onto the signal stream
//!
//! Connection status is published through a `watch` channel so callers
//! observe `connecting → open → closed` without blocking on `connect`.
//!
//! `notify` is at-most-once: it transmits only while the status is `open`
//! and never queues for later. Anything accepted while open but still unsent
//! when the socket drops is discarded, not replayed after a reconnect.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures are never returned to callers; they surface only as a
//! transition to `closed`. Malformed inbound payloads are logged and dropped
//! without touching the connection.
//!
//! RECONNECT
//! =========
//! Off by default: a dropped channel stays closed until the session calls
//! `connect` again. With `ChannelOptions::reconnect` set, the task waits with
//! exponential backoff and reconnects, keeping the same signal stream.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::config::Backoff;
use crate::signal::Signal;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// TYPES
// =============================================================================

/// Lifecycle status of the channel's transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Handshake in progress (initial state, and during reconnects).
    Connecting,
    /// Socket is open; `notify` transmits.
    Open,
    /// Socket is closed or failed; `notify` is a no-op.
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    /// `None` disables automatic reconnection.
    pub reconnect: Option<Backoff>,
}

/// Outbound side of the channel as seen by the conversation store.
pub trait SignalSink: Send + Sync {
    /// Fire-and-forget emit. Returns `true` if the signal was handed to an
    /// open transport.
    fn notify(&self, action: &str) -> bool;
}

enum Command {
    Send(String),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Transport dropped or failed; eligible for reconnect.
    Dropped,
    /// Explicit close or every handle dropped.
    Shutdown,
}

// =============================================================================
// HANDLE
// =============================================================================

/// Handle to the session's single realtime connection.
///
/// Clones share the same connection. Dropping every clone shuts it down.
#[derive(Clone)]
pub struct Channel {
    endpoint: Arc<str>,
    status: watch::Receiver<ConnectionStatus>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Channel {
    /// Open a channel to `endpoint` with reconnection disabled.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn connect(endpoint: impl Into<String>) -> (Self, SignalStream) {
        Self::connect_with(endpoint, ChannelOptions::default())
    }

    /// Open a channel to `endpoint`.
    ///
    /// Returns immediately with status `connecting`; the transition to
    /// `open` (or `closed` on failure) is observable via [`Channel::status`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn connect_with(endpoint: impl Into<String>, options: ChannelOptions) -> (Self, SignalStream) {
        let endpoint: Arc<str> = Arc::from(endpoint.into());
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_channel(Arc::clone(&endpoint), options, status_tx, command_rx, signal_tx));

        let channel = Self { endpoint, status: status_rx, commands: command_tx };
        (channel, SignalStream { rx: signal_rx })
    }

    /// Last-known server URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Emit `{"action": action}` if the channel is open; otherwise do nothing.
    pub fn notify(&self, action: &str) -> bool {
        if self.status() != ConnectionStatus::Open {
            debug!(action, endpoint = %self.endpoint, "channel: notify dropped, not open");
            return false;
        }
        self.commands.send(Command::Send(Signal::new(action).encode())).is_ok()
    }

    /// Send a close frame and stop the connection task. Idempotent.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Wait until the status equals `target`.
    ///
    /// Returns `false` if the connection task ended in a different state.
    pub async fn wait_for(&self, target: ConnectionStatus) -> bool {
        let mut rx = self.status.clone();
        rx.wait_for(|status| *status == target).await.is_ok()
    }

    /// Wait until the handshake resolves and return `Open` or `Closed`.
    pub async fn settled(&self) -> ConnectionStatus {
        let mut rx = self.status.clone();
        match rx.wait_for(|status| *status != ConnectionStatus::Connecting).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        }
    }
}

impl SignalSink for Channel {
    fn notify(&self, action: &str) -> bool {
        Channel::notify(self, action)
    }
}

// =============================================================================
// SIGNAL STREAM
// =============================================================================

/// Inbound signals in network arrival order.
///
/// Single consumer; ends when the connection task stops for good.
pub struct SignalStream {
    rx: mpsc::UnboundedReceiver<Signal>,
}

impl SignalStream {
    pub async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }

    /// Consume the stream on a spawned task, calling `handler` once per signal.
    pub fn on_signal<F>(mut self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(Signal) + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(signal) = self.rx.recv().await {
                handler(signal);
            }
        })
    }
}

#[cfg(test)]
impl SignalStream {
    /// Stream fed directly by the returned sender, with no socket behind it.
    pub(crate) fn test_pair() -> (mpsc::UnboundedSender<Signal>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

impl Stream for SignalStream {
    type Item = Signal;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Signal>> {
        self.rx.poll_recv(cx)
    }
}

// =============================================================================
// CONNECTION TASK
// =============================================================================

async fn run_channel(
    endpoint: Arc<str>,
    options: ChannelOptions,
    status: watch::Sender<ConnectionStatus>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    signals: mpsc::UnboundedSender<Signal>,
) {
    let mut delay = options.reconnect.map(|backoff| backoff.initial);

    loop {
        status.send_replace(ConnectionStatus::Connecting);
        info!(%endpoint, "channel: connecting");

        let connected = tokio::select! {
            result = connect_async(endpoint.as_ref()) => result,
            () = shutdown_requested(&mut commands) => {
                status.send_replace(ConnectionStatus::Closed);
                info!(%endpoint, "channel: closed before open");
                return;
            }
        };

        let end = match connected {
            Ok((stream, _)) => {
                status.send_replace(ConnectionStatus::Open);
                info!(%endpoint, "channel: open");
                if let Some(backoff) = options.reconnect {
                    delay = Some(backoff.initial);
                }
                pump(stream, &mut commands, &signals).await
            }
            Err(e) => {
                warn!(%endpoint, error = %e, "channel: connect failed");
                SessionEnd::Dropped
            }
        };

        status.send_replace(ConnectionStatus::Closed);

        let end = match end {
            SessionEnd::Dropped => discard_pending(&mut commands),
            SessionEnd::Shutdown => SessionEnd::Shutdown,
        };
        if end == SessionEnd::Shutdown {
            info!(%endpoint, "channel: closed");
            return;
        }

        let (Some(backoff), Some(wait)) = (options.reconnect, delay) else {
            info!(%endpoint, "channel: closed, reconnect disabled");
            return;
        };

        let delay_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        info!(%endpoint, delay_ms, "channel: reconnecting after backoff");
        if sleep_or_shutdown(wait, &mut commands).await {
            info!(%endpoint, "channel: closed during backoff");
            return;
        }
        delay = Some(backoff.next_delay(wait));
    }
}

/// Run one open connection until it drops or shutdown is requested.
async fn pump(
    stream: WsStream,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    signals: &mpsc::UnboundedSender<Signal>,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        warn!(error = %e, "channel: send failed");
                        return SessionEnd::Dropped;
                    }
                }
                Some(Command::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => forward_signal(text.as_str(), signals),
                Some(Ok(Message::Binary(bytes))) => {
                    warn!(len = bytes.len(), "channel: dropping binary frame");
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("channel: closed by peer");
                    return SessionEnd::Dropped;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "channel: transport error");
                    return SessionEnd::Dropped;
                }
            },
        }
    }
}

fn forward_signal(text: &str, signals: &mpsc::UnboundedSender<Signal>) {
    match Signal::decode(text) {
        Ok(signal) => {
            debug!(action = %signal.action, "channel: recv signal");
            if signals.send(signal).is_err() {
                debug!("channel: no signal consumer, dropping");
            }
        }
        Err(e) => warn!(error = %e, "channel: dropping malformed signal"),
    }
}

/// Drop sends queued against a connection that no longer exists.
fn discard_pending(commands: &mut mpsc::UnboundedReceiver<Command>) -> SessionEnd {
    let mut discarded = 0_usize;
    let end = loop {
        match commands.try_recv() {
            Ok(Command::Send(_)) => discarded += 1,
            Ok(Command::Close) | Err(mpsc::error::TryRecvError::Disconnected) => break SessionEnd::Shutdown,
            Err(mpsc::error::TryRecvError::Empty) => break SessionEnd::Dropped,
        }
    };
    if discarded > 0 {
        debug!(discarded, "channel: discarded unsent signals");
    }
    end
}

/// Resolves once `close()` is called or every handle is dropped.
/// Sends arriving in the meantime are discarded.
async fn shutdown_requested(commands: &mut mpsc::UnboundedReceiver<Command>) {
    loop {
        match commands.recv().await {
            Some(Command::Send(_)) => {}
            Some(Command::Close) | None => return,
        }
    }
}

async fn sleep_or_shutdown(wait: Duration, commands: &mut mpsc::UnboundedReceiver<Command>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(wait) => false,
        () = shutdown_requested(commands) => true,
    }
}


#[cfg(test)]
#[path = "channel_test.rs"]
mod tests;
