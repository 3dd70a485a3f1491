use super::*;
use super::test_helpers::{ServerSide, accept, raw_server};
use crate::relay::test_helpers::{spawn_relay, wait_for_peers};
use tokio::net::TcpListener;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_millis(1000);

async fn unreachable_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/ws/chat/")
}

async fn next_signal(signals: &mut SignalStream) -> Signal {
    timeout(WAIT, signals.recv())
        .await
        .expect("signal receive timed out")
        .expect("signal stream ended")
}

async fn server_text(server: &mut ServerSide, text: &str) {
    server.send(Message::Text(text.into())).await.unwrap();
}

/// Collect every text frame the server sees until the socket goes quiet or closes.
async fn drain_server_texts(server: &mut ServerSide) -> Vec<String> {
    let mut texts = Vec::new();
    while let Ok(Some(Ok(msg))) = timeout(Duration::from_millis(150), server.next()).await {
        if let Message::Text(text) = msg {
            texts.push(text.as_str().to_owned());
        }
    }
    texts
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn connect_returns_immediately_in_connecting_state() {
    let (url, _conns) = raw_server().await;
    let (channel, _signals) = Channel::connect(url.clone());
    assert_eq!(channel.status(), ConnectionStatus::Connecting);
    assert_eq!(channel.endpoint(), url);
}

#[tokio::test]
async fn connect_transitions_to_open() {
    let (url, mut conns) = raw_server().await;
    let (channel, _signals) = Channel::connect(url);
    let _server = accept(&mut conns).await;
    assert_eq!(timeout(WAIT, channel.settled()).await.unwrap(), ConnectionStatus::Open);
}

#[tokio::test]
async fn unreachable_endpoint_settles_closed() {
    let url = unreachable_endpoint().await;
    let (channel, mut signals) = Channel::connect(url);
    assert_eq!(timeout(WAIT, channel.settled()).await.unwrap(), ConnectionStatus::Closed);
    assert!(timeout(WAIT, signals.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn peer_drop_closes_without_reconnect() {
    let (url, mut conns) = raw_server().await;
    let (channel, mut signals) = Channel::connect(url);
    let server = accept(&mut conns).await;
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Open)).await.unwrap());

    drop(server);

    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Closed)).await.unwrap());
    assert!(timeout(WAIT, signals.recv()).await.unwrap().is_none());
    assert!(
        timeout(Duration::from_millis(150), conns.recv()).await.is_err(),
        "no reconnect attempt expected"
    );
}

#[tokio::test]
async fn close_sends_close_frame_and_ends_stream() {
    let (url, mut conns) = raw_server().await;
    let (channel, mut signals) = Channel::connect(url);
    let mut server = accept(&mut conns).await;
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Open)).await.unwrap());

    channel.close();

    let frame = timeout(WAIT, server.next()).await.unwrap();
    assert!(matches!(frame, Some(Ok(Message::Close(_)))), "got {frame:?}");
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Closed)).await.unwrap());
    assert!(timeout(WAIT, signals.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn dropping_every_handle_shuts_down() {
    let (url, mut conns) = raw_server().await;
    let (channel, mut signals) = Channel::connect(url);
    let mut server = accept(&mut conns).await;
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Open)).await.unwrap());

    let clone = channel.clone();
    drop(channel);
    assert_eq!(clone.status(), ConnectionStatus::Open);
    drop(clone);

    assert!(timeout(WAIT, signals.recv()).await.unwrap().is_none());
    let _ = drain_server_texts(&mut server).await;
}

#[tokio::test]
async fn reconnect_policy_opens_a_new_connection_after_drop() {
    let (url, mut conns) = raw_server().await;
    let options = ChannelOptions {
        reconnect: Some(Backoff { initial: Duration::from_millis(20), max: Duration::from_millis(50) }),
    };
    let (channel, mut signals) = Channel::connect_with(url, options);

    let first = accept(&mut conns).await;
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Open)).await.unwrap());
    drop(first);

    let mut second = accept(&mut conns).await;
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Open)).await.unwrap());

    // Same stream keeps delivering across the reconnect.
    server_text(&mut second, r#"{"action":"update_chat"}"#).await;
    assert_eq!(next_signal(&mut signals).await, Signal::update_chat());
}

#[tokio::test]
async fn close_during_backoff_stops_reconnecting() {
    let url = unreachable_endpoint().await;
    let options = ChannelOptions {
        reconnect: Some(Backoff { initial: Duration::from_secs(5), max: Duration::from_secs(5) }),
    };
    let (channel, mut signals) = Channel::connect_with(url, options);
    assert_eq!(timeout(WAIT, channel.settled()).await.unwrap(), ConnectionStatus::Closed);

    channel.close();
    assert!(timeout(WAIT, signals.recv()).await.unwrap().is_none());
}

// =============================================================================
// notify
// =============================================================================

#[tokio::test]
async fn notify_while_open_transmits_action_json() {
    let (url, mut conns) = raw_server().await;
    let (channel, _signals) = Channel::connect(url);
    let mut server = accept(&mut conns).await;
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Open)).await.unwrap());

    assert!(channel.notify("update_chat"));

    let frame = timeout(WAIT, server.next()).await.unwrap().unwrap().unwrap();
    let Message::Text(text) = frame else {
        panic!("expected text frame, got {frame:?}");
    };
    assert_eq!(Signal::decode(text.as_str()).unwrap(), Signal::update_chat());
}

#[tokio::test]
async fn notify_while_connecting_is_a_no_op() {
    let (url, _conns) = raw_server().await;
    let (channel, _signals) = Channel::connect(url);
    assert_eq!(channel.status(), ConnectionStatus::Connecting);
    assert!(!channel.notify("update_chat"));
}

#[tokio::test]
async fn notify_while_closed_transmits_nothing() {
    let (url, mut conns) = raw_server().await;
    let (channel, _signals) = Channel::connect(url);
    let mut server = accept(&mut conns).await;
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Open)).await.unwrap());

    channel.close();
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Closed)).await.unwrap());

    assert!(!channel.notify("update_chat"));
    assert!(!SignalSink::notify(&channel, "update_chat"));
    assert!(drain_server_texts(&mut server).await.is_empty());
}

#[tokio::test]
async fn notify_on_failed_channel_is_silent() {
    let url = unreachable_endpoint().await;
    let (channel, _signals) = Channel::connect(url);
    assert_eq!(timeout(WAIT, channel.settled()).await.unwrap(), ConnectionStatus::Closed);
    assert!(!channel.notify("update_chat"));
}

// =============================================================================
// Inbound signals
// =============================================================================

#[tokio::test]
async fn signals_arrive_in_order() {
    let (url, mut conns) = raw_server().await;
    let (channel, mut signals) = Channel::connect(url);
    let mut server = accept(&mut conns).await;
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Open)).await.unwrap());

    for i in 0..5 {
        server_text(&mut server, &format!(r#"{{"action":"a{i}"}}"#)).await;
    }
    for i in 0..5 {
        assert_eq!(next_signal(&mut signals).await.action, format!("a{i}"));
    }
}

#[tokio::test]
async fn malformed_payloads_are_dropped_without_closing() {
    let (url, mut conns) = raw_server().await;
    let (channel, mut signals) = Channel::connect(url);
    let mut server = accept(&mut conns).await;
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Open)).await.unwrap());

    server_text(&mut server, "not json").await;
    server_text(&mut server, r#"{"type":"chat_update"}"#).await;
    server_text(&mut server, r#"{"action":null}"#).await;
    server.send(Message::Binary(vec![1_u8, 2, 3].into())).await.unwrap();
    server_text(&mut server, r#"{"action":"update_chat"}"#).await;

    assert_eq!(next_signal(&mut signals).await, Signal::update_chat());
    assert_eq!(channel.status(), ConnectionStatus::Open);
}

#[tokio::test]
async fn array_payload_is_not_delivered_as_a_signal() {
    let (url, mut conns) = raw_server().await;
    let (channel, mut signals) = Channel::connect(url);
    let mut server = accept(&mut conns).await;
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Open)).await.unwrap());

    server_text(&mut server, r#"["update_chat"]"#).await;
    server_text(&mut server, r#"{"action":"noop_xyz"}"#).await;

    assert_eq!(next_signal(&mut signals).await.action, "noop_xyz");
    assert_eq!(channel.status(), ConnectionStatus::Open);
}

#[tokio::test]
async fn unknown_actions_are_delivered_and_connection_stays_open() {
    let (url, mut conns) = raw_server().await;
    let (channel, mut signals) = Channel::connect(url);
    let mut server = accept(&mut conns).await;
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Open)).await.unwrap());

    server_text(&mut server, r#"{"action":"noop_xyz"}"#).await;

    assert_eq!(next_signal(&mut signals).await.action, "noop_xyz");
    assert_eq!(channel.status(), ConnectionStatus::Open);
}

#[tokio::test]
async fn on_signal_invokes_handler_once_per_signal() {
    let (url, mut conns) = raw_server().await;
    let (channel, signals) = Channel::connect(url);
    let mut server = accept(&mut conns).await;
    assert!(timeout(WAIT, channel.wait_for(ConnectionStatus::Open)).await.unwrap());

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let _task = signals.on_signal(move |signal| {
        let _ = seen_tx.send(signal);
    });

    server_text(&mut server, r#"{"action":"update_chat"}"#).await;
    server_text(&mut server, r#"{"action":"new_chat"}"#).await;

    let first = timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.action, "update_chat");
    assert_eq!(second.action, "new_chat");
    assert!(timeout(Duration::from_millis(80), seen_rx.recv()).await.is_err());
}

// =============================================================================
// Through the relay
// =============================================================================

#[tokio::test]
async fn notify_from_one_session_reaches_the_other() {
    let (url, state) = spawn_relay().await;
    let (a, mut a_signals) = Channel::connect(url.clone());
    let (b, mut b_signals) = Channel::connect(url);
    assert!(timeout(WAIT, a.wait_for(ConnectionStatus::Open)).await.unwrap());
    assert!(timeout(WAIT, b.wait_for(ConnectionStatus::Open)).await.unwrap());
    wait_for_peers(&state, 2).await;

    assert!(b.notify("update_chat"));

    assert_eq!(next_signal(&mut a_signals).await, Signal::update_chat());
    assert_eq!(next_signal(&mut b_signals).await, Signal::update_chat());
}
