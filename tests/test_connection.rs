//! Integration tests for the connection task
//!
//! Reconnect timing runs on paused tokio time.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{MockTransport, Remote, init_logging, settle, ws_url};
use guard_dispatch::{
    CloseCode, ConnectionEvent, ConnectionHandle, ConnectionManager, ConnectionState, GuardId,
    GuardStatus, OutboundMessage, UrlSource,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const RECONNECT: Duration = Duration::from_secs(5);

fn spawn() -> (ConnectionHandle, Remote, mpsc::UnboundedReceiver<Value>) {
    init_logging();
    let (transport, remote) = MockTransport::new();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let handle = ConnectionManager::spawn(transport, RECONNECT, inbound_tx, CancellationToken::new());
    (handle, remote, inbound_rx)
}

#[tokio::test(start_paused = true)]
async fn test_server_close_reconnects_once_after_delay() {
    let (conn, remote, _inbound) = spawn();
    let mut events = conn.subscribe();

    conn.connect(ws_url()).await.unwrap();
    assert!(conn.status().is_connected());
    assert!(!conn.status().handshake_pending);
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Opened);

    remote.drop_channel(Some(1006));
    settle().await;

    let status = conn.status();
    assert_eq!(status.state, ConnectionState::Connecting);
    assert!(status.handshake_pending);
    assert!(matches!(
        events.recv().await.unwrap(),
        ConnectionEvent::Closed { code: Some(1006), .. }
    ));
    assert_eq!(
        events.recv().await.unwrap(),
        ConnectionEvent::ReconnectScheduled { delay: RECONNECT }
    );

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(remote.connects(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(remote.connects(), 2);
    assert!(conn.status().is_connected());
    // The gate stays raised until the server's `connected` frame
    assert!(conn.status().handshake_pending);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(remote.connects(), 2);
    assert_eq!(remote.overlapping_connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_reconnect_after_disconnect() {
    let (conn, remote, _inbound) = spawn();

    conn.connect(ws_url()).await.unwrap();
    conn.disconnect().await.unwrap();

    assert_eq!(conn.status().state, ConnectionState::Disconnected);
    assert!(!remote.is_open());
    assert_eq!(remote.closes(), vec![CloseCode::NORMAL]);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(remote.connects(), 1);
    assert_eq!(conn.status().state, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let (conn, remote, _inbound) = spawn();

    conn.connect(ws_url()).await.unwrap();
    remote.drop_channel(None);
    settle().await;
    assert_eq!(conn.status().state, ConnectionState::Connecting);

    tokio::time::sleep(Duration::from_secs(2)).await;
    conn.disconnect().await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(remote.connects(), 1);
    assert_eq!(conn.status().state, ConnectionState::Disconnected);
    assert!(!conn.status().handshake_pending);
}

#[tokio::test(start_paused = true)]
async fn test_logout_close_code_is_used_once() {
    let (conn, remote, _inbound) = spawn();

    conn.connect(ws_url()).await.unwrap();
    conn.set_close_code(CloseCode::LOGOUT);
    conn.disconnect().await.unwrap();
    assert_eq!(remote.closes(), vec![CloseCode::LOGOUT]);

    conn.connect(ws_url()).await.unwrap();
    conn.disconnect().await.unwrap();
    assert_eq!(remote.closes(), vec![CloseCode::LOGOUT, CloseCode::NORMAL]);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_connected_keeps_single_channel() {
    let (conn, remote, _inbound) = spawn();

    conn.connect(ws_url()).await.unwrap();
    conn.connect(ws_url()).await.unwrap();
    conn.connect(ws_url()).await.unwrap();

    assert_eq!(remote.connects(), 1);
    assert_eq!(remote.overlapping_connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_retries_after_delay() {
    let (conn, remote, _inbound) = spawn();
    remote.fail_next_connects(2);

    assert!(conn.connect(ws_url()).await.is_err());
    assert_eq!(conn.status().state, ConnectionState::Connecting);

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(remote.connects(), 2);
    assert!(!conn.status().is_connected());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(remote.connects(), 3);
    assert!(conn.status().is_connected());
    assert_eq!(remote.overlapping_connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_only_while_connected() {
    let (conn, remote, _inbound) = spawn();
    let message = OutboundMessage::status(GuardId::new(3), GuardStatus::Available);

    assert!(!conn.send(&message).await);

    conn.connect(ws_url()).await.unwrap();
    assert!(conn.send(&message).await);
    assert_eq!(remote.sent(), vec![json!({"guardId": 3, "status": 0})]);

    remote.drop_channel(None);
    settle().await;
    assert!(!conn.send(&message).await);
    assert_eq!(remote.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_frames_are_forwarded() {
    let (conn, remote, mut inbound) = spawn();

    conn.connect(ws_url()).await.unwrap();
    assert!(remote.push(json!({"status": "connected"})));

    let frame = inbound.recv().await.unwrap();
    assert_eq!(frame, json!({"status": "connected"}));
}

#[tokio::test(start_paused = true)]
async fn test_release_handshake_lowers_gate() {
    let (conn, remote, _inbound) = spawn();

    conn.connect(ws_url()).await.unwrap();
    remote.drop_channel(None);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert!(conn.status().handshake_pending);

    conn.release_handshake();
    settle().await;
    assert!(!conn.status().handshake_pending);
    assert!(!conn.status().is_connecting());
}

#[tokio::test(start_paused = true)]
async fn test_slow_handshake_does_not_hold_up_sends() {
    let (conn, remote, _inbound) = spawn();
    let message = OutboundMessage::status(GuardId::new(3), GuardStatus::Available);
    conn.connect(ws_url()).await.unwrap();

    remote.slow_connects(Duration::from_secs(10));
    remote.drop_channel(Some(1006));
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert!(conn.status().is_connecting());

    let before = tokio::time::Instant::now();
    assert!(!conn.send(&message).await);
    assert!(before.elapsed() < Duration::from_secs(1));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(conn.status().is_connected());
    assert!(conn.send(&message).await);
    assert_eq!(remote.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_slow_handshake() {
    let (conn, remote, _inbound) = spawn();
    remote.slow_connects(Duration::from_secs(10));

    let pending = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.connect(ws_url()).await })
    };
    settle().await;
    assert!(conn.status().is_connecting());

    let before = tokio::time::Instant::now();
    conn.disconnect().await.unwrap();
    assert!(before.elapsed() < Duration::from_secs(1));

    assert!(pending.await.unwrap().is_err());
    assert_eq!(conn.status().state, ConnectionState::Disconnected);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(remote.connects(), 0);
    assert!(!remote.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_url_is_rebuilt_for_every_attempt() {
    let (conn, remote, _inbound) = spawn();
    let attempts = Arc::new(AtomicUsize::new(0));
    let source: UrlSource = {
        let attempts = Arc::clone(&attempts);
        Arc::new(move || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let mut url = ws_url();
            url.query_pairs_mut().append_pair("token", &format!("token-{n}"));
            Ok(url)
        })
    };

    conn.connect_with(source).await.unwrap();
    assert_eq!(remote.last_token().as_deref(), Some("token-1"));

    remote.drop_channel(Some(1006));
    tokio::time::sleep(Duration::from_millis(5_100)).await;

    assert!(conn.status().is_connected());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(remote.last_token().as_deref(), Some("token-2"));
}
