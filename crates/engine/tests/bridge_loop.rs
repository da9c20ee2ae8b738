//! Integration test: boots an in-process WebSocket server that plays the
//! protocol bridge, opens a real [`BridgeEngine`] session against it, and
//! asserts the full handshake + event + send cycle:
//! - `open` carries the session id and credentials
//! - `ready` completes the handshake
//! - `qr` / `creds_update` / `connection_open` / `connection_close` map to
//!   engine events in order
//! - `send_text` is correlated with `send_result`
//! - a dropped socket surfaces as `Closed(ConnectionLost)`

use std::net::SocketAddr;
use std::time::Duration;

use cb_domain::{CredentialBlob, DisconnectReason, SessionId};
use cb_engine::{BridgeEngine, BridgeSettings, EngineError, EngineEvent, ProtocolEngine};
use cb_protocol::BridgeMessage;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Handle to one accepted bridge connection.
struct BridgeConn {
    /// The `open` frame the gateway sent.
    open: BridgeMessage,
    /// Push frames to the gateway.
    send: mpsc::Sender<Option<BridgeMessage>>,
    /// Frames received from the gateway after the handshake.
    recv: mpsc::Receiver<BridgeMessage>,
}

/// Boots a tiny bridge on an ephemeral port.  `answer_ready = false`
/// accepts the socket but never completes the handshake.
async fn start_mini_bridge(answer_ready: bool) -> (SocketAddr, mpsc::Receiver<BridgeConn>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (conn_tx, conn_rx) = mpsc::channel(4);

    tokio::spawn(async move {
        while let Ok((stream, _peer)) = listener.accept().await {
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut stream) = ws.split();

                let open = loop {
                    match stream.next().await {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(msg @ BridgeMessage::Open { .. }) = serde_json::from_str(&text) {
                                break msg;
                            }
                        }
                        _ => return,
                    }
                };

                if !answer_ready {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    return;
                }

                let ready = BridgeMessage::Ready {
                    bridge_version: "0.0.0-test".into(),
                };
                sink.send(Message::Text(serde_json::to_string(&ready).unwrap()))
                    .await
                    .unwrap();

                // `None` on the push channel drops the socket.
                let (push_tx, mut push_rx) = mpsc::channel::<Option<BridgeMessage>>(16);
                let (from_gw_tx, from_gw_rx) = mpsc::channel::<BridgeMessage>(16);
                let _ = conn_tx
                    .send(BridgeConn {
                        open,
                        send: push_tx,
                        recv: from_gw_rx,
                    })
                    .await;

                loop {
                    tokio::select! {
                        pushed = push_rx.recv() => match pushed {
                            Some(Some(msg)) => {
                                let json = serde_json::to_string(&msg).unwrap();
                                if sink.send(Message::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                            _ => break,
                        },
                        incoming = stream.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                if let Ok(msg) = serde_json::from_str::<BridgeMessage>(&text) {
                                    let _ = from_gw_tx.send(msg).await;
                                }
                            }
                            Some(Ok(_)) => {}
                            _ => break,
                        },
                    }
                }
            });
        }
    });

    (addr, conn_rx)
}

fn engine_for(addr: SocketAddr, handshake: Duration) -> BridgeEngine {
    BridgeEngine::new(BridgeSettings {
        bridge_url: format!("ws://{addr}/sessions"),
        handshake_timeout: handshake,
        send_timeout: Duration::from_secs(5),
        heartbeat_interval: Duration::from_secs(30),
    })
}

async fn next_event(events: &mut mpsc::Receiver<EngineEvent>) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for engine event")
        .expect("event stream ended")
}

/// Next gateway frame that is not a heartbeat.
async fn next_frame(conn: &mut BridgeConn) -> BridgeMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), conn.recv.recv())
            .await
            .expect("timed out waiting for gateway frame")
            .expect("gateway stream ended");
        if !matches!(msg, BridgeMessage::Ping { .. } | BridgeMessage::Pong { .. }) {
            return msg;
        }
    }
}

#[tokio::test]
async fn full_session_lifecycle_over_bridge() {
    let (addr, mut conns) = start_mini_bridge(true).await;
    let engine = engine_for(addr, Duration::from_secs(5));
    let sid = SessionId::parse("1718000000000").unwrap();

    let mut conn = engine
        .open(&sid, CredentialBlob::unregistered())
        .await
        .expect("open should succeed");
    let mut bridge = conns.recv().await.unwrap();

    match &bridge.open {
        BridgeMessage::Open { session_id, credentials, .. } => {
            assert_eq!(session_id, "1718000000000");
            assert!(!credentials.is_registered());
        }
        other => panic!("expected open, got {other:?}"),
    }

    // ── Lifecycle frames map to events in order ────────────────────
    bridge
        .send
        .send(Some(BridgeMessage::Qr { token: "tok-1".into() }))
        .await
        .unwrap();
    bridge
        .send
        .send(Some(BridgeMessage::CredsUpdate {
            credentials: CredentialBlob::new(serde_json::json!({ "registered": true })),
        }))
        .await
        .unwrap();
    bridge.send.send(Some(BridgeMessage::ConnectionOpen)).await.unwrap();

    assert_eq!(next_event(&mut conn.events).await, EngineEvent::PairingToken("tok-1".into()));
    match next_event(&mut conn.events).await {
        EngineEvent::CredentialsChanged(blob) => {
            assert!(blob.is_registered());
            // Missing `me` is filled in on the way through.
            assert_eq!(blob.as_value()["me"]["id"], "");
        }
        other => panic!("expected credentials, got {other:?}"),
    }
    assert_eq!(next_event(&mut conn.events).await, EngineEvent::Opened);

    // ── send_text / send_result correlation ────────────────────────
    let handle = conn.handle.clone();
    let send = tokio::spawn(async move { handle.send_text("79991234567@s.whatsapp.net", "hi").await });

    let request_id = match next_frame(&mut bridge).await {
        BridgeMessage::SendText { request_id, to, text } => {
            assert_eq!(to, "79991234567@s.whatsapp.net");
            assert_eq!(text, "hi");
            request_id
        }
        other => panic!("expected send_text, got {other:?}"),
    };
    bridge
        .send
        .send(Some(BridgeMessage::SendResult {
            request_id,
            ok: true,
            error: None,
        }))
        .await
        .unwrap();
    send.await.unwrap().expect("send should succeed");

    // ── Rejected send surfaces the bridge's error ──────────────────
    let handle = conn.handle.clone();
    let send = tokio::spawn(async move { handle.send_text("nobody@s.whatsapp.net", "hi").await });
    let request_id = match next_frame(&mut bridge).await {
        BridgeMessage::SendText { request_id, .. } => request_id,
        other => panic!("expected send_text, got {other:?}"),
    };
    bridge
        .send
        .send(Some(BridgeMessage::SendResult {
            request_id,
            ok: false,
            error: Some("recipient not on network".into()),
        }))
        .await
        .unwrap();
    let err = send.await.unwrap().unwrap_err();
    assert!(matches!(err, EngineError::Send(m) if m == "recipient not on network"));

    // ── Logout close is classified ─────────────────────────────────
    bridge
        .send
        .send(Some(BridgeMessage::ConnectionClose {
            status_code: Some(401),
            message: Some("logged out".into()),
        }))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut conn.events).await,
        EngineEvent::Closed(DisconnectReason::LoggedOut)
    );
}

#[tokio::test]
async fn dropped_socket_is_connection_lost() {
    let (addr, mut conns) = start_mini_bridge(true).await;
    let engine = engine_for(addr, Duration::from_secs(5));
    let sid = SessionId::parse("s-drop").unwrap();

    let mut conn = engine.open(&sid, CredentialBlob::unregistered()).await.unwrap();
    let bridge = conns.recv().await.unwrap();

    bridge.send.send(None).await.unwrap();

    assert_eq!(
        next_event(&mut conn.events).await,
        EngineEvent::Closed(DisconnectReason::ConnectionLost)
    );
    // Sends after the drop fail fast.
    assert!(conn.handle.send_text("1@s.whatsapp.net", "x").await.is_err());
}

#[tokio::test]
async fn missing_ready_times_out() {
    let (addr, _conns) = start_mini_bridge(false).await;
    let engine = engine_for(addr, Duration::from_millis(200));
    let sid = SessionId::parse("s-slow").unwrap();

    let err = engine.open(&sid, CredentialBlob::unregistered()).await.err().unwrap();
    assert!(matches!(err, EngineError::Handshake(_)));
}

#[tokio::test]
async fn close_sends_goodbye_frame() {
    let (addr, mut conns) = start_mini_bridge(true).await;
    let engine = engine_for(addr, Duration::from_secs(5));
    let sid = SessionId::parse("s-close").unwrap();

    let conn = engine.open(&sid, CredentialBlob::unregistered()).await.unwrap();
    let mut bridge = conns.recv().await.unwrap();

    conn.handle.close();
    assert!(conn.handle.is_closed());
    assert!(matches!(next_frame(&mut bridge).await, BridgeMessage::Close));
}
