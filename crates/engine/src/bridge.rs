//! WebSocket bridge engine: opens one connection per session to an
//! external protocol bridge and translates its frames into [`EngineEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cb_domain::config::EngineConfig;
use cb_domain::{CredentialBlob, DisconnectReason, SessionId};
use cb_protocol::{BridgeMessage, MAX_FRAME_BYTES, PROTOCOL_VERSION};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::types::{EngineConnection, EngineError, EngineEvent, EngineHandle, ProtocolEngine};

type PendingSends = Arc<Mutex<HashMap<String, oneshot::Sender<Result<(), String>>>>>;

/// Tunables for [`BridgeEngine`].
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub bridge_url: String,
    pub handshake_timeout: Duration,
    pub send_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl From<&EngineConfig> for BridgeSettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            bridge_url: cfg.bridge_url.clone(),
            handshake_timeout: Duration::from_secs(cfg.handshake_timeout_secs),
            send_timeout: Duration::from_secs(cfg.send_timeout_secs),
            heartbeat_interval: Duration::from_secs(cfg.heartbeat_secs.max(1)),
        }
    }
}

/// Protocol engine backed by an external bridge process.
pub struct BridgeEngine {
    settings: BridgeSettings,
}

impl BridgeEngine {
    pub fn new(settings: BridgeSettings) -> Self {
        Self { settings }
    }

    /// Build the per-session connection URL.
    fn session_url(&self, session_id: &SessionId) -> String {
        let base = &self.settings.bridge_url;
        let sep = if base.contains('?') { "&" } else { "?" };
        format!("{base}{sep}session_id={session_id}")
    }
}

#[async_trait::async_trait]
impl ProtocolEngine for BridgeEngine {
    async fn open(
        &self,
        session_id: &SessionId,
        credentials: CredentialBlob,
    ) -> Result<EngineConnection, EngineError> {
        let url = self.session_url(session_id);
        tracing::debug!(url = %url, session_id = %session_id, "connecting to protocol bridge");

        let (ws, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| EngineError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        // ── Send open ───────────────────────────────────────────────
        let open = BridgeMessage::Open {
            protocol_version: PROTOCOL_VERSION,
            session_id: session_id.to_string(),
            credentials,
        };
        let json = serde_json::to_string(&open).map_err(|e| EngineError::Handshake(e.to_string()))?;
        sink.send(Message::Text(json))
            .await
            .map_err(|e| EngineError::Connect(e.to_string()))?;

        // ── Wait for ready ──────────────────────────────────────────
        let ready = tokio::time::timeout(self.settings.handshake_timeout, async {
            while let Some(Ok(msg)) = stream.next().await {
                if let Message::Text(text) = msg {
                    if let Ok(BridgeMessage::Ready { bridge_version }) = serde_json::from_str(&text) {
                        return Ok(bridge_version);
                    }
                }
            }
            Err(EngineError::Handshake("connection closed before ready".into()))
        })
        .await;

        let bridge_version = match ready {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(EngineError::Handshake("ready timeout".into())),
        };

        tracing::info!(
            session_id = %session_id,
            bridge_version = %bridge_version,
            "protocol bridge accepted session"
        );

        // ── Connection tasks ────────────────────────────────────────
        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(64);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<BridgeMessage>(64);
        let pending: PendingSends = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        // Writer task: serializes outbound frames; says goodbye on close.
        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = outbound_rx.recv() => {
                        let Some(msg) = msg else { break };
                        let json = match serde_json::to_string(&msg) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!(error = %e, "failed to serialize outbound frame");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    _ = writer_cancel.cancelled() => {
                        if let Ok(json) = serde_json::to_string(&BridgeMessage::Close) {
                            let _ = sink.send(Message::Text(json)).await;
                        }
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        });

        // Ping task: keeps idle connections alive through proxies.
        let ping_tx = outbound_tx.clone();
        let ping_cancel = cancel.clone();
        let ping_interval = self.settings.heartbeat_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ping_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let msg = BridgeMessage::Ping {
                            timestamp: Utc::now().timestamp_millis(),
                        };
                        if ping_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    _ = ping_cancel.cancelled() => break,
                }
            }
        });

        // Reader task: maps bridge frames onto the event stream.
        let reader_cancel = cancel.clone();
        let reader_pending = pending.clone();
        let reader_outbound = outbound_tx.clone();
        let sid = session_id.clone();
        let reader_span = tracing::info_span!("bridge_connection", session_id = %session_id);
        tokio::spawn(async move {
            let mut close_seen = false;
            loop {
                let msg = tokio::select! {
                    msg = stream.next() => msg,
                    _ = reader_cancel.cancelled() => break,
                };
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(session_id = %sid, error = %e, "bridge read error");
                        break;
                    }
                };

                if text.len() > MAX_FRAME_BYTES {
                    tracing::warn!(
                        session_id = %sid,
                        bytes = text.len(),
                        max = MAX_FRAME_BYTES,
                        "bridge frame exceeds size limit, dropping"
                    );
                    continue;
                }

                let event = match serde_json::from_str::<BridgeMessage>(&text) {
                    Ok(BridgeMessage::Qr { token }) => EngineEvent::PairingToken(token),
                    Ok(BridgeMessage::ConnectionOpen) => EngineEvent::Opened,
                    Ok(BridgeMessage::ConnectionClose { status_code, message }) => {
                        close_seen = true;
                        EngineEvent::Closed(DisconnectReason::from_status_code(status_code, message))
                    }
                    Ok(BridgeMessage::CredsUpdate { credentials }) => {
                        EngineEvent::CredentialsChanged(credentials.normalized())
                    }
                    Ok(BridgeMessage::SendResult { request_id, ok, error }) => {
                        if let Some(tx) = reader_pending.lock().remove(&request_id) {
                            let outcome = if ok {
                                Ok(())
                            } else {
                                Err(error.unwrap_or_else(|| "send rejected".into()))
                            };
                            let _ = tx.send(outcome);
                        }
                        continue;
                    }
                    Ok(BridgeMessage::Ping { timestamp }) => {
                        let _ = reader_outbound.send(BridgeMessage::Pong { timestamp }).await;
                        continue;
                    }
                    Ok(BridgeMessage::Pong { .. }) => {
                        tracing::trace!(session_id = %sid, "received pong");
                        continue;
                    }
                    Ok(other) => {
                        tracing::debug!(session_id = %sid, frame = ?other, "ignoring bridge frame");
                        continue;
                    }
                    Err(e) => {
                        tracing::debug!(session_id = %sid, error = %e, "failed to parse bridge frame");
                        continue;
                    }
                };

                if event_tx.send(event).await.is_err() || close_seen {
                    break;
                }
            }

            let lost = !close_seen && !reader_cancel.is_cancelled();
            reader_cancel.cancel();
            // Dropping the senders fails every in-flight send with `Closed`.
            reader_pending.lock().clear();

            if lost {
                let _ = event_tx
                    .send(EngineEvent::Closed(DisconnectReason::ConnectionLost))
                    .await;
            }
        }
        .instrument(reader_span));

        let handle = BridgeHandle {
            outbound: outbound_tx,
            pending,
            send_timeout: self.settings.send_timeout,
            cancel,
        };

        Ok(EngineConnection {
            handle: Arc::new(handle),
            events: event_rx,
        })
    }
}

/// Outbound side of one bridge connection.
struct BridgeHandle {
    outbound: mpsc::Sender<BridgeMessage>,
    pending: PendingSends,
    send_timeout: Duration,
    cancel: CancellationToken,
}

#[async_trait::async_trait]
impl EngineHandle for BridgeHandle {
    async fn send_text(&self, address: &str, text: &str) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Closed);
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        let frame = BridgeMessage::SendText {
            request_id: request_id.clone(),
            to: address.to_owned(),
            text: text.to_owned(),
        };
        if self.outbound.send(frame).await.is_err() {
            self.pending.lock().remove(&request_id);
            return Err(EngineError::Closed);
        }

        match tokio::time::timeout(self.send_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(EngineError::Send(message)),
            Ok(Err(_)) => Err(EngineError::Closed),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(EngineError::Timeout(format!(
                    "no send_result within {}s",
                    self.send_timeout.as_secs()
                )))
            }
        }
    }

    fn close(&self) {
        self.cancel.cancel();
    }

    fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
