// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat transport that talks to an external bridge sidecar over WebSocket.
//!
//! The sidecar owns the chat protocol (pairing, encryption, multi-device
//! sync). Each instance gets its own socket at `{url}/instances/{id}`; see
//! [`protocol`] for the frames. A socket that drops without the sidecar
//! reporting a close is surfaced as a non-logout close.

pub mod protocol;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use leadflow_config::model::BridgeConfig;
use leadflow_core::{
    AdapterType, HealthStatus, InstanceId, LeadflowError, PluginAdapter, StoredCredentials,
    TransportConnector, TransportEvent, TransportHandle, TransportSession,
};

use crate::protocol::{InboundFrame, OutboundFrame, dropped};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

fn transport_error(
    message: impl Into<String>,
    e: impl std::error::Error + Send + Sync + 'static,
) -> LeadflowError {
    LeadflowError::Transport {
        message: message.into(),
        source: Some(Box::new(e)),
    }
}

/// Opens one sidecar socket per instance.
pub struct BridgeConnector {
    base_url: String,
}

impl BridgeConnector {
    pub fn new(config: &BridgeConfig) -> Result<Self, LeadflowError> {
        let base_url = config.url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("ws://") || base_url.starts_with("wss://")) {
            return Err(LeadflowError::Config(format!(
                "bridge.url must be a ws:// or wss:// URL, got `{}`",
                config.url
            )));
        }
        Ok(Self { base_url })
    }

    pub fn instance_url(&self, instance_id: &InstanceId) -> String {
        format!("{}/instances/{}", self.base_url, instance_id)
    }
}

#[async_trait]
impl PluginAdapter for BridgeConnector {
    fn name(&self) -> &str {
        "bridge"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, LeadflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LeadflowError> {
        Ok(())
    }
}

#[async_trait]
impl TransportConnector for BridgeConnector {
    async fn open(
        &self,
        instance_id: &InstanceId,
        credentials: StoredCredentials,
    ) -> Result<TransportHandle, LeadflowError> {
        let url = self.instance_url(instance_id);
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| transport_error(format!("bridge connect to {url} failed"), e))?;
        let (mut sink, stream) = socket.split();

        let hello = serde_json::to_string(&OutboundFrame::hello(&credentials))
            .map_err(|e| transport_error("failed to encode hello frame", e))?;
        sink.send(Message::text(hello))
            .await
            .map_err(|e| transport_error("bridge handshake failed", e))?;
        info!(
            instance_id = %instance_id,
            resumed = !credentials.is_empty(),
            "bridge socket opened"
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let closing = CancellationToken::new();

        tokio::spawn(write_loop(
            instance_id.clone(),
            sink,
            command_rx,
            closing.clone(),
        ));
        tokio::spawn(read_loop(instance_id.clone(), stream, event_tx, closing.clone()));

        Ok(TransportHandle {
            session: Arc::new(BridgeSession {
                commands: command_tx,
                closing,
            }),
            events: event_rx,
        })
    }
}

/// Command side of one sidecar socket.
pub struct BridgeSession {
    commands: mpsc::Sender<OutboundFrame>,
    closing: CancellationToken,
}

impl BridgeSession {
    async fn submit(&self, frame: OutboundFrame) -> Result<(), LeadflowError> {
        self.commands
            .send(frame)
            .await
            .map_err(|_| LeadflowError::transport("bridge socket is closed"))
    }
}

#[async_trait]
impl TransportSession for BridgeSession {
    async fn send_text(&self, jid: &str, text: &str) -> Result<(), LeadflowError> {
        self.submit(OutboundFrame::SendText {
            jid: jid.to_string(),
            text: text.to_string(),
        })
        .await
    }

    async fn logout(&self) -> Result<(), LeadflowError> {
        self.submit(OutboundFrame::Logout).await
    }

    async fn close(&self) -> Result<(), LeadflowError> {
        self.closing.cancel();
        Ok(())
    }
}

async fn write_loop(
    instance_id: InstanceId,
    mut sink: SplitSink<Socket, Message>,
    mut commands: mpsc::Receiver<OutboundFrame>,
    closing: CancellationToken,
) {
    loop {
        tokio::select! {
            // Queued commands (a logout in particular) go out before the close.
            biased;
            frame = commands.recv() => {
                let Some(frame) = frame else { break };
                let text = match serde_json::to_string(&frame) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(instance_id = %instance_id, error = %e, "failed to encode bridge frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::text(text)).await {
                    warn!(instance_id = %instance_id, error = %e, "bridge write failed");
                    break;
                }
            }
            _ = closing.cancelled() => break,
        }
    }
    if let Err(e) = sink.send(Message::Close(None)).await {
        debug!(instance_id = %instance_id, error = %e, "bridge close frame not sent");
    }
    closing.cancel();
}

async fn read_loop(
    instance_id: InstanceId,
    mut stream: SplitStream<Socket>,
    events: mpsc::Sender<TransportEvent>,
    closing: CancellationToken,
) {
    let end = loop {
        let next = tokio::select! {
            _ = closing.cancelled() => return,
            next = stream.next() => next,
        };
        let text = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(frame))) => {
                break frame.map_or_else(
                    || dropped(None, "bridge closed the socket"),
                    |f| dropped(Some(f.code.into()), f.reason.as_str()),
                );
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break dropped(None, format!("bridge socket error: {e}")),
            None => break dropped(None, "bridge socket ended"),
        };

        let event = match InboundFrame::parse(text.as_str()).and_then(InboundFrame::into_event) {
            Ok(event) => event,
            Err(e) => {
                warn!(instance_id = %instance_id, error = %e, "ignoring bridge frame");
                continue;
            }
        };
        let is_close = matches!(
            &event,
            TransportEvent::Connection(update) if update.close_reason.is_some()
        );
        if events.send(event).await.is_err() {
            debug!(instance_id = %instance_id, "event consumer gone, closing bridge socket");
            closing.cancel();
            return;
        }
        if is_close {
            closing.cancel();
            return;
        }
    };

    closing.cancel();
    info!(instance_id = %instance_id, "bridge socket dropped");
    let _ = events.send(end).await;
}
