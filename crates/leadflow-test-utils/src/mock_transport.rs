// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport for deterministic connector tests.
//!
//! Every `open()` creates a fresh [`MockSession`] and keeps the sender half of
//! its event channel, so tests can drive the session with `emit_*` helpers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use leadflow_core::{
    AdapterType, CloseReason, ConnectionUpdate, HealthStatus, InstanceId, LeadflowError,
    LinkPhase, PluginAdapter, RawInbound, StoredCredentials, TransportConnector, TransportEvent,
    TransportHandle, TransportSession,
};

/// A session handed out by [`MockConnector`]. Records every command.
#[derive(Default)]
pub struct MockSession {
    sent: Mutex<Vec<(String, String)>>,
    logged_out: AtomicBool,
    closed: AtomicBool,
    fail_sends: AtomicBool,
}

impl MockSession {
    /// All `(jid, text)` pairs passed to `send_text()`.
    pub async fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    pub fn was_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make subsequent sends fail with a transport error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportSession for MockSession {
    async fn send_text(&self, jid: &str, text: &str) -> Result<(), LeadflowError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(LeadflowError::transport("mock send failure"));
        }
        self.sent.lock().await.push((jid.to_string(), text.to_string()));
        Ok(())
    }

    async fn logout(&self) -> Result<(), LeadflowError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), LeadflowError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct Opened {
    session: Arc<MockSession>,
    events: mpsc::Sender<TransportEvent>,
    credentials: StoredCredentials,
}

/// A transport whose sessions are driven by the test.
#[derive(Default)]
pub struct MockConnector {
    opened: Mutex<HashMap<InstanceId, Vec<Opened>>>,
    fail_open: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `open()` calls fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Number of sessions opened for an instance.
    pub async fn open_count(&self, instance_id: &InstanceId) -> usize {
        self.opened
            .lock()
            .await
            .get(instance_id)
            .map_or(0, Vec::len)
    }

    /// Credentials passed to the most recent `open()` for an instance.
    pub async fn last_credentials(&self, instance_id: &InstanceId) -> Option<StoredCredentials> {
        self.opened
            .lock()
            .await
            .get(instance_id)
            .and_then(|v| v.last())
            .map(|o| o.credentials.clone())
    }

    /// The most recently opened session for an instance.
    pub async fn latest_session(&self, instance_id: &InstanceId) -> Option<Arc<MockSession>> {
        self.opened
            .lock()
            .await
            .get(instance_id)
            .and_then(|v| v.last())
            .map(|o| o.session.clone())
    }

    /// Wait until at least `count` sessions were opened, polling every 10ms.
    pub async fn wait_for_opens(
        &self,
        instance_id: &InstanceId,
        count: usize,
        timeout: Duration,
    ) -> bool {
        tokio::time::timeout(timeout, async {
            while self.open_count(instance_id).await < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Push an event into the latest session. Returns false if nothing is open
    /// or the consumer went away.
    pub async fn emit(&self, instance_id: &InstanceId, event: TransportEvent) -> bool {
        let sender = self
            .opened
            .lock()
            .await
            .get(instance_id)
            .and_then(|v| v.last())
            .map(|o| o.events.clone());
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    pub async fn emit_qr(&self, instance_id: &InstanceId, qr: &str) -> bool {
        self.emit(
            instance_id,
            TransportEvent::Connection(ConnectionUpdate {
                qr: Some(qr.to_string()),
                ..Default::default()
            }),
        )
        .await
    }

    pub async fn emit_open(&self, instance_id: &InstanceId, jid: &str, name: Option<&str>) -> bool {
        self.emit(
            instance_id,
            TransportEvent::Connection(ConnectionUpdate {
                phase: Some(LinkPhase::Open {
                    jid: jid.to_string(),
                    name: name.map(str::to_string),
                }),
                ..Default::default()
            }),
        )
        .await
    }

    pub async fn emit_close(&self, instance_id: &InstanceId, reason: CloseReason) -> bool {
        self.emit(
            instance_id,
            TransportEvent::Connection(ConnectionUpdate {
                phase: Some(LinkPhase::Close),
                close_reason: Some(reason),
                ..Default::default()
            }),
        )
        .await
    }

    pub async fn emit_message(&self, instance_id: &InstanceId, raw: RawInbound) -> bool {
        self.emit(instance_id, TransportEvent::Message(raw)).await
    }
}

#[async_trait]
impl PluginAdapter for MockConnector {
    fn name(&self) -> &str {
        "mock-transport"
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
impl TransportConnector for MockConnector {
    async fn open(
        &self,
        instance_id: &InstanceId,
        credentials: StoredCredentials,
    ) -> Result<TransportHandle, LeadflowError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(LeadflowError::transport("mock open failure"));
        }
        let (tx, rx) = mpsc::channel(64);
        let session = Arc::new(MockSession::default());
        self.opened
            .lock()
            .await
            .entry(instance_id.clone())
            .or_default()
            .push(Opened {
                session: session.clone(),
                events: tx,
                credentials,
            });
        Ok(TransportHandle {
            session,
            events: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_records_session_and_routes_events() {
        let connector = MockConnector::new();
        let id = InstanceId("inst-1".into());
        let mut handle = connector.open(&id, StoredCredentials::new()).await.unwrap();

        assert_eq!(connector.open_count(&id).await, 1);
        assert!(connector.emit_qr(&id, "QR-1").await);
        match handle.events.recv().await {
            Some(TransportEvent::Connection(update)) => {
                assert_eq!(update.qr.as_deref(), Some("QR-1"))
            }
            other => panic!("unexpected event: {other:?}"),
        }

        handle.session.send_text("1@s.whatsapp.net", "hello").await.unwrap();
        let session = connector.latest_session(&id).await.unwrap();
        assert_eq!(
            session.sent_messages().await,
            vec![("1@s.whatsapp.net".to_string(), "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn fail_open_returns_transport_error() {
        let connector = MockConnector::new();
        connector.set_fail_open(true);
        let err = connector
            .open(&InstanceId("x".into()), StoredCredentials::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LeadflowError::Transport { .. }));
    }
}
