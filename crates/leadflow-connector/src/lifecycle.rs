// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection lifecycle of chat instances.
//!
//! State per instance: `disconnected → connecting → {scanning →} connected`,
//! back to `disconnected` on any transport close. A logged-out close purges
//! stored credentials; any other close reconnects after a randomized delay,
//! and a reconnect whose transport fails to open is retried the same way.
//! Each opened session gets a fresh epoch; events from a session whose epoch
//! is no longer current are ignored.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use rand::Rng;
use tokio::sync::{OnceCell, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use leadflow_config::model::ReconnectConfig;
use leadflow_core::traits::credentials::SESSION_KEY;
use leadflow_core::{
    AccountInfo, CloseReason, ConnectionState, ConnectionUpdate, CredentialStore, Instance,
    InstanceId, LeadStore, LeadflowError, LinkPhase, RawInbound, TransportConnector,
    TransportEvent, TransportSession,
};

use crate::buffer::{BufferAggregator, InboundContext};
use crate::dispatch::{FALLBACK_SCORE, RESTART_FALLBACK_NOTE};
use crate::inbound::{filter_inbound, personal_jid, phone_from_jid};
use crate::metrics;
use crate::registry::{LinkState, SessionRegistry};
use crate::tasks::BackgroundTasks;

const QR_WAIT: Duration = Duration::from_secs(10);
const QR_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Randomized reconnect delay: `base + uniform(0, jitter)`.
pub fn reconnect_delay(config: &ReconnectConfig) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=config.jitter_ms);
    Duration::from_millis(config.base_delay_ms + jitter)
}

/// Owns every transport session.
pub struct ConnectionManager {
    registry: Arc<SessionRegistry>,
    connector: Arc<dyn TransportConnector>,
    store: Arc<dyn LeadStore>,
    credentials: Arc<dyn CredentialStore>,
    aggregator: BufferAggregator,
    tasks: BackgroundTasks,
    reconnect: ReconnectConfig,
    restored: OnceCell<()>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        connector: Arc<dyn TransportConnector>,
        store: Arc<dyn LeadStore>,
        credentials: Arc<dyn CredentialStore>,
        aggregator: BufferAggregator,
        tasks: BackgroundTasks,
        reconnect: ReconnectConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            connector,
            store,
            credentials,
            aggregator,
            tasks,
            reconnect,
            restored: OnceCell::new(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn aggregator(&self) -> &BufferAggregator {
        &self.aggregator
    }

    /// Start or resume the instance's session. No-op while connecting or connected.
    ///
    /// If the instance is logged out, deleted or shut down while the transport
    /// is opening, the new session is closed and nothing is installed.
    pub async fn connect(self: &Arc<Self>, instance_id: &InstanceId) -> Result<(), LeadflowError> {
        if !self.registry.try_begin_connect(instance_id) {
            debug!(instance_id = %instance_id, "already connecting or connected");
            return Ok(());
        }
        let seen = self.registry.current_epoch(instance_id);
        let result = self.open_session(instance_id, seen).await;
        if result.is_err() && self.registry.is_current(instance_id, seen) {
            self.registry.set_link(instance_id, LinkState::Disconnected);
        }
        result
    }

    async fn open_session(
        self: &Arc<Self>,
        instance_id: &InstanceId,
        seen: u64,
    ) -> Result<(), LeadflowError> {
        let instance = self
            .store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| LeadflowError::NotFound {
                entity: "instance",
                id: instance_id.to_string(),
            })?;
        let credentials = self.credentials.get_all(instance_id).await?;
        let resumed = credentials.contains_key(SESSION_KEY);

        let handle = self.connector.open(instance_id, credentials).await?;
        let Some(epoch) =
            self.registry
                .install_if_current(instance_id, seen, handle.session.clone())
        else {
            debug!(instance_id = %instance_id, "instance changed while opening, discarding session");
            close_quietly(instance_id, handle.session.as_ref()).await;
            return Ok(());
        };
        // Shutdown cancels before it walks the live sessions.
        if self.cancel.is_cancelled() {
            if let Some(live) = self.registry.remove_session_if(instance_id, epoch) {
                close_quietly(instance_id, live.session.as_ref()).await;
            }
            self.registry.forget(instance_id);
            return Ok(());
        }
        info!(instance_id = %instance_id, epoch, resumed, "transport session opened");

        let pump = tokio::spawn(self.clone().run_pump(
            instance,
            epoch,
            handle.session,
            handle.events,
        ));
        self.registry
            .attach_pump(instance_id, epoch, pump.abort_handle());
        Ok(())
    }

    /// Current connection state.
    pub async fn status(self: &Arc<Self>, instance_id: &InstanceId) -> ConnectionState {
        self.ensure_restored().await;
        self.registry.state(instance_id)
    }

    /// Make sure a session exists and wait up to 10s for a QR code.
    pub async fn qr(self: &Arc<Self>, instance_id: &InstanceId) -> Result<Option<String>, LeadflowError> {
        self.ensure_restored().await;
        if self.registry.session(instance_id).is_none() {
            self.connect(instance_id).await?;
        }

        let mut waited = Duration::ZERO;
        while self.registry.qr(instance_id).is_none() && waited < QR_WAIT {
            tokio::time::sleep(QR_POLL_INTERVAL).await;
            waited += QR_POLL_INTERVAL;
        }
        Ok(self.registry.qr(instance_id))
    }

    /// Tear down the session and delete stored credentials.
    ///
    /// Transport logout errors are ignored.
    pub async fn logout(&self, instance_id: &InstanceId) -> Result<(), LeadflowError> {
        self.registry.invalidate(instance_id);
        if let Some(live) = self.registry.take_session(instance_id) {
            if let Err(e) = live.session.logout().await {
                debug!(instance_id = %instance_id, error = %e, "transport logout failed, ignoring");
            }
            live.abort_pump();
        }
        self.registry.forget(instance_id);
        self.credentials.delete_all(instance_id).await?;
        info!(instance_id = %instance_id, "instance logged out");
        Ok(())
    }

    /// Log out, then delete the instance record.
    pub async fn disconnect_and_delete(&self, instance_id: &InstanceId) -> Result<(), LeadflowError> {
        self.logout(instance_id).await?;
        self.store.delete_instance(instance_id).await?;
        info!(instance_id = %instance_id, "instance deleted");
        Ok(())
    }

    /// Send a text to a contact (bare phone or full address). Not retried.
    pub async fn send_text(
        self: &Arc<Self>,
        instance_id: &InstanceId,
        contact: &str,
        text: &str,
    ) -> Result<(), LeadflowError> {
        self.ensure_restored().await;
        let session = match self.registry.link(instance_id) {
            LinkState::Connected => self.registry.session(instance_id),
            _ => None,
        }
        .ok_or_else(|| LeadflowError::NotConnected {
            instance_id: instance_id.to_string(),
        })?;
        session.send_text(&personal_jid(contact), text).await
    }

    /// Startup reconciliation. Runs once; concurrent callers await the same run.
    pub async fn ensure_restored(self: &Arc<Self>) {
        self.restored.get_or_init(|| self.restore()).await;
    }

    async fn restore(self: &Arc<Self>) {
        match self
            .store
            .heal_pending_leads(FALLBACK_SCORE, RESTART_FALLBACK_NOTE)
            .await
        {
            Ok(0) => {}
            Ok(healed) => info!(healed, "healed leads left pending by a previous run"),
            Err(e) => error!(error = %e, "failed to heal pending leads"),
        }

        let instances = match self.credentials.instances_with_key(SESSION_KEY).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "failed to list stored sessions");
                return;
            }
        };
        if !instances.is_empty() {
            info!(count = instances.len(), "restoring sessions");
        }
        for instance_id in instances {
            let epoch = self.registry.current_epoch(&instance_id);
            self.tasks
                .spawn("restore-session", self.clone().resume(instance_id, epoch));
        }
    }

    /// Close every live session without logging out and drop in-flight buffers.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        for instance_id in self.registry.live_instances() {
            self.registry.invalidate(&instance_id);
            if let Some(live) = self.registry.take_session(&instance_id) {
                if let Err(e) = live.session.close().await {
                    warn!(instance_id = %instance_id, error = %e, "failed to close session");
                }
                live.abort_pump();
            }
            self.registry.forget(&instance_id);
        }
        self.aggregator.flush_all();
    }

    async fn run_pump(
        self: Arc<Self>,
        instance: Instance,
        epoch: u64,
        session: Arc<dyn TransportSession>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) {
        let id = instance.id.clone();
        while let Some(event) = events.recv().await {
            if !self.registry.is_current(&id, epoch) {
                debug!(instance_id = %id, epoch, "ignoring events from stale session");
                return;
            }
            match event {
                TransportEvent::Connection(update) => {
                    if self.on_connection_update(&id, epoch, update).await {
                        return;
                    }
                }
                TransportEvent::Message(raw) => self.on_message(&instance, &session, &raw),
                TransportEvent::Credentials { key, value } => {
                    self.on_credentials(&id, &key, value).await
                }
            }
        }

        if self.registry.is_current(&id, epoch) {
            self.on_close(
                &id,
                epoch,
                CloseReason::Other {
                    code: None,
                    message: "event stream ended".into(),
                },
            )
            .await;
        }
    }

    /// Returns true once the session closed.
    async fn on_connection_update(
        self: &Arc<Self>,
        id: &InstanceId,
        epoch: u64,
        update: ConnectionUpdate,
    ) -> bool {
        if let Some(qr) = update.qr {
            info!(instance_id = %id, "QR code generated");
            self.registry.set_qr(id, qr);
        }

        match update.phase {
            Some(LinkPhase::Open { jid, name }) => {
                let phone = phone_from_jid(&jid).to_string();
                let name = name.unwrap_or_default();
                info!(instance_id = %id, phone = %phone, name = %name, "instance connected");
                self.registry.clear_qr(id);
                self.registry.set_link(id, LinkState::Connected);
                self.registry.set_account(
                    id,
                    AccountInfo {
                        phone: phone.clone(),
                        name: name.clone(),
                        jid,
                    },
                );
                let display = (!name.is_empty()).then_some(name.as_str());
                if let Err(e) = self.store.update_instance_account(id, &phone, display).await {
                    warn!(instance_id = %id, error = %e, "failed to save account info");
                }
                false
            }
            Some(LinkPhase::Close) => {
                let reason = update.close_reason.unwrap_or(CloseReason::Other {
                    code: None,
                    message: "closed".into(),
                });
                self.on_close(id, epoch, reason).await;
                true
            }
            Some(LinkPhase::Connecting) | None => false,
        }
    }

    async fn on_close(self: &Arc<Self>, id: &InstanceId, epoch: u64, reason: CloseReason) {
        self.registry.remove_session_if(id, epoch);
        self.registry.forget(id);

        match reason {
            CloseReason::LoggedOut => {
                info!(instance_id = %id, "session logged out, clearing stored credentials");
                if let Err(e) = self.credentials.delete_all(id).await {
                    warn!(instance_id = %id, error = %e, "failed to clear credentials");
                }
            }
            CloseReason::Other { code, message } => {
                let delay = reconnect_delay(&self.reconnect);
                info!(
                    instance_id = %id,
                    code = ?code,
                    reason = %message,
                    delay_ms = delay.as_millis() as u64,
                    "connection closed, reconnecting"
                );
                metrics::record_reconnect();
                self.schedule_reconnect(id.clone(), epoch, delay);
            }
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, id: InstanceId, epoch: u64, delay: Duration) {
        let this = self.clone();
        self.tasks.spawn("reconnect", async move {
            tokio::select! {
                _ = this.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
            if !this.registry.is_current(&id, epoch) {
                debug!(instance_id = %id, "instance changed while waiting, reconnect skipped");
                return Ok(());
            }
            this.resume(id, epoch).await
        });
    }

    /// Reconnect an instance that lost its session under `epoch`. Transient
    /// failures schedule another attempt until the epoch moves on.
    // Boxed to break the connect -> pump -> reconnect -> connect type cycle.
    fn resume(self: Arc<Self>, id: InstanceId, epoch: u64) -> BoxFuture<'static, Result<(), LeadflowError>> {
        async move {
            match self.connect(&id).await {
                Err(e)
                    if e.is_transient()
                        && self.registry.is_current(&id, epoch)
                        && !self.cancel.is_cancelled() =>
                {
                    let delay = reconnect_delay(&self.reconnect);
                    warn!(
                        instance_id = %id,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "reconnect failed, retrying"
                    );
                    metrics::record_reconnect();
                    self.schedule_reconnect(id, epoch, delay);
                    Ok(())
                }
                other => other,
            }
        }
        .boxed()
    }

    fn on_message(&self, instance: &Instance, session: &Arc<dyn TransportSession>, raw: &RawInbound) {
        let own_phone = self.registry.account(&instance.id).map(|a| a.phone);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let Some(msg) = filter_inbound(raw, own_phone.as_deref(), now_ms) else {
            return;
        };
        debug!(
            instance_id = %instance.id,
            contact = %msg.contact,
            push_name = ?msg.push_name,
            "inbound message"
        );
        let ctx = InboundContext {
            tenant_id: instance.tenant_id.clone(),
            instance_id: instance.id.clone(),
            session: session.clone(),
        };
        self.aggregator.ingest(&ctx, msg);
    }

    async fn on_credentials(&self, id: &InstanceId, key: &str, value: Option<Vec<u8>>) {
        let result = match value {
            Some(bytes) => self.credentials.put(id, key, &bytes).await,
            None => self.credentials.delete(id, key).await,
        };
        if let Err(e) = result {
            warn!(instance_id = %id, key = %key, error = %e, "failed to persist credentials");
        }
    }
}

async fn close_quietly(id: &InstanceId, session: &dyn TransportSession) {
    if let Err(e) = session.close().await {
        debug!(instance_id = %id, error = %e, "failed to close discarded session");
    }
}
