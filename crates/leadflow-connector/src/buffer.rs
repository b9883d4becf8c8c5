// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-contact debounce of inbound chat messages.
//!
//! A buffer moves through these states per `(tenant, contact)`:
//!
//! - **absent**: the first message reserves a buffer synchronously, then a
//!   background task checks the store for an existing lead, creates a
//!   `Pending` lead and sends the welcome message. The triggering message is
//!   not part of the conversation.
//! - **waiting**: the next message is appended and starts the quiet-period
//!   timer.
//! - **active**: each message is appended (exact repeats within the duplicate
//!   window are dropped) and re-arms the timer, unless the buffer hit its
//!   message cap or maximum age, which flushes it immediately.
//! - **flushing**: the buffer is removed from the map in the same critical
//!   section that decided to flush, and handed to qualification.
//!
//! Timers are only armed once the lead id is known.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use leadflow_config::model::BufferConfig;
use leadflow_core::types::config_keys;
use leadflow_core::{
    ContactFields, ContactId, InstanceId, LeadId, LeadStatus, LeadStore, LeadflowError, NewLead,
    TenantId, TransportSession,
};

use crate::inbound::{InboundText, personal_jid};
use crate::metrics;
use crate::tasks::BackgroundTasks;
use crate::welcome::welcome_for;

/// Source label of chat-originated leads.
pub const CHAT_SOURCE: &str = "Chat";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferKey {
    pub tenant_id: TenantId,
    pub contact: ContactId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedMessage {
    pub text: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Lead created, no conversation yet.
    Waiting,
    /// Collecting messages; the quiet-period timer runs once the lead id is known.
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The quiet period elapsed.
    Quiet,
    MaxMessages,
    MaxAge,
}

impl FlushReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quiet => "quiet",
            Self::MaxMessages => "max_messages",
            Self::MaxAge => "max_age",
        }
    }
}

/// Where an inbound message arrived.
#[derive(Clone)]
pub struct InboundContext {
    pub tenant_id: TenantId,
    pub instance_id: InstanceId,
    /// The session that delivered the message; used for the welcome reply.
    pub session: Arc<dyn TransportSession>,
}

/// A flushed buffer, ready for qualification.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedConversation {
    pub tenant_id: TenantId,
    pub instance_id: InstanceId,
    pub contact: ContactId,
    pub lead_id: LeadId,
    pub push_name: String,
    pub messages: Vec<BufferedMessage>,
    pub reason: FlushReason,
}

impl CompletedConversation {
    /// Message texts joined by newlines, in arrival order.
    pub fn conversation_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Read-only view of a live buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSnapshot {
    pub instance_id: InstanceId,
    pub lead_id: Option<LeadId>,
    pub push_name: String,
    pub messages: Vec<BufferedMessage>,
    pub mode: BufferMode,
    pub timeout: Duration,
    pub timer_armed: bool,
}

struct ContactBuffer {
    /// Identity of this buffer; a new buffer for the same key gets a new one.
    generation: u64,
    /// Identity of the currently armed timer.
    arm_token: u64,
    instance_id: InstanceId,
    lead_id: Option<LeadId>,
    push_name: String,
    messages: Vec<BufferedMessage>,
    mode: BufferMode,
    timeout: Duration,
    started_at: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

impl ContactBuffer {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Used when neither the tenant value nor the configured default fits a `Duration`.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Quiet period from the tenant's `buffer_timeout_minutes` value.
///
/// Missing, unparseable or unrepresentably large values use the configured
/// default; the result is never below the configured floor.
pub fn timeout_from_minutes(value: Option<&str>, config: &BufferConfig) -> Duration {
    let to_duration = |minutes: f64| {
        Duration::try_from_secs_f64(minutes.max(config.min_timeout_minutes) * 60.0).ok()
    };
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|m| m.is_finite())
        .and_then(to_duration)
        .or_else(|| to_duration(config.default_timeout_minutes))
        .unwrap_or(FALLBACK_TIMEOUT)
}

/// Owns every contact buffer and its timer.
#[derive(Clone)]
pub struct BufferAggregator {
    inner: Arc<Inner>,
}

struct Inner {
    buffers: DashMap<BufferKey, ContactBuffer>,
    ids: AtomicU64,
    store: Arc<dyn LeadStore>,
    tasks: BackgroundTasks,
    config: BufferConfig,
    completed: mpsc::UnboundedSender<CompletedConversation>,
}

impl BufferAggregator {
    /// Returns the aggregator and the queue of completed conversations.
    pub fn new(
        config: BufferConfig,
        store: Arc<dyn LeadStore>,
        tasks: BackgroundTasks,
    ) -> (Self, mpsc::UnboundedReceiver<CompletedConversation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            buffers: DashMap::new(),
            ids: AtomicU64::new(1),
            store,
            tasks,
            config,
            completed: tx,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Feed one filtered inbound message. Never blocks on I/O.
    pub fn ingest(&self, ctx: &InboundContext, msg: InboundText) {
        let inner = &self.inner;
        let key = BufferKey {
            tenant_id: ctx.tenant_id.clone(),
            contact: msg.contact.clone(),
        };

        let forced = match inner.buffers.entry(key.clone()) {
            Entry::Vacant(slot) => {
                let generation = inner.next_id();
                let push_name = msg
                    .push_name
                    .clone()
                    .unwrap_or_else(|| msg.contact.0.clone());
                slot.insert(ContactBuffer {
                    generation,
                    arm_token: 0,
                    instance_id: ctx.instance_id.clone(),
                    lead_id: None,
                    push_name,
                    messages: Vec::new(),
                    mode: BufferMode::Waiting,
                    timeout: timeout_from_minutes(None, &inner.config),
                    started_at: None,
                    timer: None,
                });
                debug!(tenant_id = %key.tenant_id, contact = %key.contact, "buffer reserved");

                let this = inner.clone();
                let ctx = ctx.clone();
                let create_key = key.clone();
                inner.tasks.spawn("create-lead", async move {
                    this.create_lead(create_key, generation, ctx).await
                });
                None
            }
            Entry::Occupied(mut slot) => {
                let buffer = slot.get_mut();
                if let Some(name) = &msg.push_name {
                    buffer.push_name = name.clone();
                }
                match buffer.mode {
                    BufferMode::Waiting => {
                        buffer.mode = BufferMode::Active;
                        buffer.started_at = Some(Instant::now());
                        debug!(
                            tenant_id = %key.tenant_id,
                            contact = %key.contact,
                            timeout_secs = buffer.timeout.as_secs_f64(),
                            "buffer activated"
                        );
                    }
                    BufferMode::Active => {
                        if inner.is_duplicate(buffer, &msg) {
                            debug!(contact = %key.contact, "duplicate message dropped");
                            return;
                        }
                    }
                }
                buffer.messages.push(BufferedMessage {
                    text: msg.text,
                    timestamp_ms: msg.timestamp_ms,
                });

                match inner.reschedule(&key, buffer) {
                    Some(reason) => Some((slot.remove(), reason)),
                    None => None,
                }
            }
        };

        if let Some((buffer, reason)) = forced {
            inner.hand_off(key, buffer, reason);
        }
    }

    /// Drop every live buffer and cancel its timer. Their leads stay `Pending`
    /// and are healed by the next startup reconciliation.
    pub fn flush_all(&self) -> usize {
        let keys: Vec<BufferKey> = self
            .inner
            .buffers
            .iter()
            .map(|e| e.key().clone())
            .collect();
        let mut dropped = 0;
        for key in keys {
            if let Some((_, mut buffer)) = self.inner.buffers.remove(&key) {
                buffer.cancel_timer();
                dropped += 1;
            }
        }
        if dropped > 0 {
            info!(dropped, "discarded in-flight buffers");
        }
        dropped
    }

    pub fn buffer_count(&self) -> usize {
        self.inner.buffers.len()
    }

    pub fn snapshot(&self, tenant_id: &TenantId, contact: &ContactId) -> Option<BufferSnapshot> {
        let key = BufferKey {
            tenant_id: tenant_id.clone(),
            contact: contact.clone(),
        };
        self.inner.buffers.get(&key).map(|b| BufferSnapshot {
            instance_id: b.instance_id.clone(),
            lead_id: b.lead_id,
            push_name: b.push_name.clone(),
            messages: b.messages.clone(),
            mode: b.mode,
            timeout: b.timeout,
            timer_armed: b.timer.is_some(),
        })
    }
}

impl Inner {
    fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    fn is_duplicate(&self, buffer: &ContactBuffer, msg: &InboundText) -> bool {
        let window = i64::try_from(self.config.duplicate_window_ms).unwrap_or(i64::MAX);
        buffer.messages.last().is_some_and(|last| {
            last.text == msg.text && (msg.timestamp_ms - last.timestamp_ms).abs() < window
        })
    }

    /// Cancel the running timer, then either report a forced flush or re-arm.
    ///
    /// Does nothing until the lead id is known.
    fn reschedule(self: &Arc<Self>, key: &BufferKey, buffer: &mut ContactBuffer) -> Option<FlushReason> {
        buffer.lead_id?;
        buffer.cancel_timer();

        if buffer.messages.len() >= self.config.max_messages {
            return Some(FlushReason::MaxMessages);
        }
        let max_age = buffer.timeout.saturating_mul(self.config.max_age_factor);
        if buffer.started_at.is_some_and(|s| s.elapsed() >= max_age) {
            return Some(FlushReason::MaxAge);
        }

        self.arm(key, buffer);
        None
    }

    fn arm(self: &Arc<Self>, key: &BufferKey, buffer: &mut ContactBuffer) {
        let token = self.next_id();
        buffer.arm_token = token;
        let generation = buffer.generation;
        let timeout = buffer.timeout;
        let this = self.clone();
        let key = key.clone();
        buffer.timer = Some(self.tasks.spawn_handle(async move {
            tokio::time::sleep(timeout).await;
            this.flush_if_current(&key, generation, token);
        }));
    }

    /// Timer expiry. A timer that was replaced or whose buffer is gone is a no-op.
    fn flush_if_current(&self, key: &BufferKey, generation: u64, token: u64) {
        let removed = self
            .buffers
            .remove_if(key, |_, b| b.generation == generation && b.arm_token == token);
        if let Some((key, mut buffer)) = removed {
            // Our own handle; dropping it detaches.
            buffer.timer.take();
            self.hand_off(key, buffer, FlushReason::Quiet);
        }
    }

    fn hand_off(&self, key: BufferKey, buffer: ContactBuffer, reason: FlushReason) {
        let Some(lead_id) = buffer.lead_id else {
            warn!(contact = %key.contact, "flushed buffer has no lead");
            return;
        };
        info!(
            tenant_id = %key.tenant_id,
            contact = %key.contact,
            lead_id = %lead_id,
            messages = buffer.messages.len(),
            reason = reason.as_str(),
            "buffer flushed"
        );
        metrics::record_buffer_flushed(reason);

        let conversation = CompletedConversation {
            tenant_id: key.tenant_id,
            instance_id: buffer.instance_id,
            contact: key.contact,
            lead_id,
            push_name: buffer.push_name,
            messages: buffer.messages,
            reason,
        };
        if self.completed.send(conversation).is_err() {
            warn!(lead_id = %lead_id, "qualification queue closed, lead stays pending");
        }
    }

    /// Remove a reservation whose lead was never created.
    fn rollback(&self, key: &BufferKey, generation: u64) {
        if let Some((_, mut buffer)) = self
            .buffers
            .remove_if(key, |_, b| b.generation == generation && b.lead_id.is_none())
        {
            buffer.cancel_timer();
        }
    }

    async fn resolve_timeout(&self, tenant_id: &TenantId) -> Duration {
        let configured = match self
            .store
            .get_config(tenant_id, config_keys::BUFFER_TIMEOUT_MINUTES)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "failed to read buffer timeout, using default");
                None
            }
        };
        timeout_from_minutes(configured.as_deref(), &self.config)
    }

    async fn create_lead(
        self: Arc<Self>,
        key: BufferKey,
        generation: u64,
        ctx: InboundContext,
    ) -> Result<(), LeadflowError> {
        let result = self.open_lead(&key, generation, &ctx).await;
        if result.is_err() {
            self.rollback(&key, generation);
        }
        result
    }

    async fn open_lead(
        self: &Arc<Self>,
        key: &BufferKey,
        generation: u64,
        ctx: &InboundContext,
    ) -> Result<(), LeadflowError> {
        if let Some(existing) = self
            .store
            .find_lead_by_contact(&key.tenant_id, &key.contact.0)
            .await?
        {
            self.rollback(key, generation);
            debug!(
                contact = %key.contact,
                lead_id = %existing.id,
                "contact already has a lead, message dropped"
            );
            return Ok(());
        }

        let timeout = self.resolve_timeout(&key.tenant_id).await;
        let Some(name) = self
            .buffers
            .get(key)
            .filter(|b| b.generation == generation)
            .map(|b| b.push_name.clone())
        else {
            return Ok(());
        };

        let payload = serde_json::json!({ "name": name, "phone": key.contact.0 });
        let lead = self
            .store
            .create_lead(&NewLead {
                tenant_id: key.tenant_id.clone(),
                instance_id: Some(ctx.instance_id.clone()),
                source: CHAT_SOURCE.to_string(),
                fields: ContactFields {
                    name: name.clone(),
                    phone: Some(key.contact.0.clone()),
                    ..Default::default()
                },
                raw_payload: payload.to_string(),
                score: 0,
                reasoning: String::new(),
                status: LeadStatus::Pending,
            })
            .await?;
        metrics::record_lead_created(CHAT_SOURCE);
        info!(
            tenant_id = %key.tenant_id,
            contact = %key.contact,
            lead_id = %lead.id,
            "pending lead created"
        );

        let forced = match self.buffers.entry(key.clone()) {
            Entry::Occupied(mut slot) if slot.get().generation == generation => {
                let buffer = slot.get_mut();
                buffer.lead_id = Some(lead.id);
                buffer.timeout = timeout;
                let reason = match buffer.mode {
                    BufferMode::Active => self.reschedule(key, buffer),
                    BufferMode::Waiting => None,
                };
                match reason {
                    Some(reason) => Some((slot.remove(), reason)),
                    None => None,
                }
            }
            _ => {
                debug!(lead_id = %lead.id, "buffer dropped before its lead was created");
                None
            }
        };
        if let Some((buffer, reason)) = forced {
            self.hand_off(key.clone(), buffer, reason);
        }

        let store = self.store.clone();
        let tenant_id = key.tenant_id.clone();
        let contact = key.contact.clone();
        let session = ctx.session.clone();
        self.tasks.spawn("welcome", async move {
            if let Some(text) = welcome_for(store.as_ref(), &tenant_id, &name).await? {
                session.send_text(&personal_jid(&contact.0), &text).await?;
                debug!(contact = %contact, "welcome message sent");
            }
            Ok(())
        });
        Ok(())
    }
}
