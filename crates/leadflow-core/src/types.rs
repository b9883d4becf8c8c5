// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the connector, the stores, and the adapters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::mpsc;

use crate::traits::transport::TransportSession;

/// Identifier of a tenant (organization).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Identifier of a tenant-owned chat instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

/// Phone number or handle of an external contact, without any transport suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub String);

/// Row identifier of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub i64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Transport,
    Scorer,
    Storage,
    Notifier,
}

// --- Leads ---

/// Lifecycle status of a lead.
///
/// `Pending` means a chat buffer is still collecting messages for the lead;
/// it never survives a startup reconciliation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum LeadStatus {
    Pending,
    New,
    Contacted,
    Won,
    Lost,
}

/// A durable lead record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: LeadId,
    pub tenant_id: TenantId,
    pub instance_id: Option<InstanceId>,
    pub source: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub role: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    /// JSON document of everything the channel delivered for this lead.
    pub raw_payload: String,
    pub score: i64,
    pub reasoning: String,
    pub status: LeadStatus,
    pub created_at: String,
}

/// Fields required to insert a new lead.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLead {
    pub tenant_id: TenantId,
    pub instance_id: Option<InstanceId>,
    pub source: String,
    pub fields: ContactFields,
    pub raw_payload: String,
    pub score: i64,
    pub reasoning: String,
    pub status: LeadStatus,
}

/// Structured contact data carried by a one-shot lead (webhook or manual entry).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactFields {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// Result of scoring a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualification {
    /// Integer score in `0..=100`.
    pub score: i64,
    pub reason: String,
}

// --- Tenants and instances ---

/// A tenant and the API key that identifies it on the ingress gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub api_key: String,
}

/// A tenant-owned chat connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: InstanceId,
    pub tenant_id: TenantId,
    pub display_name: String,
    pub phone_number: Option<String>,
    pub display_name_from_transport: Option<String>,
    pub created_at: String,
}

/// Well-known tenant configuration keys.
pub mod config_keys {
    /// General scoring criteria used for every channel.
    pub const SCORING_PROMPT: &str = "scoring_prompt";
    /// Scoring criteria used for chat conversations; falls back to the general prompt.
    pub const CHAT_SCORING_PROMPT: &str = "chat_scoring_prompt";
    /// Greeting sent to a new contact; `{name}` is substituted.
    pub const WELCOME_MESSAGE: &str = "welcome_message";
    /// Quiet period in minutes (decimal allowed).
    pub const BUFFER_TIMEOUT_MINUTES: &str = "buffer_timeout_minutes";
    /// Destination for finalized leads.
    pub const OUTBOUND_WEBHOOK_URL: &str = "outbound_webhook_url";
}

// --- Connection state ---

/// The account a transport session is logged in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub phone: String,
    pub name: String,
    pub jid: String,
}

/// Live connection state of an instance, as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Scanning { qr: String },
    Connected { account: Option<AccountInfo> },
}

// --- Transport events ---

/// Opaque credential blobs keyed by name, as handed to a transport on open.
pub type StoredCredentials = HashMap<String, Vec<u8>>;

/// Connection phase reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPhase {
    Connecting,
    Open { jid: String, name: Option<String> },
    Close,
}

/// Why a transport connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The account was logged out; stored credentials are no longer valid.
    LoggedOut,
    /// Any other close (network drop, server restart, replaced connection).
    Other { code: Option<u16>, message: String },
}

/// A connection-state change emitted by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionUpdate {
    pub phase: Option<LinkPhase>,
    pub qr: Option<String>,
    pub close_reason: Option<CloseReason>,
}

/// An inbound message exactly as the transport delivered it.
///
/// Several identifier fields may carry the sender's address depending on the
/// account type; see the connector's contact resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawInbound {
    #[serde(default)]
    pub remote_jid: Option<String>,
    #[serde(default)]
    pub remote_jid_alt: Option<String>,
    #[serde(default)]
    pub sender_pn: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub push_name: Option<String>,
    /// Plain conversation text.
    #[serde(default)]
    pub conversation: Option<String>,
    /// Text of an extended (quoted, linked) message.
    #[serde(default)]
    pub extended_text: Option<String>,
    /// False for protocol-only messages with no content at all.
    #[serde(default = "default_true")]
    pub has_content: bool,
    /// Seconds since the Unix epoch, when the transport provides one.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

fn default_true() -> bool {
    true
}

/// Events a transport session emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connection(ConnectionUpdate),
    Message(RawInbound),
    /// A credential blob rotated; `None` means it was removed.
    Credentials { key: String, value: Option<Vec<u8>> },
}

/// A freshly opened transport session and its event stream.
pub struct TransportHandle {
    pub session: Arc<dyn TransportSession>,
    pub events: mpsc::Receiver<TransportEvent>,
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle").finish_non_exhaustive()
    }
}
