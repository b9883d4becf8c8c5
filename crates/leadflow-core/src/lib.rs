// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Leadflow lead connector.
//!
//! This crate provides the trait seams, error type, and domain types shared by
//! every other crate in the workspace. Adapters (transport, scorer, storage,
//! notifier) implement the traits defined here.

pub mod error;
pub mod traits;
pub mod types;

pub use error::LeadflowError;
pub use types::{
    AccountInfo, AdapterType, CloseReason, ConnectionState, ConnectionUpdate, ContactFields,
    ContactId, HealthStatus, Instance, InstanceId, Lead, LeadId, LeadStatus, LinkPhase, NewLead,
    Qualification, RawInbound, StoredCredentials, Tenant, TenantId, TransportEvent,
    TransportHandle,
};

pub use traits::{
    CredentialStore, LeadNotifier, LeadStore, PluginAdapter, Scorer, TransportConnector,
    TransportSession,
};
