// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat transport traits.
//!
//! A [`TransportConnector`] opens one logical session per instance. The
//! session's events arrive on the receiver inside the returned
//! [`TransportHandle`]; commands go through the [`TransportSession`].

use async_trait::async_trait;

use crate::error::LeadflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{InstanceId, StoredCredentials, TransportHandle};

/// Opens transport sessions.
#[async_trait]
pub trait TransportConnector: PluginAdapter {
    /// Opens a session for `instance_id`, resuming from `credentials` when
    /// they hold a usable session.
    async fn open(
        &self,
        instance_id: &InstanceId,
        credentials: StoredCredentials,
    ) -> Result<TransportHandle, LeadflowError>;
}

/// A live transport session.
#[async_trait]
pub trait TransportSession: Send + Sync + 'static {
    /// Sends a text message to a fully-qualified chat address.
    async fn send_text(&self, jid: &str, text: &str) -> Result<(), LeadflowError>;

    /// Logs the account out, invalidating its credentials.
    async fn logout(&self) -> Result<(), LeadflowError>;

    /// Closes the connection without logging out.
    async fn close(&self) -> Result<(), LeadflowError>;
}
