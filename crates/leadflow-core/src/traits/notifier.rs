// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound lead notification trait.

use async_trait::async_trait;

use crate::error::LeadflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::Lead;

/// Delivers a finalized lead to a tenant-configured destination.
#[async_trait]
pub trait LeadNotifier: PluginAdapter {
    /// Delivers `lead` to `url`. Best effort; callers do not retry.
    async fn notify(&self, url: &str, lead: &Lead) -> Result<(), LeadflowError>;
}
