// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AI scorer trait.

use async_trait::async_trait;

use crate::error::LeadflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::Qualification;

/// Assigns a lead a score and a short justification.
#[async_trait]
pub trait Scorer: PluginAdapter {
    /// Scores `payload` (the lead as JSON) against the tenant's criteria.
    async fn score(
        &self,
        payload: &serde_json::Value,
        criteria: &str,
    ) -> Result<Qualification, LeadflowError>;
}
