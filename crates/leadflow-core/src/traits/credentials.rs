// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-instance transport credential persistence.

use async_trait::async_trait;

use crate::error::LeadflowError;
use crate::types::{InstanceId, StoredCredentials};

/// Key under which a transport stores its resumable session.
pub const SESSION_KEY: &str = "creds";

/// Stores opaque credential blobs, unique per `(instance_id, key)`.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Inserts or replaces one blob.
    async fn put(
        &self,
        instance_id: &InstanceId,
        key: &str,
        value: &[u8],
    ) -> Result<(), LeadflowError>;

    /// Returns every blob stored for the instance.
    async fn get_all(&self, instance_id: &InstanceId) -> Result<StoredCredentials, LeadflowError>;

    /// Removes one blob. Missing keys are not an error.
    async fn delete(&self, instance_id: &InstanceId, key: &str) -> Result<(), LeadflowError>;

    /// Removes every blob of the instance.
    async fn delete_all(&self, instance_id: &InstanceId) -> Result<(), LeadflowError>;

    /// Lists instances holding a blob under `key`.
    async fn instances_with_key(&self, key: &str) -> Result<Vec<InstanceId>, LeadflowError>;
}
