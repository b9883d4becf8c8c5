// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`CredentialStore`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use leadflow_core::{CredentialStore, InstanceId, LeadflowError, StoredCredentials};

#[derive(Default)]
pub struct MemoryCredentialStore {
    blobs: Mutex<HashMap<InstanceId, StoredCredentials>>,
    listings: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `instances_with_key()` calls so far.
    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn put(
        &self,
        instance_id: &InstanceId,
        key: &str,
        value: &[u8],
    ) -> Result<(), LeadflowError> {
        self.blobs
            .lock()
            .await
            .entry(instance_id.clone())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_all(&self, instance_id: &InstanceId) -> Result<StoredCredentials, LeadflowError> {
        Ok(self
            .blobs
            .lock()
            .await
            .get(instance_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, instance_id: &InstanceId, key: &str) -> Result<(), LeadflowError> {
        if let Some(blobs) = self.blobs.lock().await.get_mut(instance_id) {
            blobs.remove(key);
        }
        Ok(())
    }

    async fn delete_all(&self, instance_id: &InstanceId) -> Result<(), LeadflowError> {
        self.blobs.lock().await.remove(instance_id);
        Ok(())
    }

    async fn instances_with_key(&self, key: &str) -> Result<Vec<InstanceId>, LeadflowError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        let mut ids: Vec<InstanceId> = self
            .blobs
            .lock()
            .await
            .iter()
            .filter(|(_, blobs)| blobs.contains_key(key))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(ids)
    }
}
