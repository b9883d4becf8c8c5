// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temp SQLite store and seed helpers.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use leadflow_config::model::StorageConfig;
use leadflow_core::{
    Instance, InstanceId, LeadStore, LeadflowError, RawInbound, Tenant, TenantId,
};
use leadflow_storage::SqliteLeadStore;
use tempfile::TempDir;

/// An initialized SQLite lead store in a temp directory.
///
/// The directory lives as long as this value.
pub struct TestStore {
    pub store: Arc<SqliteLeadStore>,
    _dir: TempDir,
}

impl TestStore {
    /// Open a fresh store with one tenant (`acme`, key `key-acme`).
    pub async fn new() -> Result<Self, LeadflowError> {
        let dir = tempfile::tempdir().map_err(LeadflowError::storage)?;
        let store = SqliteLeadStore::new(StorageConfig {
            database_path: dir.path().join("leads.db").to_string_lossy().to_string(),
            wal_mode: true,
        });
        store.initialize().await?;
        let this = Self {
            store: Arc::new(store),
            _dir: dir,
        };
        this.seed_tenant("acme", "key-acme").await?;
        Ok(this)
    }

    pub fn tenant_id() -> TenantId {
        TenantId("acme".into())
    }

    pub async fn seed_tenant(&self, id: &str, api_key: &str) -> Result<Tenant, LeadflowError> {
        let tenant = Tenant {
            id: TenantId(id.to_string()),
            name: id.to_string(),
            api_key: api_key.to_string(),
        };
        self.store.create_tenant(&tenant).await?;
        Ok(tenant)
    }

    /// Create an instance owned by `acme`.
    pub async fn seed_instance(&self, id: &str) -> Result<Instance, LeadflowError> {
        let instance = Instance {
            id: InstanceId(id.to_string()),
            tenant_id: Self::tenant_id(),
            display_name: format!("{id} line"),
            phone_number: None,
            display_name_from_transport: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store.create_instance(&instance).await?;
        Ok(instance)
    }

    pub async fn set_config(&self, key: &str, value: &str) -> Result<(), LeadflowError> {
        self.store.set_config(&Self::tenant_id(), key, value).await
    }
}

/// A personal-chat text message from `phone` with a push name.
pub fn raw_text(phone: &str, push_name: &str, text: &str) -> RawInbound {
    RawInbound {
        remote_jid: Some(format!("{phone}@s.whatsapp.net")),
        push_name: Some(push_name.to_string()),
        conversation: Some(text.to_string()),
        has_content: true,
        ..Default::default()
    }
}

/// Poll `check` until it returns true or five seconds of wall time pass.
///
/// Yields between polls instead of sleeping, so a paused tokio clock does not
/// auto-advance while work runs on other threads (the SQLite worker).
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::task::yield_now().await;
    }
    false
}
