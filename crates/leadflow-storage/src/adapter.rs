// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`LeadStore`] trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use leadflow_config::model::StorageConfig;
use leadflow_core::{
    AdapterType, HealthStatus, Instance, InstanceId, Lead, LeadId, LeadStore, LeadflowError,
    NewLead, PluginAdapter, Qualification, Tenant, TenantId,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed lead store.
///
/// The database is opened lazily by [`SqliteLeadStore::initialize`]; every
/// query before that fails with a storage error.
pub struct SqliteLeadStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteLeadStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Open the database and run migrations. Fails if called twice.
    pub async fn initialize(&self) -> Result<(), LeadflowError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| LeadflowError::storage("storage already initialized"))?;
        info!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    /// The underlying database, for components sharing the writer connection.
    pub fn database(&self) -> Result<&Database, LeadflowError> {
        self.db
            .get()
            .ok_or_else(|| LeadflowError::storage("storage not initialized, call initialize() first"))
    }

    fn db(&self) -> Result<&Database, LeadflowError> {
        self.database()
    }
}

#[async_trait]
impl PluginAdapter for SqliteLeadStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, LeadflowError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LeadflowError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl LeadStore for SqliteLeadStore {
    async fn create_tenant(&self, tenant: &Tenant) -> Result<(), LeadflowError> {
        queries::tenants::create_tenant(self.db()?, tenant).await
    }

    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, LeadflowError> {
        queries::tenants::get_tenant(self.db()?, id).await
    }

    async fn find_tenant_by_api_key(
        &self,
        api_key: &str,
    ) -> Result<Option<Tenant>, LeadflowError> {
        queries::tenants::find_by_api_key(self.db()?, api_key).await
    }

    async fn get_config(
        &self,
        tenant_id: &TenantId,
        key: &str,
    ) -> Result<Option<String>, LeadflowError> {
        queries::config::get(self.db()?, tenant_id, key).await
    }

    async fn set_config(
        &self,
        tenant_id: &TenantId,
        key: &str,
        value: &str,
    ) -> Result<(), LeadflowError> {
        queries::config::set(self.db()?, tenant_id, key, value).await
    }

    async fn insert_config_if_absent(
        &self,
        tenant_id: &TenantId,
        key: &str,
        value: &str,
    ) -> Result<bool, LeadflowError> {
        queries::config::insert_if_absent(self.db()?, tenant_id, key, value).await
    }

    async fn create_instance(&self, instance: &Instance) -> Result<(), LeadflowError> {
        queries::instances::create_instance(self.db()?, instance).await
    }

    async fn get_instance(&self, id: &InstanceId) -> Result<Option<Instance>, LeadflowError> {
        queries::instances::get_instance(self.db()?, id).await
    }

    async fn list_instances(&self, tenant_id: &TenantId) -> Result<Vec<Instance>, LeadflowError> {
        queries::instances::list_instances(self.db()?, tenant_id).await
    }

    async fn update_instance_account(
        &self,
        id: &InstanceId,
        phone_number: &str,
        display_name: Option<&str>,
    ) -> Result<(), LeadflowError> {
        queries::instances::update_account(self.db()?, id, phone_number, display_name).await
    }

    async fn delete_instance(&self, id: &InstanceId) -> Result<(), LeadflowError> {
        queries::instances::delete_instance(self.db()?, id).await
    }

    async fn create_lead(&self, lead: &NewLead) -> Result<Lead, LeadflowError> {
        queries::leads::create_lead(self.db()?, lead).await
    }

    async fn get_lead(&self, id: LeadId) -> Result<Option<Lead>, LeadflowError> {
        queries::leads::get_lead(self.db()?, id).await
    }

    async fn list_leads(&self, tenant_id: &TenantId) -> Result<Vec<Lead>, LeadflowError> {
        queries::leads::list_leads(self.db()?, tenant_id).await
    }

    async fn find_lead_by_contact(
        &self,
        tenant_id: &TenantId,
        phone: &str,
    ) -> Result<Option<Lead>, LeadflowError> {
        queries::leads::find_by_contact(self.db()?, tenant_id, phone).await
    }

    async fn finalize_lead(
        &self,
        id: LeadId,
        qualification: &Qualification,
        raw_payload: &str,
    ) -> Result<Option<Lead>, LeadflowError> {
        queries::leads::finalize_lead(self.db()?, id, qualification, raw_payload).await
    }

    async fn delete_lead(&self, id: LeadId) -> Result<(), LeadflowError> {
        queries::leads::delete_lead(self.db()?, id).await
    }

    async fn heal_pending_leads(&self, score: i64, reasoning: &str) -> Result<u64, LeadflowError> {
        queries::leads::heal_pending(self.db()?, score, reasoning).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn identifies_as_storage_adapter() {
        let storage = SqliteLeadStore::new(make_config("unused.db"));
        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn queries_fail_before_initialize() {
        let dir = tempdir().unwrap();
        let storage = SqliteLeadStore::new(make_config(
            dir.path().join("no_init.db").to_str().unwrap(),
        ));
        assert!(storage.health_check().await.is_err());
        assert!(storage.get_lead(LeadId(1)).await.is_err());
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let storage =
            SqliteLeadStore::new(make_config(dir.path().join("twice.db").to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.shutdown().await.unwrap();
    }
}
