// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead store trait: leads, tenants, tenant configuration, and instances.

use async_trait::async_trait;

use crate::error::LeadflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Instance, InstanceId, Lead, LeadId, NewLead, Qualification, Tenant, TenantId};

/// Durable keyed store behind the connector and the ingress gateway.
#[async_trait]
pub trait LeadStore: PluginAdapter {
    // --- Tenants ---

    async fn create_tenant(&self, tenant: &Tenant) -> Result<(), LeadflowError>;

    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, LeadflowError>;

    async fn find_tenant_by_api_key(&self, api_key: &str)
    -> Result<Option<Tenant>, LeadflowError>;

    // --- Tenant configuration ---

    async fn get_config(
        &self,
        tenant_id: &TenantId,
        key: &str,
    ) -> Result<Option<String>, LeadflowError>;

    async fn set_config(
        &self,
        tenant_id: &TenantId,
        key: &str,
        value: &str,
    ) -> Result<(), LeadflowError>;

    /// Inserts a config value unless one exists. Returns false if another
    /// writer got there first.
    async fn insert_config_if_absent(
        &self,
        tenant_id: &TenantId,
        key: &str,
        value: &str,
    ) -> Result<bool, LeadflowError>;

    // --- Instances ---

    async fn create_instance(&self, instance: &Instance) -> Result<(), LeadflowError>;

    async fn get_instance(&self, id: &InstanceId) -> Result<Option<Instance>, LeadflowError>;

    async fn list_instances(&self, tenant_id: &TenantId) -> Result<Vec<Instance>, LeadflowError>;

    /// Records the account a session logged in as.
    async fn update_instance_account(
        &self,
        id: &InstanceId,
        phone_number: &str,
        display_name: Option<&str>,
    ) -> Result<(), LeadflowError>;

    /// Deletes the instance and its credential blobs.
    async fn delete_instance(&self, id: &InstanceId) -> Result<(), LeadflowError>;

    // --- Leads ---

    async fn create_lead(&self, lead: &NewLead) -> Result<Lead, LeadflowError>;

    async fn get_lead(&self, id: LeadId) -> Result<Option<Lead>, LeadflowError>;

    async fn list_leads(&self, tenant_id: &TenantId) -> Result<Vec<Lead>, LeadflowError>;

    /// Any lead of the tenant whose phone matches `phone`.
    async fn find_lead_by_contact(
        &self,
        tenant_id: &TenantId,
        phone: &str,
    ) -> Result<Option<Lead>, LeadflowError>;

    /// Applies a qualification, moves the lead to `New`, and replaces its raw
    /// payload. Returns `None` if the lead no longer exists.
    async fn finalize_lead(
        &self,
        id: LeadId,
        qualification: &Qualification,
        raw_payload: &str,
    ) -> Result<Option<Lead>, LeadflowError>;

    async fn delete_lead(&self, id: LeadId) -> Result<(), LeadflowError>;

    /// Moves every `Pending` lead to `New` with the given score and note.
    /// Returns the number of leads healed.
    async fn heal_pending_leads(&self, score: i64, reasoning: &str)
    -> Result<u64, LeadflowError>;
}
