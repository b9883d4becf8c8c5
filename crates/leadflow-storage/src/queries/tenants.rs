// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant queries.

use leadflow_core::{LeadflowError, Tenant, TenantId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

fn tenant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: TenantId(row.get(0)?),
        name: row.get(1)?,
        api_key: row.get(2)?,
    })
}

pub async fn create_tenant(db: &Database, tenant: &Tenant) -> Result<(), LeadflowError> {
    let tenant = tenant.clone();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.execute(
                "INSERT INTO tenants (id, name, api_key) VALUES (?1, ?2, ?3)",
                params![tenant.id.0, tenant.name, tenant.api_key],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_tenant(db: &Database, id: &TenantId) -> Result<Option<Tenant>, LeadflowError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.query_row(
                "SELECT id, name, api_key FROM tenants WHERE id = ?1",
                params![id],
                tenant_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn find_by_api_key(
    db: &Database,
    api_key: &str,
) -> Result<Option<Tenant>, LeadflowError> {
    let api_key = api_key.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.query_row(
                "SELECT id, name, api_key FROM tenants WHERE api_key = ?1",
                params![api_key],
                tenant_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
