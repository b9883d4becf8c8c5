// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant key/value settings.

use leadflow_core::{LeadflowError, TenantId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

pub async fn get(
    db: &Database,
    tenant_id: &TenantId,
    key: &str,
) -> Result<Option<String>, LeadflowError> {
    let tenant_id = tenant_id.0.clone();
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.query_row(
                "SELECT value FROM tenant_config WHERE tenant_id = ?1 AND key = ?2",
                params![tenant_id, key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or overwrite a value.
pub async fn set(
    db: &Database,
    tenant_id: &TenantId,
    key: &str,
    value: &str,
) -> Result<(), LeadflowError> {
    let tenant_id = tenant_id.0.clone();
    let key = key.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.execute(
                "INSERT INTO tenant_config (tenant_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(tenant_id, key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![tenant_id, key, value],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a value unless the key already exists. Returns whether this call
/// wrote it.
pub async fn insert_if_absent(
    db: &Database,
    tenant_id: &TenantId,
    key: &str,
    value: &str,
) -> Result<bool, LeadflowError> {
    let tenant_id = tenant_id.0.clone();
    let key = key.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO tenant_config (tenant_id, key, value) VALUES (?1, ?2, ?3)",
                params![tenant_id, key, value],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(map_tr_err)
}
