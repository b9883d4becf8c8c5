// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat instance queries.

use leadflow_core::{Instance, InstanceId, LeadflowError, TenantId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

const INSTANCE_COLUMNS: &str =
    "id, tenant_id, display_name, phone_number, display_name_from_transport, created_at";

fn instance_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Instance> {
    Ok(Instance {
        id: InstanceId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        display_name: row.get(2)?,
        phone_number: row.get(3)?,
        display_name_from_transport: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub async fn create_instance(db: &Database, instance: &Instance) -> Result<(), LeadflowError> {
    let instance = instance.clone();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.execute(
                &format!("INSERT INTO instances ({INSTANCE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    instance.id.0,
                    instance.tenant_id.0,
                    instance.display_name,
                    instance.phone_number,
                    instance.display_name_from_transport,
                    instance.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_instance(
    db: &Database,
    id: &InstanceId,
) -> Result<Option<Instance>, LeadflowError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.query_row(
                &format!("SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = ?1"),
                params![id],
                instance_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_instances(
    db: &Database,
    tenant_id: &TenantId,
) -> Result<Vec<Instance>, LeadflowError> {
    let tenant_id = tenant_id.0.clone();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances WHERE tenant_id = ?1 ORDER BY created_at"
            ))?;
            let instances = stmt
                .query_map(params![tenant_id], instance_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(instances)
        })
        .await
        .map_err(map_tr_err)
}

/// Record the phone number and transport display name of the logged-in account.
pub async fn update_account(
    db: &Database,
    id: &InstanceId,
    phone_number: &str,
    display_name: Option<&str>,
) -> Result<(), LeadflowError> {
    let id = id.0.clone();
    let phone_number = phone_number.to_string();
    let display_name = display_name.map(str::to_string);
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.execute(
                "UPDATE instances SET phone_number = ?1, display_name_from_transport = ?2
                 WHERE id = ?3",
                params![phone_number, display_name, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete an instance. Credential rows go with it via `ON DELETE CASCADE`.
pub async fn delete_instance(db: &Database, id: &InstanceId) -> Result<(), LeadflowError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.execute("DELETE FROM instances WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
