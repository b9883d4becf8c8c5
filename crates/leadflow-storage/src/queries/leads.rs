// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead queries.

use std::str::FromStr;

use leadflow_core::{
    InstanceId, Lead, LeadId, LeadStatus, LeadflowError, NewLead, Qualification, TenantId,
};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err, now_timestamp};

const LEAD_COLUMNS: &str = "id, tenant_id, instance_id, source, name, email, phone, company, \
                            role, address, city, raw_payload, score, reasoning, status, created_at";

fn lead_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lead> {
    let status: String = row.get(14)?;
    let status = LeadStatus::from_str(&status)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(14, Type::Text, Box::new(e)))?;
    Ok(Lead {
        id: LeadId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        instance_id: row.get::<_, Option<String>>(2)?.map(InstanceId),
        source: row.get(3)?,
        name: row.get(4)?,
        email: row.get(5)?,
        phone: row.get(6)?,
        company: row.get(7)?,
        role: row.get(8)?,
        address: row.get(9)?,
        city: row.get(10)?,
        raw_payload: row.get(11)?,
        score: row.get(12)?,
        reasoning: row.get(13)?,
        status,
        created_at: row.get(15)?,
    })
}

fn select_lead(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Lead>> {
    conn.query_row(
        &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
        params![id],
        lead_from_row,
    )
    .optional()
}

/// Insert a lead and return the stored row.
pub async fn create_lead(db: &Database, lead: &NewLead) -> Result<Lead, LeadflowError> {
    let lead = lead.clone();
    let created_at = now_timestamp();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.execute(
                "INSERT INTO leads (tenant_id, instance_id, source, name, email, phone, company,
                                    role, address, city, raw_payload, score, reasoning, status,
                                    created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    lead.tenant_id.0,
                    lead.instance_id.map(|i| i.0),
                    lead.source,
                    lead.fields.name,
                    lead.fields.email,
                    lead.fields.phone,
                    lead.fields.company,
                    lead.fields.role,
                    lead.fields.address,
                    lead.fields.city,
                    lead.raw_payload,
                    lead.score,
                    lead.reasoning,
                    lead.status.to_string(),
                    created_at,
                ],
            )?;
            let id = conn.last_insert_rowid();
            select_lead(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_lead(db: &Database, id: LeadId) -> Result<Option<Lead>, LeadflowError> {
    db.connection()
        .call(move |conn| select_lead(conn, id.0))
        .await
        .map_err(map_tr_err)
}

/// All leads of a tenant, newest first.
pub async fn list_leads(db: &Database, tenant_id: &TenantId) -> Result<Vec<Lead>, LeadflowError> {
    let tenant_id = tenant_id.0.clone();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LEAD_COLUMNS} FROM leads WHERE tenant_id = ?1 ORDER BY id DESC"
            ))?;
            let leads = stmt
                .query_map(params![tenant_id], lead_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(leads)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn find_by_contact(
    db: &Database,
    tenant_id: &TenantId,
    phone: &str,
) -> Result<Option<Lead>, LeadflowError> {
    let tenant_id = tenant_id.0.clone();
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.query_row(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads WHERE tenant_id = ?1 AND phone = ?2
                     ORDER BY id DESC LIMIT 1"
                ),
                params![tenant_id, phone],
                lead_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a qualification and move the lead to `New`.
pub async fn finalize_lead(
    db: &Database,
    id: LeadId,
    qualification: &Qualification,
    raw_payload: &str,
) -> Result<Option<Lead>, LeadflowError> {
    let qualification = qualification.clone();
    let raw_payload = raw_payload.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let updated = conn.execute(
                "UPDATE leads SET score = ?1, reasoning = ?2, status = 'New', raw_payload = ?3
                 WHERE id = ?4",
                params![qualification.score, qualification.reason, raw_payload, id.0],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            select_lead(conn, id.0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_lead(db: &Database, id: LeadId) -> Result<(), LeadflowError> {
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            conn.execute("DELETE FROM leads WHERE id = ?1", params![id.0])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Move every `Pending` lead to `New` with the given score and note.
pub async fn heal_pending(db: &Database, score: i64, reasoning: &str) -> Result<u64, LeadflowError> {
    let reasoning = reasoning.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<_> {
            let healed = conn.execute(
                "UPDATE leads SET status = 'New', score = ?1, reasoning = ?2
                 WHERE status = 'Pending'",
                params![score, reasoning],
            )?;
            Ok(healed as u64)
        })
        .await
        .map_err(map_tr_err)
}
