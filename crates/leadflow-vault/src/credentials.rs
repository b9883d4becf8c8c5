// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`CredentialStore`] backed by the `credentials` table, encrypted with the
//! vault master key.

use std::collections::HashMap;

use async_trait::async_trait;
use rusqlite::params;
use tracing::{debug, warn};

use leadflow_core::{CredentialStore, InstanceId, LeadflowError, StoredCredentials};

use crate::vault::{Vault, map_tr_err};

/// Encrypted per-instance credential blobs.
///
/// Each blob is sealed with `"{instance_id}:{key}"` as associated data, so a
/// row copied under another instance or key fails to decrypt.
#[derive(Debug)]
pub struct VaultCredentialStore {
    vault: Vault,
}

fn associated_data(instance_id: &InstanceId, key: &str) -> Vec<u8> {
    format!("{instance_id}:{key}").into_bytes()
}

impl VaultCredentialStore {
    pub fn new(vault: Vault) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl CredentialStore for VaultCredentialStore {
    async fn put(
        &self,
        instance_id: &InstanceId,
        key: &str,
        value: &[u8],
    ) -> Result<(), LeadflowError> {
        let (ciphertext, nonce) = self.vault.seal(&associated_data(instance_id, key), value)?;
        let instance = instance_id.0.clone();
        let key_owned = key.to_string();
        let nonce = nonce.to_vec();

        self.vault
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO credentials (instance_id, key, ciphertext, nonce)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(instance_id, key) DO UPDATE SET
                        ciphertext = excluded.ciphertext,
                        nonce = excluded.nonce,
                        updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![instance, key_owned, ciphertext, nonce],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        debug!(instance_id = %instance_id, key, "credential stored");
        Ok(())
    }

    async fn get_all(&self, instance_id: &InstanceId) -> Result<StoredCredentials, LeadflowError> {
        let instance = instance_id.0.clone();
        type Row = (String, Vec<u8>, Vec<u8>);
        let rows = self
            .vault
            .connection()
            .call(move |conn| -> Result<Vec<Row>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT key, ciphertext, nonce FROM credentials WHERE instance_id = ?1",
                )?;
                let rows = stmt
                    .query_map(params![instance], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        let mut credentials = HashMap::with_capacity(rows.len());
        for (key, ciphertext, nonce) in rows {
            let Ok(nonce) = <[u8; 12]>::try_from(nonce.as_slice()) else {
                warn!(instance_id = %instance_id, key = %key, "skipping credential with corrupted nonce");
                continue;
            };
            match self
                .vault
                .open(&nonce, &associated_data(instance_id, &key), &ciphertext)
            {
                Ok(plaintext) => {
                    credentials.insert(key, plaintext);
                }
                Err(e) => {
                    warn!(instance_id = %instance_id, key = %key, error = %e, "skipping undecryptable credential");
                }
            }
        }
        Ok(credentials)
    }

    async fn delete(&self, instance_id: &InstanceId, key: &str) -> Result<(), LeadflowError> {
        let instance = instance_id.0.clone();
        let key = key.to_string();
        self.vault
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "DELETE FROM credentials WHERE instance_id = ?1 AND key = ?2",
                    params![instance, key],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete_all(&self, instance_id: &InstanceId) -> Result<(), LeadflowError> {
        let instance = instance_id.0.clone();
        let removed = self
            .vault
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "DELETE FROM credentials WHERE instance_id = ?1",
                    params![instance],
                )
            })
            .await
            .map_err(map_tr_err)?;
        debug!(instance_id = %instance_id, removed, "credentials purged");
        Ok(())
    }

    async fn instances_with_key(&self, key: &str) -> Result<Vec<InstanceId>, LeadflowError> {
        let key = key.to_string();
        self.vault
            .connection()
            .call(move |conn| -> Result<Vec<InstanceId>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT instance_id FROM credentials WHERE key = ?1 ORDER BY instance_id",
                )?;
                let ids = stmt
                    .query_map(params![key], |row| row.get::<_, String>(0).map(InstanceId))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ids)
            })
            .await
            .map_err(map_tr_err)
    }
}
