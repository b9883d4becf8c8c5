// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vault lifecycle: create, unlock, and seal/open blobs with the master key.
//!
//! Key wrapping: a random master key encrypts every credential blob, and the
//! master key itself is encrypted with an Argon2id key derived from the
//! passphrase. The wrapped key, its nonce, the salt, and the KDF parameters
//! live in `vault_meta`.

use rusqlite::{OptionalExtension, params};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use zeroize::Zeroizing;

use leadflow_core::LeadflowError;

use crate::crypto;
use crate::kdf::{self, KdfParams};

/// Associated data binding the wrapped master key to its purpose.
const MASTER_KEY_AAD: &[u8] = b"leadflow:master-key";

/// An unlocked vault holding the master key in memory.
pub struct Vault {
    master_key: Zeroizing<[u8; 32]>,
    conn: tokio_rusqlite::Connection,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

struct VaultMeta {
    wrapped_master_key: Vec<u8>,
    nonce: Vec<u8>,
    salt: Vec<u8>,
    kdf_params: Vec<u8>,
}

impl Vault {
    /// True if `vault_meta` holds a wrapped master key.
    pub async fn exists(conn: &tokio_rusqlite::Connection) -> Result<bool, LeadflowError> {
        conn.call(|conn| -> Result<bool, rusqlite::Error> {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM vault_meta WHERE key = 'wrapped_master_key'",
                [],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(map_tr_err)
    }

    /// Unlock the vault, creating it on first use.
    pub async fn open_or_create(
        conn: tokio_rusqlite::Connection,
        passphrase: &SecretString,
        params: KdfParams,
    ) -> Result<Self, LeadflowError> {
        if Self::exists(&conn).await? {
            Self::unlock(conn, passphrase).await
        } else {
            Self::create(conn, passphrase, params).await
        }
    }

    /// Create a vault with a fresh master key wrapped by `passphrase`.
    pub async fn create(
        conn: tokio_rusqlite::Connection,
        passphrase: &SecretString,
        params: KdfParams,
    ) -> Result<Self, LeadflowError> {
        let master_key = Zeroizing::new(crypto::generate_random_key()?);
        let salt = kdf::generate_salt()?;
        let wrapping_key = kdf::derive_key(passphrase.expose_secret().as_bytes(), &salt, params)?;
        let (wrapped, nonce) = crypto::seal(&wrapping_key, MASTER_KEY_AAD, &*master_key)?;

        let kdf_params = serde_json::json!({
            "memory_cost": params.memory_cost,
            "iterations": params.iterations,
            "parallelism": params.parallelism,
        })
        .to_string()
        .into_bytes();
        let salt = salt.to_vec();
        let nonce = nonce.to_vec();

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            for (key, value) in [
                ("wrapped_master_key", wrapped),
                ("master_key_nonce", nonce),
                ("kdf_salt", salt),
                ("kdf_params", kdf_params),
            ] {
                tx.execute(
                    "INSERT OR REPLACE INTO vault_meta (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)?;

        info!("credential vault created");
        Ok(Self { master_key, conn })
    }

    /// Unlock an existing vault.
    pub async fn unlock(
        conn: tokio_rusqlite::Connection,
        passphrase: &SecretString,
    ) -> Result<Self, LeadflowError> {
        let meta = conn
            .call(|conn| -> Result<Option<VaultMeta>, rusqlite::Error> {
                let get = |key: &str| -> Result<Option<Vec<u8>>, rusqlite::Error> {
                    conn.query_row(
                        "SELECT value FROM vault_meta WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()
                };
                let (Some(wrapped_master_key), Some(nonce), Some(salt), Some(kdf_params)) = (
                    get("wrapped_master_key")?,
                    get("master_key_nonce")?,
                    get("kdf_salt")?,
                    get("kdf_params")?,
                ) else {
                    return Ok(None);
                };
                Ok(Some(VaultMeta {
                    wrapped_master_key,
                    nonce,
                    salt,
                    kdf_params,
                }))
            })
            .await
            .map_err(map_tr_err)?
            .ok_or_else(|| LeadflowError::Vault("vault metadata is incomplete".to_string()))?;

        let params = parse_kdf_params(&meta.kdf_params)?;
        let salt: [u8; 16] = meta
            .salt
            .try_into()
            .map_err(|_| LeadflowError::Vault("corrupted salt (expected 16 bytes)".to_string()))?;
        let nonce: [u8; 12] = meta
            .nonce
            .try_into()
            .map_err(|_| LeadflowError::Vault("corrupted nonce (expected 12 bytes)".to_string()))?;

        let wrapping_key = kdf::derive_key(passphrase.expose_secret().as_bytes(), &salt, params)?;
        let master_key_bytes = Zeroizing::new(
            crypto::open(&wrapping_key, &nonce, MASTER_KEY_AAD, &meta.wrapped_master_key)
                .map_err(|_| {
                    LeadflowError::Vault(
                        "invalid passphrase or corrupted vault, decryption failed".to_string(),
                    )
                })?,
        );
        let master_key: [u8; 32] = master_key_bytes.as_slice().try_into().map_err(|_| {
            LeadflowError::Vault("corrupted master key (expected 32 bytes)".to_string())
        })?;

        debug!("credential vault unlocked");
        Ok(Self {
            master_key: Zeroizing::new(master_key),
            conn,
        })
    }

    /// Encrypt `plaintext` under the master key, bound to `aad`.
    pub fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; 12]), LeadflowError> {
        crypto::seal(&self.master_key, aad, plaintext)
    }

    /// Decrypt a blob sealed by [`Vault::seal`].
    pub fn open(&self, nonce: &[u8; 12], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, LeadflowError> {
        crypto::open(&self.master_key, nonce, aad, ciphertext)
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }
}

fn parse_kdf_params(bytes: &[u8]) -> Result<KdfParams, LeadflowError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| LeadflowError::Vault(format!("corrupted KDF params: {e}")))?;
    let field = |name: &str| -> Result<u32, LeadflowError> {
        value[name]
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| LeadflowError::Vault(format!("missing {name} in KDF params")))
    };
    Ok(KdfParams {
        memory_cost: field("memory_cost")?,
        iterations: field("iterations")?,
        parallelism: field("parallelism")?,
    })
}

pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> LeadflowError {
    LeadflowError::Vault(format!("vault database error: {e}"))
}
