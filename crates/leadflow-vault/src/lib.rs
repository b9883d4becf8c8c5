// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted transport credential store.
//!
//! Credential blobs are sealed with AES-256-GCM under a random master key.
//! The master key is wrapped by a passphrase-derived key (Argon2id) and kept
//! in `vault_meta`; each blob is bound to its `(instance_id, key)` through the
//! AEAD associated data.

pub mod credentials;
pub mod crypto;
pub mod kdf;
pub mod prompt;
pub mod vault;

pub use credentials::VaultCredentialStore;
pub use prompt::get_vault_passphrase;
pub use vault::Vault;
