// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Passphrase acquisition from `LEADFLOW_VAULT_KEY` or a TTY prompt.

use leadflow_core::LeadflowError;
use secrecy::SecretString;

pub const VAULT_KEY_ENV_VAR: &str = "LEADFLOW_VAULT_KEY";

/// Get the vault passphrase.
///
/// The environment variable wins (headless deployments); otherwise an
/// interactive prompt is shown when stdin is a terminal.
pub fn get_vault_passphrase() -> Result<SecretString, LeadflowError> {
    if let Ok(key) = std::env::var(VAULT_KEY_ENV_VAR)
        && !key.is_empty()
    {
        return Ok(SecretString::from(key));
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        eprint!("Vault passphrase: ");
        let passphrase = rpassword::read_password()
            .map_err(|e| LeadflowError::Vault(format!("failed to read passphrase: {e}")))?;
        if passphrase.is_empty() {
            return Err(LeadflowError::Vault("empty passphrase not allowed".to_string()));
        }
        return Ok(SecretString::from(passphrase));
    }

    Err(LeadflowError::Vault(format!(
        "no passphrase provided; set {VAULT_KEY_ENV_VAR} or run interactively"
    )))
}
