// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order (later overrides earlier): compiled defaults,
//! `/etc/leadflow/leadflow.toml`, `~/.config/leadflow/leadflow.toml`,
//! `./leadflow.toml`, then `LEADFLOW_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::LeadflowConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/leadflow/leadflow.toml";
pub(crate) const LOCAL_CONFIG: &str = "leadflow.toml";

/// Top-level sections recognised in environment variable names.
const SECTIONS: &[&str] = &[
    "service",
    "storage",
    "vault",
    "scorer",
    "buffer",
    "reconnect",
    "webhook",
    "gateway",
    "bridge",
];

/// Env vars under the `LEADFLOW_` prefix that are secrets, not config keys.
const RESERVED_ENV: &[&str] = &["vault_key"];

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("leadflow").join(LOCAL_CONFIG))
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<LeadflowConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only. No files, no env.
pub fn load_config_from_str(toml_content: &str) -> Result<LeadflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LeadflowConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LeadflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LeadflowConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used for standard loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(LeadflowConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Environment provider mapping `LEADFLOW_<SECTION>_<KEY>` to `section.key`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `LEADFLOW_BUFFER_MAX_MESSAGES` maps to `buffer.max_messages`.
fn env_provider() -> Env {
    Env::prefixed("LEADFLOW_")
        .ignore(RESERVED_ENV)
        .map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_first_section_only() {
        assert_eq!(map_env_key("buffer_max_messages"), "buffer.max_messages");
        assert_eq!(map_env_key("scorer_api_key"), "scorer.api_key");
        assert_eq!(
            map_env_key("gateway_rate_limit_requests"),
            "gateway.rate_limit_requests"
        );
        assert_eq!(map_env_key("bridge_url"), "bridge.url");
    }

    #[test]
    fn unknown_sections_pass_through() {
        assert_eq!(map_env_key("whatever_else"), "whatever_else");
        assert_eq!(map_env_key("storage"), "storage");
    }
}
