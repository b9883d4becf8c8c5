// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every failure instead of stopping at the first one.

use crate::diagnostic::ConfigError;
use crate::model::LeadflowConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &LeadflowConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        fail(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.vault.kdf_memory_cost < 32768 {
        fail(format!(
            "vault.kdf_memory_cost must be at least 32768 (32 MiB), got {}",
            config.vault.kdf_memory_cost
        ));
    }
    if config.vault.kdf_iterations < 2 {
        fail(format!(
            "vault.kdf_iterations must be at least 2, got {}",
            config.vault.kdf_iterations
        ));
    }
    if config.vault.kdf_parallelism < 1 {
        fail(format!(
            "vault.kdf_parallelism must be at least 1, got {}",
            config.vault.kdf_parallelism
        ));
    }

    if !config.scorer.base_url.starts_with("http://")
        && !config.scorer.base_url.starts_with("https://")
    {
        fail(format!(
            "scorer.base_url `{}` must be an http(s) URL",
            config.scorer.base_url
        ));
    }
    if config.scorer.timeout_secs == 0 {
        fail("scorer.timeout_secs must be greater than 0".to_string());
    }
    if config.scorer.max_tokens == 0 {
        fail("scorer.max_tokens must be greater than 0".to_string());
    }

    let buffer = &config.buffer;
    if buffer.min_timeout_minutes.is_nan() || buffer.min_timeout_minutes <= 0.0 {
        fail(format!(
            "buffer.min_timeout_minutes must be positive, got {}",
            buffer.min_timeout_minutes
        ));
    }
    if !buffer.default_timeout_minutes.is_finite()
        || buffer.default_timeout_minutes < buffer.min_timeout_minutes
    {
        fail(format!(
            "buffer.default_timeout_minutes must be at least buffer.min_timeout_minutes ({}), got {}",
            buffer.min_timeout_minutes, buffer.default_timeout_minutes
        ));
    }
    if buffer.max_messages < 2 {
        fail(format!(
            "buffer.max_messages must be at least 2, got {}",
            buffer.max_messages
        ));
    }
    if buffer.max_age_factor < 1 {
        fail("buffer.max_age_factor must be at least 1".to_string());
    }

    if config.webhook.timeout_secs == 0 {
        fail("webhook.timeout_secs must be greater than 0".to_string());
    }

    let gateway = &config.gateway;
    if gateway.enabled {
        let host = gateway.host.trim();
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = !host.is_empty()
            && host
                .chars()
                .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            ));
        }
        if gateway.rate_limit_requests == 0 {
            fail("gateway.rate_limit_requests must be greater than 0".to_string());
        }
        if gateway.rate_limit_window_secs == 0 {
            fail("gateway.rate_limit_window_secs must be greater than 0".to_string());
        }
    }

    if !config.bridge.url.starts_with("ws://") && !config.bridge.url.starts_with("wss://") {
        fail(format!(
            "bridge.url `{}` must be a ws:// or wss:// URL",
            config.bridge.url
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&LeadflowConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = LeadflowConfig::default();
        config.storage.database_path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn default_timeout_below_floor_fails() {
        let mut config = LeadflowConfig::default();
        config.buffer.default_timeout_minutes = 0.05;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "default_timeout_minutes"));
    }

    #[test]
    fn non_websocket_bridge_url_fails() {
        let mut config = LeadflowConfig::default();
        config.bridge.url = "http://localhost:8787".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "bridge.url"));
    }

    #[test]
    fn collects_multiple_errors() {
        let mut config = LeadflowConfig::default();
        config.service.log_level = "loud".to_string();
        config.vault.kdf_iterations = 1;
        config.gateway.rate_limit_requests = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn disabled_gateway_skips_gateway_checks() {
        let mut config = LeadflowConfig::default();
        config.gateway.enabled = false;
        config.gateway.host = "not a host!".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
