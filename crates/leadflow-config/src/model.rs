// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key fails
//! at startup instead of being silently ignored.

use serde::{Deserialize, Serialize};

/// Top-level Leadflow configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeadflowConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Credential vault key derivation.
    #[serde(default)]
    pub vault: VaultConfig,

    /// AI scorer settings.
    #[serde(default)]
    pub scorer: ScorerConfig,

    /// Contact buffer (debounce) settings.
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Transport reconnect backoff.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Outbound webhook delivery.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// HTTP ingress gateway.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Chat bridge sidecar.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "leadflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("leadflow").join("leadflow.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("leadflow.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Credential vault configuration.
///
/// Argon2id parameters used to derive the key that wraps the vault master
/// key. Defaults follow OWASP recommendations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Memory cost in KiB.
    #[serde(default = "default_kdf_memory_cost")]
    pub kdf_memory_cost: u32,

    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    #[serde(default = "default_kdf_parallelism")]
    pub kdf_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_memory_cost: default_kdf_memory_cost(),
            kdf_iterations: default_kdf_iterations(),
            kdf_parallelism: default_kdf_parallelism(),
        }
    }
}

fn default_kdf_memory_cost() -> u32 {
    65536 // 64 MiB
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    4
}

/// AI scorer (Anthropic Messages API) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScorerConfig {
    /// API key. `None` falls back to `ANTHROPIC_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Upper bound on a single scoring call, in seconds.
    #[serde(default = "default_scorer_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_scorer_base_url")]
    pub base_url: String,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_version: default_api_version(),
            timeout_secs: default_scorer_timeout_secs(),
            base_url: default_scorer_base_url(),
        }
    }
}

fn default_model() -> String {
    "claude-haiku-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_scorer_timeout_secs() -> u64 {
    30
}

fn default_scorer_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

/// Contact buffer configuration.
///
/// Tenants override the quiet period with the `buffer_timeout_minutes`
/// setting; the rest applies to every tenant.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BufferConfig {
    /// Quiet period used when a tenant has no valid setting.
    #[serde(default = "default_timeout_minutes")]
    pub default_timeout_minutes: f64,

    /// Floor applied to tenant-configured quiet periods.
    #[serde(default = "default_min_timeout_minutes")]
    pub min_timeout_minutes: f64,

    /// A buffer reaching this many messages is flushed immediately.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// A buffer older than this multiple of its quiet period is flushed on
    /// the next message.
    #[serde(default = "default_max_age_factor")]
    pub max_age_factor: u32,

    /// Identical text arriving within this window is treated as a redelivery.
    #[serde(default = "default_duplicate_window_ms")]
    pub duplicate_window_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            default_timeout_minutes: default_timeout_minutes(),
            min_timeout_minutes: default_min_timeout_minutes(),
            max_messages: default_max_messages(),
            max_age_factor: default_max_age_factor(),
            duplicate_window_ms: default_duplicate_window_ms(),
        }
    }
}

fn default_timeout_minutes() -> f64 {
    2.0
}

fn default_min_timeout_minutes() -> f64 {
    0.1
}

fn default_max_messages() -> usize {
    50
}

fn default_max_age_factor() -> u32 {
    5
}

fn default_duplicate_window_ms() -> u64 {
    1000
}

/// Reconnect backoff after a non-logout close.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of the uniform random delay added to the base.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    3000
}

fn default_jitter_ms() -> u64 {
    2000
}

/// Outbound webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

/// HTTP ingress gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Requests allowed per client address per window.
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            host: default_gateway_host(),
            port: default_gateway_port(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
        }
    }
}

fn default_gateway_enabled() -> bool {
    true
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_rate_limit_requests() -> u32 {
    60
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

/// Chat bridge sidecar configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Base WebSocket URL; sessions connect to `{url}/instances/{id}`.
    #[serde(default = "default_bridge_url")]
    pub url: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: default_bridge_url(),
        }
    }
}

fn default_bridge_url() -> String {
    "ws://127.0.0.1:8787".to_string()
}
