//! Configuration loading utilities.
//!
//! This module provides layered configuration loading using figment:
//! - Default values (compiled in)
//! - Configuration file (TOML)
//! - Environment variables
//!
//! Loading itself (locating the file, wiring a CLI flag, etc.) is an
//! external collaborator's job per `spec.md` §1; this module only defines
//! the shape of what gets populated and the merge order.
//!
//! # Example
//!
//! ```rust,ignore
//! use qcp_common::config::{QcpConfig, load_config};
//!
//! let config: QcpConfig = load_config("qcp", None)?;
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Database connection configuration for the quota database.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_database_url() -> String {
    "postgres://localhost/qcp".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

/// How to reach the downstream AiGateway admin API (`spec.md` §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Base path for quota/used endpoints, e.g. `https://gateway.internal/api`.
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// Base path for the admin (whitelist/flag) endpoints.
    #[serde(default = "default_gateway_admin_base_path")]
    pub admin_base_path: String,

    /// Header name carrying the gateway authentication token.
    #[serde(default = "default_auth_header_name")]
    pub auth_header_name: String,

    /// Header value (token). Wrapped to avoid leaking into `Debug`/logs.
    #[serde(default)]
    pub auth_header_value: Option<SecretString>,

    /// Per-call timeout in seconds.
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
}

fn default_gateway_base_url() -> String {
    "http://localhost:8081/api".to_string()
}

fn default_gateway_admin_base_path() -> String {
    "http://localhost:8081/admin".to_string()
}

fn default_auth_header_name() -> String {
    "Authorization".to_string()
}

fn default_gateway_timeout() -> u64 {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            admin_base_path: default_gateway_admin_base_path(),
            auth_header_name: default_auth_header_name(),
            auth_header_value: None,
            timeout_seconds: default_gateway_timeout(),
        }
    }
}

/// Scheduler behavior (`spec.md` §5, §4.3 "Scheduler").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Cron expression for the daily expiry sweep.
    #[serde(default = "default_expiry_sweep_cron")]
    pub expiry_sweep_cron: String,

    /// Number of advisory-lock slots the per-user hash maps onto.
    #[serde(default = "default_advisory_lock_slots")]
    pub advisory_lock_slots: u32,

    /// How often the scheduler checks for a cancellation signal between
    /// users during a long job (sweep, strategy scan).
    #[serde(default = "default_cancellation_poll_interval_ms")]
    pub cancellation_poll_interval_ms: u64,
}

fn default_expiry_sweep_cron() -> String {
    "0 0 3 * * *".to_string()
}

fn default_advisory_lock_slots() -> u32 {
    256
}

fn default_cancellation_poll_interval_ms() -> u64 {
    50
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            expiry_sweep_cron: default_expiry_sweep_cron(),
            advisory_lock_slots: default_advisory_lock_slots(),
            cancellation_poll_interval_ms: default_cancellation_poll_interval_ms(),
        }
    }
}

/// Voucher signing configuration (`spec.md` §3 Voucher, §6 "Voucher format").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VoucherConfig {
    /// HMAC signing secret. Never logged; zeroized on drop by `secrecy`.
    #[serde(default = "default_voucher_secret")]
    pub hmac_secret: SecretString,

    /// How long an issued-but-unredeemed voucher remains valid, in seconds.
    #[serde(default = "default_voucher_ttl")]
    pub ttl_seconds: u64,
}

fn default_voucher_secret() -> SecretString {
    SecretString::from("development-only-insecure-voucher-secret".to_string())
}

fn default_voucher_ttl() -> u64 {
    30 * 24 * 60 * 60
}

impl Default for VoucherConfig {
    fn default() -> Self {
        Self {
            hmac_secret: default_voucher_secret(),
            ttl_seconds: default_voucher_ttl(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging.
    #[serde(default)]
    pub json_logs: bool,

    /// Service name for tracing.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "qcp".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
        }
    }
}

/// Complete control-plane configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct QcpConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub voucher: VoucherConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Load configuration from layered sources.
///
/// Sources (in order of precedence):
/// 1. Defaults (lowest)
/// 2. Configuration file (if provided)
/// 3. Environment variables (highest)
///
/// Environment variables are prefixed with the uppercase `prefix` followed
/// by `_`. For example, with prefix "qcp", `QCP_DATABASE_URL` sets
/// `database.url`.
pub fn load_config<T: Default + Serialize + for<'de> Deserialize<'de>>(
    prefix: &str,
    config_file: Option<&str>,
) -> Result<T, figment::Error> {
    let mut figment = Figment::new().merge(Serialized::defaults(T::default()));

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed(&format!("{}_", prefix.to_uppercase())).split("_"));

    figment.extract()
}

/// Load the complete control-plane configuration from defaults, file, and
/// environment.
pub fn load_qcp_config(config_file: Option<&str>) -> Result<QcpConfig, figment::Error> {
    load_config("qcp", config_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_config_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn qcp_config_defaults() {
        let config = QcpConfig::default();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.scheduler.advisory_lock_slots, 256);
        assert_eq!(config.voucher.ttl_seconds, 30 * 24 * 60 * 60);
    }

    #[test]
    fn load_config_defaults() {
        let config: QcpConfig = load_config("qcp_test", None).unwrap();
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn env_override_applies_over_defaults() {
        std::env::set_var("QCPENVTEST_SCHEDULER_ADVISORY_LOCK_SLOTS", "512");
        let config: QcpConfig = load_config("qcpenvtest", None).unwrap();
        assert_eq!(config.scheduler.advisory_lock_slots, 512);
        std::env::remove_var("QCPENVTEST_SCHEDULER_ADVISORY_LOCK_SLOTS");
    }
}
