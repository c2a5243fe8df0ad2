use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_QUOTA_CEILING: i32 = 50;
/// Default composite-number multiplier, the size of each tenant's sequence space.
const DEFAULT_SEQUENCE_MULTIPLIER: i64 = 10_000_000;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 60;

/// Database connection configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of pooled connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

/// Billing behavior: quota ceiling and bill-number derivation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Monthly order ceiling applied to non-pro tenants
    #[validate(range(min = 1))]
    #[serde(default = "default_quota_ceiling")]
    pub quota_ceiling: i32,

    /// Multiplier for the composite order number:
    /// `tenant_id * sequence_multiplier + sequence`. Must exceed any
    /// plausible per-tenant order count.
    #[serde(default = "default_sequence_multiplier")]
    pub sequence_multiplier: i64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            quota_ceiling: default_quota_ceiling(),
            sequence_multiplier: default_sequence_multiplier(),
        }
    }
}

impl BillingConfig {
    /// The multiplier bounds every tenant's sequence space; a misconfigured
    /// value silently corrupts composite-number uniqueness, so it is
    /// rejected at load rather than trusted.
    pub fn validate_multiplier(&self) -> Result<(), ConfigError> {
        let m = self.sequence_multiplier;
        if m < 1_000_000 {
            return Err(ConfigError::Message(format!(
                "billing.sequence_multiplier must be at least 1_000_000, got {m}"
            )));
        }
        let mut n = m;
        while n % 10 == 0 {
            n /= 10;
        }
        if n != 1 {
            return Err(ConfigError::Message(format!(
                "billing.sequence_multiplier must be a power of ten, got {m}"
            )));
        }
        Ok(())
    }
}

/// Retry behavior for transient datastore conflicts
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[validate(range(min = 1, max = 10))]
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,

    /// Wall-clock budget per attempt, in seconds
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            delay_ms: default_retry_delay_ms(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON-formatted log lines instead of human-readable ones
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Application configuration with validation
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    #[validate]
    pub database: DatabaseConfig,

    #[serde(default)]
    #[validate]
    pub billing: BillingConfig,

    #[serde(default)]
    #[validate]
    pub retry: RetryConfig,

    #[serde(default)]
    #[validate]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration layered as defaults, then
    /// `config/{RUN_MODE}.toml` if present, then `BILLING__*` environment
    /// variables (e.g. `BILLING__DATABASE__URL`).
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let config = Config::builder()
            .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_mode}")).required(false))
            .add_source(Environment::with_prefix("BILLING").separator("__"))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;

        app_config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        app_config.billing.validate_multiplier()?;

        info!(
            run_mode = %run_mode,
            quota_ceiling = app_config.billing.quota_ceiling,
            sequence_multiplier = app_config.billing.sequence_multiplier,
            "Configuration loaded"
        );

        Ok(app_config)
    }
}

fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    1
}
fn default_acquire_timeout_secs() -> u64 {
    8
}
fn default_quota_ceiling() -> i32 {
    DEFAULT_QUOTA_CEILING
}
fn default_sequence_multiplier() -> i64 {
    DEFAULT_SEQUENCE_MULTIPLIER
}
fn default_retry_max_attempts() -> u32 {
    DEFAULT_RETRY_MAX_ATTEMPTS
}
fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}
fn default_attempt_timeout_secs() -> u64 {
    DEFAULT_ATTEMPT_TIMEOUT_SECS
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.billing.validate_multiplier().is_ok());
        assert_eq!(config.billing.quota_ceiling, 50);
        assert_eq!(config.billing.sequence_multiplier, 10_000_000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay_ms, 2_000);
        assert_eq!(config.retry.attempt_timeout_secs, 60);
    }

    #[test]
    fn multiplier_must_be_power_of_ten() {
        let billing = BillingConfig {
            quota_ceiling: 50,
            sequence_multiplier: 5_000_000,
        };
        assert!(billing.validate_multiplier().is_err());
    }

    #[test]
    fn multiplier_must_be_large_enough() {
        let billing = BillingConfig {
            quota_ceiling: 50,
            sequence_multiplier: 100_000,
        };
        assert!(billing.validate_multiplier().is_err());
    }
}
