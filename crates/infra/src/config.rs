//! Configuration loading and representation.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. an optional file (format from its extension: toml, yaml, json, ...)
//! 3. environment variables `STOCKLEDGER__*`, nested with `__`
//!    (e.g. `STOCKLEDGER__DEFAULT_THRESHOLDS__LOW_STOCK=20`)

use std::path::Path;
use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_inventory::Thresholds;
use stockledger_observability::LogFormat;

use crate::control::ControlSettings;

pub const ENV_PREFIX: &str = "STOCKLEDGER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    pub low_stock: i64,
    pub reorder_point: i64,
    pub max_stock: i64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            low_stock: Thresholds::DEFAULT_LOW_STOCK,
            reorder_point: Thresholds::DEFAULT_REORDER_POINT,
            max_stock: Thresholds::DEFAULT_MAX_STOCK,
        }
    }
}

impl ThresholdsConfig {
    pub fn to_thresholds(&self) -> Result<Thresholds, ConfigError> {
        Thresholds::new(self.low_stock, self.reorder_point, self.max_stock)
            .map_err(|e| ConfigError::Invalid(format!("default_thresholds: {e}")))
    }
}

/// Runtime configuration of the inventory service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Bounded wait for a ledger entry lock.
    pub lock_timeout_ms: u64,
    /// Pause between expiry sweeps.
    pub sweep_interval_ms: u64,
    /// TTL for reservations made without one; 0 means no expiry.
    pub default_reservation_ttl_secs: u64,
    pub default_thresholds: ThresholdsConfig,
    pub log_format: LogFormat,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 250,
            sweep_interval_ms: 30_000,
            default_reservation_ttl_secs: 900,
            default_thresholds: ThresholdsConfig::default(),
            log_format: LogFormat::Json,
        }
    }
}

impl InventoryConfig {
    /// Load defaults, then `path` (if given, it must exist), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        Self::finish(builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        ))
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let d = Self::default();
        Ok(config::Config::builder()
            .set_default("lock_timeout_ms", d.lock_timeout_ms)?
            .set_default("sweep_interval_ms", d.sweep_interval_ms)?
            .set_default("default_reservation_ttl_secs", d.default_reservation_ttl_secs)?
            .set_default("default_thresholds.low_stock", d.default_thresholds.low_stock)?
            .set_default(
                "default_thresholds.reorder_point",
                d.default_thresholds.reorder_point,
            )?
            .set_default("default_thresholds.max_stock", d.default_thresholds.max_stock)?
            .set_default("log_format", d.log_format.as_str())?)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let cfg: InventoryConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.default_reservation_ttl_secs > 0 && self.default_reservation_ttl().is_none() {
            return Err(ConfigError::Invalid(
                "default_reservation_ttl_secs is out of range".to_string(),
            ));
        }
        self.default_thresholds.to_thresholds()?;
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn default_reservation_ttl(&self) -> Option<chrono::Duration> {
        match self.default_reservation_ttl_secs {
            0 => None,
            secs => i64::try_from(secs)
                .ok()
                .and_then(chrono::Duration::try_seconds),
        }
    }

    pub fn control_settings(&self) -> Result<ControlSettings, ConfigError> {
        Ok(ControlSettings {
            lock_timeout: self.lock_timeout(),
            default_thresholds: self.default_thresholds.to_thresholds()?,
            default_reservation_ttl: self.default_reservation_ttl(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<InventoryConfig, ConfigError> {
        InventoryConfig::finish(
            InventoryConfig::defaults()?.add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = from_toml("").unwrap();
        assert_eq!(cfg, InventoryConfig::default());

        let settings = cfg.control_settings().unwrap();
        assert_eq!(settings, ControlSettings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let cfg = from_toml(
            r#"
            lock_timeout_ms = 40
            default_reservation_ttl_secs = 0
            log_format = "pretty"

            [default_thresholds]
            low_stock = 25
            "#,
        )
        .unwrap();

        assert_eq!(cfg.lock_timeout(), Duration::from_millis(40));
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(30));
        assert_eq!(cfg.default_reservation_ttl(), None);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.default_thresholds.low_stock, 25);
        assert_eq!(cfg.default_thresholds.reorder_point, 5);
    }

    #[test]
    fn validation_rejects_zero_intervals_and_bad_thresholds() {
        assert!(matches!(
            from_toml("lock_timeout_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            from_toml("sweep_interval_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            from_toml("[default_thresholds]\nreorder_point = 50"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn unrepresentable_default_ttl_is_rejected() {
        let cfg = InventoryConfig {
            default_reservation_ttl_secs: 10_000_000_000_000_000,
            ..InventoryConfig::default()
        };
        assert_eq!(cfg.default_reservation_ttl(), None);
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        assert!(matches!(
            from_toml("default_reservation_ttl_secs = 10000000000000000"),
            Err(ConfigError::Invalid(_))
        ));

        let cfg = InventoryConfig {
            default_reservation_ttl_secs: 86_400 * 365,
            ..InventoryConfig::default()
        };
        assert_eq!(
            cfg.default_reservation_ttl(),
            Some(chrono::Duration::days(365))
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir().join("stockledger-does-not-exist.toml");
        assert!(matches!(
            InventoryConfig::load(Some(&path)),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn explicit_file_is_read() {
        let path = std::env::temp_dir().join(format!(
            "stockledger-config-{}.toml",
            stockledger_core::EventId::new()
        ));
        std::fs::write(&path, "sweep_interval_ms = 500\n").unwrap();

        let cfg = InventoryConfig::load(Some(&path));
        let _ = std::fs::remove_file(&path);

        assert_eq!(cfg.unwrap().sweep_interval(), Duration::from_millis(500));
    }
}
