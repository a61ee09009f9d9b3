use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ConfigError;

/// Environment variable that overrides the data root.
pub const DATA_ROOT_ENV: &str = "TALLY_HOME";

const MAX_PRECISION: u8 = 6;

/// Stores user-configurable settings for the bookkeeping core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub locale: String,
    pub currency: String,
    /// Decimal places every derived amount is rounded to.
    #[serde(default = "Config::default_amount_precision")]
    pub amount_precision: u8,
    /// Bound of the audit/archive queue; records beyond it are dropped.
    #[serde(default = "Config::default_audit_queue_capacity")]
    pub audit_queue_capacity: usize,
    /// `tracing` filter directive applied on top of `RUST_LOG`.
    #[serde(default = "Config::default_log_filter")]
    pub log_filter: String,
    #[serde(default = "Config::default_backup_retention")]
    pub backup_retention: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_opened_book: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Optional custom data root. Defaults to `~/.tally`.
    pub data_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locale: "en-US".into(),
            currency: "USD".into(),
            amount_precision: Self::default_amount_precision(),
            audit_queue_capacity: Self::default_audit_queue_capacity(),
            log_filter: Self::default_log_filter(),
            backup_retention: Self::default_backup_retention(),
            last_opened_book: None,
            data_root: None,
        }
    }
}

impl Config {
    pub fn default_amount_precision() -> u8 {
        2
    }

    pub fn default_audit_queue_capacity() -> usize {
        256
    }

    pub fn default_log_filter() -> String {
        "tally=info".into()
    }

    pub fn default_backup_retention() -> usize {
        5
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.amount_precision > MAX_PRECISION {
            return Err(ConfigError::Invalid(format!(
                "amount_precision must be at most {MAX_PRECISION}, got {}",
                self.amount_precision
            )));
        }
        if self.audit_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "audit_queue_capacity must be positive".into(),
            ));
        }
        if self.backup_retention == 0 {
            return Err(ConfigError::Invalid(
                "backup_retention must keep at least one backup".into(),
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter cannot be blank".into()));
        }
        Ok(())
    }

    /// `TALLY_HOME` wins, then the configured root, then `~/.tally`.
    pub fn resolve_data_root(&self) -> PathBuf {
        self.resolve_data_root_with(std::env::var_os(DATA_ROOT_ENV).map(PathBuf::from))
    }

    pub fn resolve_data_root_with(&self, env_override: Option<PathBuf>) -> PathBuf {
        if let Some(path) = env_override.filter(|path| !path.as_os_str().is_empty()) {
            return path;
        }
        if let Some(path) = &self.data_root {
            return path.clone();
        }

        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join(".tally")
    }
}
