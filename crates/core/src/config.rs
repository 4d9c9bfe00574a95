use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::EntityKind;

/// Gamma API base URL.
pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// Errors raised while validating a loaded configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A numeric setting is outside its accepted range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A setting required by the requested command is missing.
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub api: ApiConfig,
    pub extraction: ExtractionConfig,
    pub retry: RetryConfig,
    pub lake: LakeConfig,
    pub warehouse: WarehouseConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Disabling this accepts any certificate presented by the API host.
    pub verify_tls: bool,
    pub user_agent: String,
    pub requests_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Records requested per page.
    pub page_limit: u32,
    /// Per-entity page size overrides, keyed by endpoint name.
    pub page_limits: HashMap<EntityKind, u32>,
    /// Upper bound on records per entity; 0 means unbounded.
    pub max_records: usize,
    /// Stop a crawl as soon as a page comes back shorter than requested.
    pub stop_on_short_page: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
}

/// How a sink write treats rows already in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    Overwrite,
    Append,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overwrite => write!(f, "overwrite"),
            Self::Append => write!(f, "append"),
        }
    }
}

impl std::str::FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "append" => Ok(Self::Append),
            other => Err(format!("unknown write mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LakeConfig {
    pub base_dir: PathBuf,
    pub write_mode: WriteMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Rows per committed batch for the fact and bridge stages.
    pub batch_size: usize,
    /// First calendar day of `dim_time`.
    pub time_start: NaiveDate,
    /// Last calendar day of `dim_time`.
    pub time_end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: GAMMA_API_URL.to_string(),
            timeout_secs: 30,
            verify_tls: true,
            user_agent: "market-warehouse/0.1".to_string(),
            requests_per_minute: 120,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            page_limit: 300,
            page_limits: HashMap::new(),
            max_records: 0,
            stop_on_short_page: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 2_000,
            backoff_factor: 1.5,
        }
    }
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("delta_lake"),
            write_mode: WriteMode::Overwrite,
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 1,
            batch_size: 5_000,
            time_start: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or_default(),
            time_end: NaiveDate::from_ymd_opt(2030, 12, 31).unwrap_or_default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ExtractionConfig {
    /// Returns the page size to request for `kind`.
    #[must_use]
    pub fn page_limit_for(&self, kind: EntityKind) -> u32 {
        self.page_limits
            .get(&kind)
            .copied()
            .unwrap_or(self.page_limit)
    }
}

impl PipelineConfig {
    /// Checks the settings every command relies on.
    ///
    /// # Errors
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("api.base_url"));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::invalid("api.timeout_secs", "must be positive"));
        }
        if self.api.requests_per_minute == 0 {
            return Err(ConfigError::invalid(
                "api.requests_per_minute",
                "must be positive",
            ));
        }
        if self.extraction.page_limit == 0 {
            return Err(ConfigError::invalid(
                "extraction.page_limit",
                "must be positive",
            ));
        }
        if let Some((kind, _)) = self.extraction.page_limits.iter().find(|(_, l)| **l == 0) {
            return Err(ConfigError::invalid(
                "extraction.page_limits",
                format!("page limit for {kind} must be positive"),
            ));
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::invalid(
                "retry.max_retries",
                "at least one attempt is required",
            ));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            return Err(ConfigError::invalid(
                "retry.backoff_factor",
                format!("{} is below 1.0", self.retry.backoff_factor),
            ));
        }
        if self.warehouse.batch_size == 0 {
            return Err(ConfigError::invalid(
                "warehouse.batch_size",
                "must be positive",
            ));
        }
        if self.warehouse.time_start > self.warehouse.time_end {
            return Err(ConfigError::invalid(
                "warehouse.time_start",
                format!(
                    "{} is after time_end {}",
                    self.warehouse.time_start, self.warehouse.time_end
                ),
            ));
        }
        Ok(())
    }

    /// Like [`validate`](Self::validate), and additionally requires a database URL.
    ///
    /// # Errors
    /// Returns the first invalid setting found.
    pub fn validate_for_database(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.warehouse.database_url.trim().is_empty() {
            return Err(ConfigError::Missing("warehouse.database_url"));
        }
        if self.warehouse.max_connections == 0 {
            return Err(ConfigError::invalid(
                "warehouse.max_connections",
                "must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 2_000);
        assert_eq!(config.warehouse.batch_size, 5_000);
        assert!(config.extraction.stop_on_short_page);
    }

    #[test]
    fn test_database_url_required_for_database_commands() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.validate_for_database(),
            Err(ConfigError::Missing("warehouse.database_url"))
        );
    }

    #[test]
    fn test_backoff_below_one_rejected() {
        let mut config = PipelineConfig::default();
        config.retry.backoff_factor = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "retry.backoff_factor",
                ..
            })
        ));
    }

    #[test]
    fn test_inverted_time_range_rejected() {
        let mut config = PipelineConfig::default();
        config.warehouse.time_start = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        config.warehouse.time_end = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_limit_override() {
        let mut config = ExtractionConfig::default();
        config.page_limits.insert(EntityKind::Markets, 500);
        assert_eq!(config.page_limit_for(EntityKind::Markets), 500);
        assert_eq!(config.page_limit_for(EntityKind::Tags), 300);
    }

    #[test]
    fn test_write_mode_parse() {
        assert_eq!("append".parse::<WriteMode>(), Ok(WriteMode::Append));
        assert_eq!("OVERWRITE".parse::<WriteMode>(), Ok(WriteMode::Overwrite));
        assert!("merge".parse::<WriteMode>().is_err());
    }
}
