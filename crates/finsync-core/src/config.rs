//! Runtime configuration.
//!
//! Defaults follow the production deployment: a one-minute timer, a 100 s
//! dispatcher budget and a 600 s worker budget.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinsyncConfig {
    /// How often the scheduler fires a dispatch cycle.
    pub schedule_interval_secs: u64,
    /// Wall-clock budget of one dispatch cycle.
    pub dispatch_budget_secs: u64,
    /// Wall-clock budget of one worker run.
    pub worker_budget_secs: u64,
    /// Long-lived workers popping from the work queue.
    pub worker_concurrency: usize,
    /// An active task untouched for this long is considered abandoned.
    pub stale_task_after_secs: u64,
    /// Minimum spacing between worker invocations. 0 disables limiting.
    pub min_invocation_interval_ms: u64,
    pub seller_page_size: usize,

    /// Names the Task Store.
    pub task_table: String,
    /// Names the Shipment Event Store.
    pub finances_table: String,
    /// Names the seller credential store.
    pub secrets_table: Option<String>,
    pub event_bus_name: String,
    /// Reference to the upstream application credentials. Reserved for a
    /// real upstream client; the scripted upstream does not authenticate.
    pub seller_central_app_credentials: Option<String>,
    /// Role assumed when a credential entry carries none.
    pub role_arn: Option<String>,
}

pub const DEFAULT_TASK_TABLE: &str = "sp_api_task";
pub const DEFAULT_FINANCES_TABLE: &str = "amz_sp_api_financial_shipment_event";

impl Default for FinsyncConfig {
    fn default() -> Self {
        Self {
            schedule_interval_secs: 60,
            dispatch_budget_secs: 100,
            worker_budget_secs: 600,
            worker_concurrency: 8,
            stale_task_after_secs: 1200,
            min_invocation_interval_ms: 0,
            seller_page_size: 100,
            task_table: DEFAULT_TASK_TABLE.to_string(),
            finances_table: DEFAULT_FINANCES_TABLE.to_string(),
            secrets_table: None,
            event_bus_name: "default".to_string(),
            seller_central_app_credentials: None,
            role_arn: None,
        }
    }
}

impl FinsyncConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: FinsyncConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        for (field, value) in [
            ("schedule_interval_secs", self.schedule_interval_secs),
            ("dispatch_budget_secs", self.dispatch_budget_secs),
            ("worker_budget_secs", self.worker_budget_secs),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if self.worker_concurrency == 0 {
            return Err(invalid("worker_concurrency", "must be at least 1"));
        }
        if self.seller_page_size == 0 {
            return Err(invalid("seller_page_size", "must be at least 1"));
        }
        // 実行中の worker を reaper が奪わないように
        if self.stale_task_after_secs <= self.worker_budget_secs {
            return Err(invalid(
                "stale_task_after_secs",
                format!(
                    "must exceed worker_budget_secs ({})",
                    self.worker_budget_secs
                ),
            ));
        }
        for (field, value) in [
            ("task_table", &self.task_table),
            ("finances_table", &self.finances_table),
            ("event_bus_name", &self.event_bus_name),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be blank"));
            }
        }
        Ok(())
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs)
    }

    pub fn dispatch_budget(&self) -> Duration {
        Duration::from_secs(self.dispatch_budget_secs)
    }

    pub fn worker_budget(&self) -> Duration {
        Duration::from_secs(self.worker_budget_secs)
    }

    pub fn stale_task_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_task_after_secs as i64)
    }

    /// `None` when invocations are not rate limited.
    pub fn min_invocation_interval(&self) -> Option<Duration> {
        (self.min_invocation_interval_ms > 0)
            .then(|| Duration::from_millis(self.min_invocation_interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let config = FinsyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.schedule_interval(), Duration::from_secs(60));
        assert_eq!(config.dispatch_budget(), Duration::from_secs(100));
        assert_eq!(config.worker_budget(), Duration::from_secs(600));
        assert_eq!(config.min_invocation_interval(), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = FinsyncConfig::from_toml_str(
            r#"
            worker_concurrency = 2
            event_bus_name = "finance-bus"
            secrets_table = "sp_api_secrets"
            "#,
        )
        .unwrap();

        assert_eq!(config.worker_concurrency, 2);
        assert_eq!(config.event_bus_name, "finance-bus");
        assert_eq!(config.secrets_table.as_deref(), Some("sp_api_secrets"));
        assert_eq!(config.task_table, "sp_api_task");
        assert_eq!(config.worker_budget_secs, 600);
    }

    #[rstest]
    #[case::zero_interval("schedule_interval_secs = 0", "schedule_interval_secs")]
    #[case::zero_workers("worker_concurrency = 0", "worker_concurrency")]
    #[case::zero_page("seller_page_size = 0", "seller_page_size")]
    #[case::stale_below_budget("stale_task_after_secs = 600", "stale_task_after_secs")]
    #[case::blank_bus("event_bus_name = \"  \"", "event_bus_name")]
    fn invalid_values_are_rejected(#[case] toml: &str, #[case] expected_field: &str) {
        let err = FinsyncConfig::from_toml_str(toml).unwrap_err();
        assert!(
            matches!(&err, ConfigError::Invalid { field, .. } if *field == expected_field),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = FinsyncConfig::from_toml_str("worker_concurrency = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = FinsyncConfig::from_toml_file("/nonexistent/finsync.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/finsync.toml"));
    }

    #[test]
    fn interval_limit_enabled_when_positive() {
        let config = FinsyncConfig {
            min_invocation_interval_ms: 250,
            ..FinsyncConfig::default()
        };
        assert_eq!(
            config.min_invocation_interval(),
            Some(Duration::from_millis(250))
        );
    }
}
