use crate::error::{CashflowError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whether the crate serves real tenant data or the seeded demo dataset.
/// Chosen by the embedding application at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Live,
    Mockup,
}

/// Longest consolidated report window, in months.
pub const MAX_REPORT_MONTHS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    #[schemars(description = "Live tenant data, or the in-memory demo dataset.")]
    pub run_mode: RunMode,

    #[schemars(
        description = "How many of the most recent monthly records the dispatcher reads when computing trailing averages. Must be at least 3."
    )]
    pub history_limit: usize,

    #[schemars(description = "Number of months covered by the consolidated report, 1 to 120.")]
    pub report_months: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::Live,
            history_limit: 12,
            report_months: 12,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_limit < 3 {
            return Err(CashflowError::InvalidConfig(format!(
                "history_limit must be at least 3, got {}",
                self.history_limit
            )));
        }
        if !(1..=MAX_REPORT_MONTHS).contains(&self.report_months) {
            return Err(CashflowError::InvalidConfig(format!(
                "report_months must be between 1 and {}, got {}",
                MAX_REPORT_MONTHS, self.report_months
            )));
        }
        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EngineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = EngineConfig::from_json_str(r#"{"run_mode": "mockup"}"#).unwrap();
        assert_eq!(config.run_mode, RunMode::Mockup);
        assert_eq!(config.history_limit, 12);
        assert_eq!(config.report_months, 12);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"history_limit": 2}"#),
            Err(CashflowError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"report_months": 0}"#),
            Err(CashflowError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"report_months": 121}"#),
            Err(CashflowError::InvalidConfig(_))
        ));
        assert!(EngineConfig::from_json_str(r#"{"report_months": 120}"#).is_ok());
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"run_mode": "staging"}"#),
            Err(CashflowError::SerializationError(_))
        ));
    }

    #[test]
    fn test_from_missing_path_is_io_error() {
        assert!(matches!(
            EngineConfig::from_path("/nonexistent/cashflow.json"),
            Err(CashflowError::IoError(_))
        ));
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = EngineConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("history_limit"));
        assert!(schema_json.contains("mockup"));
    }
}
