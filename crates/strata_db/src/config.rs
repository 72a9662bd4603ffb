// config.rs - Database tuning knobs

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Default chunk size, picked to keep a chunk's hot columns inside L2.
pub const DEFAULT_CHUNK_BYTE_BUDGET: usize = 128 * 1024;

/// Smallest chunk budget that still admits a handful of entities per chunk.
pub const MIN_CHUNK_BYTE_BUDGET: usize = 1024;

/// Chunk count per archetype after which a warning is logged.
pub const DEFAULT_CHUNK_COUNT_WARN_THRESHOLD: usize = 80;

/// Database configuration.
///
/// Loadable from JSON; missing fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Bytes reserved for component columns in every chunk.
    pub chunk_byte_budget: usize,
    /// Number of chunks in one archetype that triggers a warning.
    pub chunk_count_warn_threshold: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            chunk_byte_budget: DEFAULT_CHUNK_BYTE_BUDGET,
            chunk_count_warn_threshold: DEFAULT_CHUNK_COUNT_WARN_THRESHOLD,
        }
    }
}

impl DatabaseConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Copy of this config with a different chunk budget.
    pub fn with_chunk_byte_budget(mut self, chunk_byte_budget: usize) -> Self {
        self.chunk_byte_budget = chunk_byte_budget;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_chunk_byte_budget(self.chunk_byte_budget)?;
        if self.chunk_count_warn_threshold == 0 {
            return Err(ConfigError::ZeroWarnThreshold);
        }
        Ok(())
    }
}

pub(crate) fn validate_chunk_byte_budget(budget: usize) -> Result<(), ConfigError> {
    if budget < MIN_CHUNK_BYTE_BUDGET {
        return Err(ConfigError::BudgetTooSmall {
            budget,
            minimum: MIN_CHUNK_BYTE_BUDGET,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DatabaseConfig::default();
        assert_eq!(config.chunk_byte_budget, 128 * 1024);
        assert_eq!(config.chunk_count_warn_threshold, 80);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = DatabaseConfig::from_json_str(r#"{ "chunk_byte_budget": 4096 }"#).unwrap();
        assert_eq!(config.chunk_byte_budget, 4096);
        assert_eq!(config.chunk_count_warn_threshold, DEFAULT_CHUNK_COUNT_WARN_THRESHOLD);
    }

    #[test]
    fn rejects_tiny_budget() {
        let err = DatabaseConfig::from_json_str(r#"{ "chunk_byte_budget": 512 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::BudgetTooSmall { budget: 512, .. }));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = DatabaseConfig::from_json_str("{ chunk_byte_budget: }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_zero_threshold() {
        let config = DatabaseConfig {
            chunk_count_warn_threshold: 0,
            ..DatabaseConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroWarnThreshold)));
    }
}
