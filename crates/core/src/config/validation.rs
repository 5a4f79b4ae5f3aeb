//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `shutdown_grace_ms` exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `sse.max_entries`, `sse.max_age_seconds` or `sse.max_buffered_bytes` is 0
    /// - `sse.cache_name` is empty
    /// - an `sse.routes` entry does not start with `/`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.shutdown_grace_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "shutdown_grace_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.sse.cache_name.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "sse.cache_name".into(), reason: "must not be empty".into() });
        }
        if self.sse.max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "sse.max_entries".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.sse.max_age_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "sse.max_age_seconds".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.sse.max_buffered_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "sse.max_buffered_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if let Some(route) = self.sse.routes.iter().find(|r| !r.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "sse.routes".into(),
                reason: format!("route {route:?} must be an absolute path"),
            });
        }

        if self.sse.routes.is_empty() {
            tracing::warn!("No sse.routes configured; every request will pass through uncached");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SseConfig;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { timeout_ms: 301_000, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_shutdown_grace_exceeds_limit() {
        let config = AppConfig { shutdown_grace_ms: 300_001, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "shutdown_grace_ms"));

        let config = AppConfig { shutdown_grace_ms: 0, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "user_agent"));
    }

    #[test]
    fn test_validate_zero_budgets() {
        let config = AppConfig { sse: SseConfig { max_entries: 0, ..Default::default() }, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "sse.max_entries"));

        let config = AppConfig { sse: SseConfig { max_age_seconds: 0, ..Default::default() }, ..Default::default() };
        assert!(
            matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "sse.max_age_seconds")
        );

        let config =
            AppConfig { sse: SseConfig { max_buffered_bytes: 0, ..Default::default() }, ..Default::default() };
        assert!(
            matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "sse.max_buffered_bytes")
        );
    }

    #[test]
    fn test_validate_relative_route() {
        let config = AppConfig {
            sse: SseConfig { routes: vec!["/ok".into(), "events".into()], ..Default::default() },
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "sse.routes"));
    }

    #[test]
    fn test_validate_empty_cache_name() {
        let config =
            AppConfig { sse: SseConfig { cache_name: "  ".into(), ..Default::default() }, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "sse.cache_name"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig {
            timeout_ms: 100,
            sse: SseConfig { max_entries: 1, max_age_seconds: 1, max_buffered_bytes: 1, ..Default::default() },
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
