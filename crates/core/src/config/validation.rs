//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, CacheMode};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

const MAX_RENDERER_INSTANCES: usize = 64;

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `renderer_instances` is 0 or exceeds 64
    /// - `worker_pool_size` is 0
    /// - `render_timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `url_patterns` is empty or holds a pattern not starting with `/` or `*.`
    /// - `base_url` is not an absolute http(s) URL
    ///
    /// Returns `ConfigError::Missing` if file mode has no `cache_directory`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.renderer_instances == 0 {
            return Err(ConfigError::Invalid {
                field: "renderer_instances".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.renderer_instances > MAX_RENDERER_INSTANCES {
            return Err(ConfigError::Invalid {
                field: "renderer_instances".into(),
                reason: format!("must not exceed {MAX_RENDERER_INSTANCES}"),
            });
        }

        if self.worker_pool_size == 0 {
            return Err(ConfigError::Invalid {
                field: "worker_pool_size".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.render_timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "render_timeout_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.render_timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "render_timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.url_patterns.is_empty() {
            return Err(ConfigError::Invalid { field: "url_patterns".into(), reason: "must not be empty".into() });
        }
        if let Some(pattern) = self
            .url_patterns
            .iter()
            .find(|p| !(p.starts_with('/') || (p.starts_with("*.") && p.len() > 2)))
        {
            return Err(ConfigError::Invalid {
                field: "url_patterns".into(),
                reason: format!("pattern `{pattern}` must start with `/` or `*.`"),
            });
        }

        if let Some(base) = &self.base_url {
            match url::Url::parse(base) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {}
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        field: "base_url".into(),
                        reason: "must be an absolute http(s) URL".into(),
                    });
                }
                Err(e) => return Err(ConfigError::Invalid { field: "base_url".into(), reason: e.to_string() }),
            }
        }

        if self.cache_mode == CacheMode::File {
            self.require_cache_directory()?;
        }

        if self.cache_max_entries.is_some() && self.cache_mode != CacheMode::Sqlite {
            tracing::warn!(
                cache_mode = self.cache_mode.as_str(),
                "cache_max_entries only applies to the sqlite cache; ignoring"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_renderer_instances_zero() {
        let config = AppConfig { renderer_instances: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "renderer_instances"));
    }

    #[test]
    fn test_validate_renderer_instances_exceeds_limit() {
        let config = AppConfig { renderer_instances: 65, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "renderer_instances"));
    }

    #[test]
    fn test_validate_worker_pool_zero() {
        let config = AppConfig { worker_pool_size: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "worker_pool_size"));
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { render_timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "render_timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { render_timeout_ms: 301_000, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "render_timeout_ms"));
    }

    #[test]
    fn test_validate_empty_patterns() {
        let config = AppConfig { url_patterns: Vec::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "url_patterns"));
    }

    #[test]
    fn test_validate_relative_pattern() {
        let config = AppConfig { url_patterns: vec!["cached/*".into()], ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "url_patterns"));
    }

    #[test]
    fn test_validate_extension_pattern() {
        let config = AppConfig { url_patterns: vec!["*.html".into(), "/app/*".into()], ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_base_url() {
        let config = AppConfig { base_url: Some("not a url".into()), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "base_url"));

        let config = AppConfig { base_url: Some("ftp://example.com".into()), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "base_url"));
    }

    #[test]
    fn test_validate_file_mode_requires_directory() {
        let config = AppConfig { cache_mode: CacheMode::File, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Missing { field, .. }) if field == "cache_directory"));

        let config =
            AppConfig { cache_mode: CacheMode::File, cache_directory: Some(PathBuf::from("/tmp")), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig { renderer_instances: 64, render_timeout_ms: 100, worker_pool_size: 1, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
