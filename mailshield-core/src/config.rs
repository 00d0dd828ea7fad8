// Pipeline configuration, loaded from a JSON file with defaults for every field.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/mailshield/config.json";
pub const DEFAULT_MARKER_ATTRIBUTE: &str = "data-mailshield-scanned";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base URL of the threat API.
    pub backend_url: String,
    pub request_timeout_secs: u64,
    /// Quiet period before a scan pass runs.
    pub debounce_ms: u64,
    pub toast_duration_ms: u64,
    /// Upper bound on concurrent scoring requests within one pass.
    pub max_in_flight: usize,
    pub marker_attribute: String,
    /// Selectors tried in order to find the primary reading pane.
    pub content_roots: Vec<String>,
    /// Links inside these regions are never scanned.
    pub excluded_regions: Vec<String>,
    /// Extra domains treated as the host application's own.
    pub host_domains: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 10,
            debounce_ms: 1000,
            toast_duration_ms: 5000,
            max_in_flight: 8,
            marker_attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
            content_roots: vec!["[role=main]".to_string()],
            excluded_regions: vec![
                "nav".to_string(),
                "header".to_string(),
                "footer".to_string(),
                "[role=navigation]".to_string(),
                "[role=banner]".to_string(),
                "[role=contentinfo]".to_string(),
                "[role=menu]".to_string(),
                "[role=menubar]".to_string(),
            ],
            host_domains: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path(), false),
        };

        if !explicit && !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?;

        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match Url::parse(&self.backend_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::Invalid {
                    field: "backend_url",
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::Invalid {
                    field: "backend_url",
                    reason: e.to_string(),
                });
            }
        }

        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                field: "max_in_flight",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.debounce_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "debounce_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.marker_attribute.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "marker_attribute",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde(DEFAULT_CONFIG_PATH).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.debounce_window(), Duration::from_millis(1000));
        assert_eq!(config.toast_duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = PipelineConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "max_in_flight",
                ..
            })
        ));

        let config = PipelineConfig {
            backend_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_path_is_expanded() {
        let path = default_config_path();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with("mailshield/config.json"));
    }
}
