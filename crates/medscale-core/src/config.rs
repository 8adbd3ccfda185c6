//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current config version. Bump when changing shape.
const CURRENT_VERSION: u32 = 1;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config version {found} is newer than supported ({supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn default_language() -> String {
    crate::models::FALLBACK_LANGUAGE.to_string()
}

fn default_fallback_interpretation() -> String {
    "Refer to source documentation for interpretation guidelines.".to_string()
}

fn default_fallback_recommendation() -> String {
    "Consult clinical guidelines and source documentation.".to_string()
}

/// Evaluator settings. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub config_version: u32,
    /// Language used when a request does not name one
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Meaning returned when no interpretation range matches
    #[serde(default = "default_fallback_interpretation")]
    pub fallback_interpretation: String,
    /// Recommendation returned when no interpretation range matches
    #[serde(default = "default_fallback_recommendation")]
    pub fallback_recommendation: String,
    /// Reject units on variables that declare no standard unit instead of
    /// passing the value through unchanged.
    #[serde(default)]
    pub strict_units: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_version: CURRENT_VERSION,
            default_language: default_language(),
            fallback_interpretation: default_fallback_interpretation(),
            fallback_recommendation: default_fallback_recommendation(),
            strict_units: false,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        if config.config_version > CURRENT_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: config.config_version,
                supported: CURRENT_VERSION,
            });
        }
        config.config_version = CURRENT_VERSION;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&contents)?;
        tracing::debug!(path = %path.as_ref().display(), "Loaded engine config");
        Ok(config)
    }

    /// Pretty JSON form.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config =
            EngineConfig::from_json_str(r#"{"default_language": "pt", "strict_units": true}"#).unwrap();
        assert_eq!(config.default_language, "pt");
        assert!(config.strict_units);
        assert_eq!(
            config.fallback_recommendation,
            "Consult clinical guidelines and source documentation."
        );
    }

    #[test]
    fn test_newer_version_rejected() {
        let err = EngineConfig::from_json_str(r#"{"config_version": 99}"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, EngineConfig::default().to_json().unwrap()).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(EngineConfig::from_json_str("{"), Err(ConfigError::Json(_))));
    }
}
