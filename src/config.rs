//! # Configuration
//!
//! Session configuration, read from an optional YAML file and overridden by
//! environment variables.
//!
//! ## File Format
//! ```yaml
//! backend-url: http://localhost:8080
//! log-level: debug
//! pulses-per-quarter: 720
//! echo-tolerance: 1.0
//! sync-tolerance: 2.0
//! layout-padding: 0
//! beat-length: 0.25
//! ```
//! Every key is optional.
//!
//! ## Environment
//! - `MPM_EDITOR_BACKEND_URL` - base URL of the rendering backend
//! - `MPM_EDITOR_LOG` - log level / filter directive

use std::path::Path;

use serde::Deserialize;

use crate::error::{EditorError, Result};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";
pub const BACKEND_URL_ENV: &str = "MPM_EDITOR_BACKEND_URL";
pub const LOG_ENV: &str = "MPM_EDITOR_LOG";

/// Tolerances of the scroll registry, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollConfig {
    /// Max distance between an observed offset and the one we set for the
    /// event to count as our own echo
    pub echo_tolerance: f64,
    /// Min distance before a peer pane is moved at all
    pub sync_tolerance: f64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            echo_tolerance: 1.0,
            sync_tolerance: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend_url: String,
    pub log_level: String,
    /// Used when an MSM does not declare its own resolution
    pub pulses_per_quarter: u32,
    pub scroll: ScrollConfig,
    /// Minimum gap (ticks) between two argumentation spans sharing a track
    pub layout_padding: f64,
    /// Beat length (in whole notes) of newly approximated tempo instructions
    pub beat_length: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            log_level: "info".to_string(),
            pulses_per_quarter: 720,
            scroll: ScrollConfig::default(),
            layout_padding: 0.0,
            beat_length: 0.25,
        }
    }
}

/// Raw configuration for YAML deserialization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    backend_url: Option<String>,
    log_level: Option<String>,
    pulses_per_quarter: Option<u32>,
    echo_tolerance: Option<f64>,
    sync_tolerance: Option<f64>,
    layout_padding: Option<f64>,
    beat_length: Option<f64>,
}

impl Config {
    /// Parse a YAML configuration. Missing keys keep their defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };

        let mut config = Config::default();
        if let Some(url) = raw.backend_url {
            config.backend_url = url;
        }
        if let Some(level) = raw.log_level {
            config.log_level = level;
        }
        if let Some(ppq) = raw.pulses_per_quarter {
            config.pulses_per_quarter = ppq;
        }
        if let Some(tolerance) = raw.echo_tolerance {
            config.scroll.echo_tolerance = tolerance;
        }
        if let Some(tolerance) = raw.sync_tolerance {
            config.scroll.sync_tolerance = tolerance;
        }
        if let Some(padding) = raw.layout_padding {
            config.layout_padding = padding;
        }
        if let Some(beat_length) = raw.beat_length {
            config.beat_length = beat_length;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// File (if given), then environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.backend_url = url;
        }
        if let Some(level) = lookup(LOG_ENV).filter(|v| !v.trim().is_empty()) {
            self.log_level = level;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.pulses_per_quarter == 0 {
            return Err(EditorError::InvalidConfig(
                "pulses-per-quarter must be positive".to_string(),
            ));
        }
        if !(self.beat_length > 0.0) {
            return Err(EditorError::InvalidConfig(format!(
                "beat-length must be positive, got {}",
                self.beat_length
            )));
        }
        if self.scroll.echo_tolerance < 0.0 || self.scroll.sync_tolerance < 0.0 {
            return Err(EditorError::InvalidConfig(
                "scroll tolerances must not be negative".to_string(),
            ));
        }
        if self.layout_padding < 0.0 {
            return Err(EditorError::InvalidConfig(
                "layout-padding must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backend_url, "http://localhost:8080");
        assert_eq!(config.scroll.sync_tolerance, 2.0);
        assert_eq!(config.pulses_per_quarter, 720);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn test_yaml_overrides() {
        let config = Config::from_yaml(
            "backend-url: http://render:9000\nsync-tolerance: 4\nbeat-length: 0.125\n",
        )
        .unwrap();
        assert_eq!(config.backend_url, "http://render:9000");
        assert_eq!(config.scroll.sync_tolerance, 4.0);
        assert_eq!(config.scroll.echo_tolerance, 1.0);
        assert_eq!(config.beat_length, 0.125);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = Config::from_yaml("backend: nope\n");
        assert!(matches!(result, Err(EditorError::Yaml(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::from_yaml("pulses-per-quarter: 0\n"),
            Err(EditorError::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_yaml("beat-length: -1\n"),
            Err(EditorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            BACKEND_URL_ENV => Some("http://elsewhere:1234".to_string()),
            LOG_ENV => Some(" ".to_string()),
            _ => None,
        });
        assert_eq!(config.backend_url, "http://elsewhere:1234");
        assert_eq!(config.log_level, "info");
    }
}
