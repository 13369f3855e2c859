//! Engine configuration
//!
//! Loaded from a JSON file. Every field has a default, so `{}` is a valid
//! configuration.
//!
//! ```json
//! {
//!   "max_object_size": 4096,
//!   "split": { "strategy": "first_fit" },
//!   "log_level": "info",
//!   "sync_writes": false
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::observability::{log_event_with_fields, Event, Logger, Severity};
use crate::split::SplitPolicy;

/// Smallest accepted page capacity
pub const MIN_PAGE_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Page capacity in bytes (optional, default 4096)
    #[serde(default = "default_max_object_size")]
    pub max_object_size: usize,

    /// How overflowing children are grouped (optional, default first_fit)
    #[serde(default)]
    pub split: SplitPolicy,

    /// Minimum log severity (optional, default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// fsync after every page file write (optional, default false)
    #[serde(default)]
    pub sync_writes: bool,
}

fn default_max_object_size() -> usize {
    4096
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_object_size: default_max_object_size(),
            split: SplitPolicy::default(),
            log_level: default_log_level(),
            sync_writes: false,
        }
    }
}

impl EngineConfig {
    /// Default configuration with a different page capacity
    pub fn with_capacity(max_object_size: usize) -> Self {
        Self {
            max_object_size,
            ..Self::default()
        }
    }

    pub fn with_split(mut self, split: SplitPolicy) -> Self {
        self.split = split;
        self
    }

    /// Loads and validates a configuration file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config: {}", e)))?;
        let config = Self::from_json(&content)?;
        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("max_object_size", config.max_object_size.to_string().as_str()),
                ("path", path.display().to_string().as_str()),
            ],
        );
        Ok(config)
    }

    pub fn from_json(content: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(content)
            .map_err(|e| EngineError::Config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_object_size < MIN_PAGE_SIZE {
            return Err(EngineError::Config(format!(
                "max_object_size must be at least {}, got {}",
                MIN_PAGE_SIZE, self.max_object_size
            )));
        }
        if self.max_object_size > u32::MAX as usize {
            return Err(EngineError::Config(format!(
                "max_object_size must fit in 32 bits, got {}",
                self.max_object_size
            )));
        }

        if let SplitPolicy::Ratio { ratio } = self.split {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(EngineError::Config(format!(
                    "split ratio must be a positive number, got {}",
                    ratio
                )));
            }
        }

        self.severity()?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> EngineResult<Severity> {
        self.log_level
            .parse()
            .map_err(|e: String| EngineError::Config(e))
    }

    /// Applies `log_level` to the process-wide logger
    pub fn apply_logging(&self) -> EngineResult<()> {
        Logger::set_min_severity(self.severity()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_object_size, 4096);
        assert_eq!(config.split, SplitPolicy::FirstFit);
        assert!(!config.sync_writes);
    }

    #[test]
    fn test_config_rejects_small_pages() {
        let err = EngineConfig::from_json(r#"{"max_object_size": 32}"#).unwrap_err();
        assert_eq!(err.code(), "XTREE_CONFIG_ERROR");
        assert!(EngineConfig::with_capacity(63).validate().is_err());
        assert!(EngineConfig::with_capacity(64).validate().is_ok());
    }

    #[test]
    fn test_config_ratio_split() {
        let config =
            EngineConfig::from_json(r#"{"split": {"strategy": "ratio", "ratio": 0.5}}"#).unwrap();
        assert_eq!(config.split, SplitPolicy::Ratio { ratio: 0.5 });

        let result = EngineConfig::from_json(r#"{"split": {"strategy": "ratio", "ratio": 0}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_rejects_unknown_level() {
        assert!(EngineConfig::from_json(r#"{"log_level": "chatty"}"#).is_err());
        let config = EngineConfig::from_json(r#"{"log_level": "warn"}"#).unwrap();
        assert_eq!(config.severity().unwrap(), Severity::Warn);
    }

    #[test]
    fn test_config_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("extree.json");
        fs::write(&path, r#"{"max_object_size": 512, "sync_writes": true}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.max_object_size, 512);
        assert!(config.sync_writes);

        assert!(EngineConfig::load(&temp_dir.path().join("missing.json")).is_err());
    }
}
