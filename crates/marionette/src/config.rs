//! # Runtime Configuration
//!
//! Loaded once at startup from TOML. Every section and field is optional.
//!
//! ```toml
//! [scheduler]
//! frame_budget_us = 2000
//! max_steps_per_entity = 64
//!
//! [entity]
//! skeleton_batch_size = 32
//! primitive_batch_size = 8
//! failure_policy = "skip_primitive"
//! asset_wait_timeout_ticks = 600
//! critical_joints = ["root", "hips", "head"]
//! ```

use std::path::Path;
use std::time::Duration;

use marionette_entity::{EntityConfig, SchedulerConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarionetteConfig {
    /// Frame budget shared by all entities.
    pub scheduler: SchedulerConfig,
    /// Settings applied to every entity.
    pub entity: EntityConfig,
}

impl MarionetteConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `Parse` for malformed input and `Invalid` for out-of-range
    /// values.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, otherwise as
    /// [`MarionetteConfig::from_toml_str`].
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scheduler.frame_budget_us == 0 {
            return Err(ConfigError::Invalid("scheduler.frame_budget_us must be > 0".into()));
        }
        if self.scheduler.max_steps_per_entity == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_steps_per_entity must be > 0".into(),
            ));
        }
        if self.entity.skeleton_batch_size == 0 {
            return Err(ConfigError::Invalid("entity.skeleton_batch_size must be > 0".into()));
        }
        if self.entity.primitive_batch_size == 0 {
            return Err(ConfigError::Invalid("entity.primitive_batch_size must be > 0".into()));
        }
        if self.entity.asset_wait_timeout_ticks == Some(0) {
            return Err(ConfigError::Invalid(
                "entity.asset_wait_timeout_ticks must be > 0 when set".into(),
            ));
        }
        Ok(())
    }

    /// The per-frame wall-clock budget.
    #[must_use]
    pub const fn frame_budget(&self) -> Duration {
        Duration::from_micros(self.scheduler.frame_budget_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marionette_core::JointType;
    use marionette_entity::PrimitiveFailurePolicy;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = MarionetteConfig::from_toml_str("").unwrap();
        assert_eq!(config, MarionetteConfig::default());
        assert_eq!(config.frame_budget(), Duration::from_micros(2_000));
    }

    #[test]
    fn test_partial_document() {
        let config = MarionetteConfig::from_toml_str(
            r#"
            [scheduler]
            max_steps_per_entity = 16

            [entity]
            failure_policy = "fail_entity"
            asset_wait_timeout_ticks = 120
            critical_joints = ["root", "head"]
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.max_steps_per_entity, 16);
        assert_eq!(config.scheduler.frame_budget_us, 2_000);
        assert_eq!(config.entity.failure_policy, PrimitiveFailurePolicy::FailEntity);
        assert_eq!(config.entity.asset_wait_timeout_ticks, Some(120));
        assert_eq!(config.entity.critical_joints, vec![JointType::Root, JointType::Head]);
        assert_eq!(config.entity.skeleton_batch_size, 32);
    }

    #[test]
    fn test_rejects_zero_budget() {
        let result = MarionetteConfig::from_toml_str("[scheduler]\nframe_budget_us = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_malformed() {
        let result = MarionetteConfig::from_toml_str("[entity]\nfailure_policy = \"retry\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = MarionetteConfig::from_path("/nonexistent/marionette.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
