//! Tunable canvas settings.

use crate::gesture::{DRAG_THRESHOLD_PX, GestureConfig, LONG_PRESS_MS, TAP_MAX_MS};
use crate::history::MAX_UNDO_HISTORY;
use crate::layout::DEFAULT_PADDING;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Smallest edge, in board pixels, an item can be resized to.
pub const MIN_ITEM_SIZE: f64 = 40.0;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Canvas settings. Every field has a default, so a config file only needs
/// the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub long_press_ms: u64,
    pub tap_max_ms: u64,
    pub drag_threshold_px: f64,
    pub layout_padding: f64,
    pub history_capacity: usize,
    pub min_item_size: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            long_press_ms: LONG_PRESS_MS,
            tap_max_ms: TAP_MAX_MS,
            drag_threshold_px: DRAG_THRESHOLD_PX,
            layout_padding: DEFAULT_PADDING,
            history_capacity: MAX_UNDO_HISTORY,
            min_item_size: MIN_ITEM_SIZE,
        }
    }
}

impl CanvasConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded canvas config from {}", path.display());
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = |name: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{} must be a finite non-negative number, got {}", name, v)))
            }
        };
        non_negative("drag_threshold_px", self.drag_threshold_px)?;
        non_negative("layout_padding", self.layout_padding)?;
        non_negative("min_item_size", self.min_item_size)?;

        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be at least 1".to_string()));
        }
        if self.tap_max_ms > self.long_press_ms {
            return Err(ConfigError::Invalid(format!(
                "tap_max_ms ({}) exceeds long_press_ms ({})",
                self.tap_max_ms, self.long_press_ms
            )));
        }
        Ok(())
    }

    /// Thresholds for the gesture classifier.
    pub fn gesture(&self) -> GestureConfig {
        GestureConfig {
            long_press: Duration::from_millis(self.long_press_ms),
            tap_max: Duration::from_millis(self.tap_max_ms),
            drag_threshold: self.drag_threshold_px,
        }
    }
}
