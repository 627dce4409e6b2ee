//! Engine configuration.
//!
//! Defaults match the behaviour callers expect out of the box: a 100 ms
//! position poll and a one second bound on waiting for the monitor to exit.
//! Config can come from JSON (`from_value`) and from `CADENZA_*` environment
//! overrides; invalid input is logged and ignored rather than fatal.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;

/// Path of an optional JSON config file, read by the CLI.
pub const ENV_CONFIG: &str = "CADENZA_CONFIG";
pub const ENV_POLL_MS: &str = "CADENZA_POLL_MS";
pub const ENV_STOP_TIMEOUT_MS: &str = "CADENZA_STOP_TIMEOUT_MS";
pub const ENV_VOLUME: &str = "CADENZA_VOLUME";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Position monitor cadence.
    pub poll_interval_ms: u64,
    /// Upper bound on `stop()` waiting for monitor acknowledgment.
    pub stop_timeout_ms: u64,
    pub initial_volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            stop_timeout_ms: 1000,
            initial_volume: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Parse and validate a JSON config. Missing fields take defaults.
    pub fn from_value(v: &Value) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_value(v.clone())?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`from_value`](Self::from_value), falling back to defaults.
    pub fn from_value_or_default(v: &Value) -> Self {
        Self::from_value(v).unwrap_or_else(|e| {
            log::warn!("cadenza: {}, using default config", e);
            Self::default()
        })
    }

    /// Defaults with `CADENZA_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Unparseable or out-of-range values
    /// are skipped with a warning.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_POLL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.poll_interval_ms = ms,
                _ => log::warn!("cadenza: ignoring {}={:?}", ENV_POLL_MS, raw),
            }
        }
        if let Some(raw) = lookup(ENV_STOP_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.stop_timeout_ms = ms,
                _ => log::warn!("cadenza: ignoring {}={:?}", ENV_STOP_TIMEOUT_MS, raw),
            }
        }
        if let Some(raw) = lookup(ENV_VOLUME) {
            match raw.trim().parse::<f32>() {
                Ok(v) if (0.0..=1.0).contains(&v) => self.initial_volume = v,
                _ => log::warn!("cadenza: ignoring {}={:?}", ENV_VOLUME, raw),
            }
        }
        self
    }

    /// Replace out-of-range fields: a zero interval or timeout takes its
    /// default, volume is clamped to `[0, 1]` and NaN volume takes the default.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.poll_interval_ms == 0 {
            log::warn!("cadenza: poll_interval_ms must be positive, using {}", defaults.poll_interval_ms);
            self.poll_interval_ms = defaults.poll_interval_ms;
        }
        if self.stop_timeout_ms == 0 {
            log::warn!("cadenza: stop_timeout_ms must be positive, using {}", defaults.stop_timeout_ms);
            self.stop_timeout_ms = defaults.stop_timeout_ms;
        }
        if self.initial_volume.is_nan() {
            log::warn!("cadenza: initial_volume is NaN, using {}", defaults.initial_volume);
            self.initial_volume = defaults.initial_volume;
        } else {
            self.initial_volume = self.initial_volume.clamp(0.0, 1.0);
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Zero { field: "poll_interval_ms" });
        }
        if self.stop_timeout_ms == 0 {
            return Err(ConfigError::Zero { field: "stop_timeout_ms" });
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(ConfigError::Volume(self.initial_volume));
        }
        Ok(())
    }
}
