//! # Runtime Configuration
//!
//! Loaded once at startup from TOML. Every field has a default so a partial
//! file (or no file at all) is valid.
//!
//! ```toml
//! queue_capacity = 256
//! rate_limit_per_agent = 120
//! audit_logging = true
//! shutdown_timeout_ms = 2000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TwinframeError, TwinframeResult};

/// Default command queue bound.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default bounded wait for worker shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;

/// Runtime configuration for the frame pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum commands in flight before `submit` starts rejecting.
    pub queue_capacity: usize,
    /// Accepted commands per agent per rolling second (0 = unlimited).
    pub rate_limit_per_agent: u32,
    /// Record every dispatch for later inspection.
    pub audit_logging: bool,
    /// Maximum audit records kept in memory (oldest evicted first).
    pub audit_retention: usize,
    /// How long the owner waits for the worker to stop before abandoning it.
    pub shutdown_timeout_ms: u64,
    /// Main-thread ticks per second.
    pub tick_rate: u32,
    /// Operation budget for one scripting pass (0 = unlimited).
    pub max_script_operations: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            rate_limit_per_agent: 0,
            audit_logging: false,
            audit_retention: 1024,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            tick_rate: 60,
            max_script_operations: 1_000_000,
        }
    }
}

impl RuntimeConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`TwinframeError::InvalidConfig`] on malformed TOML or
    /// out-of-range values.
    pub fn from_toml_str(source: &str) -> TwinframeResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| TwinframeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`TwinframeError::InvalidConfig`] if the file cannot be read
    /// or does not describe a valid configuration.
    pub fn load(path: impl AsRef<Path>) -> TwinframeResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            TwinframeError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), ?config, "loaded runtime config");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`TwinframeError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> TwinframeResult<()> {
        if self.queue_capacity == 0 {
            return Err(TwinframeError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.tick_rate == 0 {
            return Err(TwinframeError::InvalidConfig(
                "tick_rate must be at least 1".to_string(),
            ));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(TwinframeError::InvalidConfig(
                "shutdown_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Duration of one main-thread tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_rate.max(1)))
    }

    /// Bounded wait for worker shutdown.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
