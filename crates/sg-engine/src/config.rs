//! Engine configuration
//!
//! Loaded from TOML; every section and field has a default so an empty file
//! (or no file) is a valid configuration.

use crate::error::EngineError;
use crate::repository::DEFAULT_HISTORY_CAP;
use serde::{Deserialize, Serialize};
use sg_plan::PlannerConfig;
use sg_vault::VaultConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Encryption and key source
    pub vault: VaultConfig,
    /// Plan generation
    pub planner: PlannerConfig,
    /// Run task behaviour
    pub scheduler: SchedulerConfig,
    /// On-disk storage
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// `Config` on malformed TOML or unknown value types
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `Config` if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// With vault section
    #[inline]
    #[must_use]
    pub fn with_vault(mut self, vault: VaultConfig) -> Self {
        self.vault = vault;
        self
    }

    /// With scheduler section
    #[inline]
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Speed-up factor applied to step delays (2.0 waits half as long)
    pub time_scale: f64,
    /// Attempts to persist a step outcome before parking it
    pub persist_retry_attempts: u32,
    /// Initial backoff between persist attempts, doubled each retry
    pub persist_retry_backoff_ms: u64,
    /// History entries kept per owner
    pub history_cap: usize,
    /// Broadcast channel capacity for scheduler events
    pub event_capacity: usize,
}

impl SchedulerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With time scale
    #[inline]
    #[must_use]
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    /// With persist retry policy
    #[inline]
    #[must_use]
    pub fn with_persist_retry(mut self, attempts: u32, backoff_ms: u64) -> Self {
        self.persist_retry_attempts = attempts;
        self.persist_retry_backoff_ms = backoff_ms;
        self
    }

    /// With history cap
    #[inline]
    #[must_use]
    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap;
        self
    }

    /// Wall-clock wait for a step delay of `delay_secs`
    ///
    /// Non-positive or non-finite scales are treated as 1.0.
    #[must_use]
    pub fn scaled_delay(&self, delay_secs: u64) -> Duration {
        let scale = if self.time_scale.is_finite() && self.time_scale > 0.0 {
            self.time_scale
        } else {
            1.0
        };
        #[allow(clippy::cast_precision_loss)]
        let secs = delay_secs as f64 / scale;
        Duration::from_secs_f64(secs)
    }

    /// Backoff before persist attempt `attempt` (1-based)
    #[must_use]
    pub fn persist_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.persist_retry_backoff_ms.saturating_mul(factor))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            persist_retry_attempts: 5,
            persist_retry_backoff_ms: 200,
            history_cap: DEFAULT_HISTORY_CAP,
            event_capacity: 64,
        }
    }
}

/// On-disk storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding encrypted entries
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".stakeguard"),
        }
    }
}
