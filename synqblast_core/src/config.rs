//! Session configuration.

use crate::board::BOARD_SIZE;
use crate::error::ConfigError;
use crate::round_clock::PhaseSchedule;
use crate::selection::DEFAULT_MAX_SELECTION;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by the replicated model, the reconciliation engine
/// and the game session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Phase lengths (default: 120/120/60s, 288 rounds per day)
    pub schedule: PhaseSchedule,

    /// Board side length (default: 20)
    pub board_size: u8,

    /// Batch trigger capacity (default: 10)
    pub max_selection: usize,

    /// Age after which an unconfirmed provisional entry is evicted (default: 20s)
    pub confirmation_timeout_ms: u64,

    /// Replica vs clock drift tolerated before logging an anomaly (default: 2s)
    pub divergence_tolerance_ms: u64,

    /// Engine tick period (default: 1s)
    pub tick_interval_ms: u64,

    /// Replica cross-check period (default: 5s)
    pub resync_interval_ms: u64,

    /// Minimum spacing between full ledger scans (default: 1s)
    pub ledger_poll_interval_ms: u64,

    /// Replicated event log ring buffer size (default: 256)
    pub event_log_capacity: usize,

    /// Events included in a model snapshot (default: 50)
    pub snapshot_events: usize,

    /// Leaderboard length (default: 10)
    pub leaderboard_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            schedule: PhaseSchedule::default(),
            board_size: BOARD_SIZE,
            max_selection: DEFAULT_MAX_SELECTION,
            confirmation_timeout_ms: 20_000,
            divergence_tolerance_ms: 2_000,
            tick_interval_ms: 1_000,
            resync_interval_ms: 5_000,
            ledger_poll_interval_ms: 1_000,
            event_log_capacity: 256,
            snapshot_events: 50,
            leaderboard_size: 10,
        }
    }
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.schedule.validate()?;
        if self.board_size == 0 {
            return Err(ConfigError::invalid("board_size", "must be at least 1"));
        }
        if self.max_selection == 0 {
            return Err(ConfigError::invalid("max_selection", "must be at least 1"));
        }
        if self.tick_interval_ms == 0 || self.resync_interval_ms == 0 {
            return Err(ConfigError::invalid("tick_interval_ms", "timers must be non-zero"));
        }
        if self.event_log_capacity == 0 {
            return Err(ConfigError::invalid("event_log_capacity", "must be at least 1"));
        }
        Ok(())
    }

    pub fn with_schedule(mut self, schedule: PhaseSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_selection(mut self, max_selection: usize) -> Self {
        self.max_selection = max_selection;
        self
    }

    pub fn with_event_log_capacity(mut self, capacity: usize) -> Self {
        self.event_log_capacity = capacity;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_millis(self.resync_interval_ms)
    }
}
