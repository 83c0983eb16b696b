//! JSON exporter for simulation runs.
//!
//! Writes one frame per sampled tick with every peer's displayed board,
//! so a run can be replayed or diffed offline.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use synqblast_core::{Address, DisplayedState, EngineStats, Phase};
use uuid::Uuid;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Seconds since the run began
    pub time_sec: f64,

    /// Ledger wall clock
    pub unix_ms: u64,
    pub utc: String,

    /// Round and phase by the ledger's clock
    pub round: u32,
    pub phase: Phase,

    /// Active reactors of the current round on the ledger
    pub ledger_reactors: usize,

    pub peers: Vec<PeerFrame>,

    /// Events (partitions, outages, etc.)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

impl SimFrame {
    /// RFC 3339 label for a wall-clock instant.
    pub fn utc_label(unix_ms: u64) -> String {
        DateTime::<Utc>::from_timestamp_millis(unix_ms as i64)
            .map(|time| time.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default()
    }
}

/// One peer's state within a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerFrame {
    pub index: usize,
    pub peer_id: Uuid,
    pub address: Address,
    pub clock_skew_ms: i64,
    pub replica_round: u32,
    pub replica_phase: Phase,
    pub replica_reactors: usize,
    pub displayed: DisplayedState,
    pub stats: EngineStats,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
