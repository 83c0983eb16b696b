//! Error taxonomy for round sync.
//!
//! Nothing here is fatal to a session: ledger and divergence errors are
//! surfaced to the UI or logged, action errors reject a single intent.

use crate::board::Cell;
use crate::ledger::{LedgerError, ReactorId};
use crate::round_clock::Phase;
use synqblast_env::EnvError;
use thiserror::Error;

/// A user intent whose preconditions do not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("action requires the {expected} phase, current phase is {actual}")]
    WrongPhase { expected: Phase, actual: Phase },

    #[error("cell ({x}, {y}) is outside the {size}x{size} board")]
    OutOfBounds { x: u32, y: u32, size: u8 },

    #[error("a deploy to {0} is already pending")]
    CellPending(Cell),

    #[error("selection is empty")]
    EmptySelection,

    #[error("reactor {0} is not on the board this round")]
    UnknownReactor(ReactorId),

    #[error("reactor {0} belongs to another player")]
    NotOwner(ReactorId),

    #[error("a batch trigger is already in flight")]
    TriggerInFlight,
}

impl ActionError {
    pub fn wrong_phase(expected: Phase, actual: Phase) -> Self {
        Self::WrongPhase { expected, actual }
    }
}

/// Errors surfaced by the reconciliation engine and the game session.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A ledger read or write failed; the last good state is kept.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A result tagged with an older round arrived after the boundary.
    #[error("stale result for round {result_round} discarded (current round {current_round})")]
    StaleRound { result_round: u32, current_round: u32 },

    /// The replica's phase disagrees with the phase clock beyond tolerance.
    #[error(
        "replica at round {replica_round} {replica_phase} drifted {drift_ms}ms from clock at round {clock_round} {clock_phase}"
    )]
    ReplicaDivergence {
        replica_round: u32,
        replica_phase: Phase,
        clock_round: u32,
        clock_phase: Phase,
        drift_ms: u64,
    },

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("phase {0} must have a non-zero duration")]
    ZeroPhase(Phase),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
