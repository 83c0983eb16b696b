//! Synqblast Core - round sync for a many-client reactor game
//!
//! Keeps three sources of truth coherent without a central server:
//! 1. **Phase Clock**: round and phase derived from the UTC wall clock
//! 2. **Replicated Model**: event-sourced mirror shared over pub/sub, with
//!    self-scheduled phase transitions
//! 3. **Reconciliation Engine**: merges ledger reads, replica events and
//!    optimistic local writes into one displayed board, purging it on every
//!    round boundary
//!
//! The [`session::GameSession`] loop wires these to an environment context,
//! a pub/sub transport and a ledger.

pub mod board;
pub mod config;
pub mod error;
pub mod events;
pub mod game_model;
pub mod identity;
pub mod ledger;
pub mod markers;
pub mod reconcile;
pub mod round_clock;
pub mod selection;
pub mod session;

// Re-export key types for convenience
pub use board::{Cell, BOARD_SIZE};
pub use config::SyncConfig;
pub use error::{ActionError, ConfigError, SyncError};
pub use events::{GameCommand, GameEvent, GameEventKind};
pub use game_model::{GameModel, GameStateSnapshot, ReactorRecord};
pub use identity::Address;
pub use ledger::{
    build_leaderboard, EnergyLevel, LeaderboardEntry, Ledger, LedgerError, Reactor, ReactorId, ReactorType, TxHash,
};
pub use markers::RoundMarkers;
pub use reconcile::{
    Banner, DeployFailure, DisplayedState, EngineStats, FailureReason, ReadOutcome, ReconciliationEngine, TickOutcome,
    ViewFilter,
};
pub use round_clock::{compute_round_info, compute_round_info_at, Phase, PhaseSchedule, RoundInfo};
pub use selection::{Selection, ToggleOutcome};
pub use session::{GameSession, SessionHandle, SessionNotice, UserIntent};
