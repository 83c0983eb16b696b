//! Replicated commands and the event log entries they produce.
//!
//! A [`GameCommand`] is what travels over the pub/sub channel; a
//! [`GameEvent`] is what the model appends to its log after applying one.
//! Both are closed unions: an unknown `type` tag fails to decode.

use crate::board::Cell;
use crate::identity::Address;
use crate::ledger::{EnergyLevel, LeaderboardEntry, ReactorId, ReactorType, TxHash};
use crate::round_clock::Phase;
use serde::{Deserialize, Serialize};
use synqblast_env::{EnvError, EventEnvelope};

/// A state transition published to every peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameCommand {
    #[serde(rename_all = "camelCase")]
    DeployReactor {
        player_id: Address,
        x: u8,
        y: u8,
        reactor_type: ReactorType,
        energy_level: EnergyLevel,
        tx_hash: TxHash,
    },

    #[serde(rename_all = "camelCase")]
    TriggerReactor {
        player_id: Address,
        x: u8,
        y: u8,
        /// Every reactor triggered in the same batch, in selection order
        chain_reaction_data: Vec<ReactorId>,
    },

    #[serde(rename_all = "camelCase")]
    PlayerJoined { player_id: Address },

    #[serde(rename_all = "camelCase")]
    PlayerLeft { player_id: Address },

    #[serde(rename_all = "camelCase")]
    UpdateLeaderboard { leaderboard: Vec<LeaderboardEntry> },

    #[serde(rename_all = "camelCase")]
    PhaseChange {
        new_phase: Phase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round: Option<u32>,
    },
}

impl GameCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            GameCommand::DeployReactor { .. } => "deployReactor",
            GameCommand::TriggerReactor { .. } => "triggerReactor",
            GameCommand::PlayerJoined { .. } => "playerJoined",
            GameCommand::PlayerLeft { .. } => "playerLeft",
            GameCommand::UpdateLeaderboard { .. } => "updateLeaderboard",
            GameCommand::PhaseChange { .. } => "phaseChange",
        }
    }

    pub fn to_envelope(&self, timestamp_ms: u64) -> Result<EventEnvelope, EnvError> {
        let payload = serde_json::to_vec(self).map_err(EnvError::serialization)?;
        Ok(EventEnvelope::new(payload, timestamp_ms))
    }

    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Self, EnvError> {
        if !envelope.is_game_event() {
            return Err(EnvError::UnknownChannel(envelope.channel.clone()));
        }
        serde_json::from_slice(&envelope.payload).map_err(EnvError::serialization)
    }
}

/// One entry of the replicated event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Per-model sequence number, strictly increasing
    pub seq: u64,
    pub timestamp_ms: u64,
    /// Model round when the event was appended
    pub round: u32,
    pub kind: GameEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameEventKind {
    ReactorDeployed {
        player_id: Address,
        cell: Cell,
        reactor_type: ReactorType,
        energy: EnergyLevel,
        tx_hash: TxHash,
    },
    ReactorTriggered {
        player_id: Address,
        cell: Cell,
        chain: Vec<ReactorId>,
    },
    PlayerJoined {
        player_id: Address,
    },
    PlayerLeft {
        player_id: Address,
    },
    LeaderboardUpdated {
        entries: usize,
    },
    PhaseChanged {
        new_phase: Phase,
    },
}
