//! The "REPLICA" Engine - event-sourced game model mirrored between peers.
//!
//! Every peer runs its own copy of the model and applies the same commands.
//! Phase transitions are not received from a server: each model schedules
//! its own next transition on entering a phase, and `advance()` fires every
//! transition that has come due. Replicas that start within a few seconds
//! of each other therefore stay within a few seconds of each other.
//!
//! The model is a best-effort mirror. It never consults the ledger, and it
//! is never rewritten by the reconciliation engine.

use crate::board::Cell;
use crate::config::SyncConfig;
use crate::events::{GameCommand, GameEvent, GameEventKind};
use crate::identity::Address;
use crate::ledger::{EnergyLevel, LeaderboardEntry, ReactorId, ReactorType, TxHash};
use crate::round_clock::{Phase, PhaseSchedule, RoundInfo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info};

/// A reactor as the replica knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactorRecord {
    pub player_id: Address,
    pub cell: Cell,
    pub reactor_type: ReactorType,
    pub energy: EnergyLevel,
    pub tx_hash: TxHash,
    pub deployed_at_ms: u64,
    pub round: u32,
    pub triggered: bool,
    pub triggered_by: Option<Address>,
    pub triggered_at_ms: Option<u64>,
    pub chain: Vec<ReactorId>,
}

/// Point-in-time copy of the model for late joiners and exporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    pub reactors: Vec<ReactorRecord>,
    pub current_phase: Phase,
    pub current_round: u32,
    pub phase_start_ms: u64,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub connected_players: Vec<Address>,
    pub recent_events: Vec<GameEvent>,
}

pub struct GameModel {
    schedule: PhaseSchedule,
    reactors: BTreeMap<Cell, ReactorRecord>,
    current_phase: Phase,
    current_round: u32,
    phase_start_ms: u64,
    next_transition_ms: u64,
    connected_players: BTreeSet<Address>,
    leaderboard: Vec<LeaderboardEntry>,
    event_log: VecDeque<GameEvent>,
    log_capacity: usize,
    snapshot_events: usize,
    next_seq: u64,
}

impl GameModel {
    /// A fresh session: Deploy phase of round 1, starting at `now_ms`.
    pub fn new(config: &SyncConfig, now_ms: u64) -> Self {
        let mut model = Self {
            schedule: config.schedule,
            reactors: BTreeMap::new(),
            current_phase: Phase::Deploy,
            current_round: 1,
            phase_start_ms: now_ms,
            next_transition_ms: now_ms,
            connected_players: BTreeSet::new(),
            leaderboard: Vec::new(),
            event_log: VecDeque::with_capacity(config.event_log_capacity.min(1024)),
            log_capacity: config.event_log_capacity.max(1),
            snapshot_events: config.snapshot_events,
            next_seq: 1,
        };
        model.schedule_phase_change();
        model
    }

    /// A model that starts in agreement with the phase clock: phase and
    /// round come from `info`, and the phase start is back-dated by the
    /// time already spent in the phase.
    pub fn aligned(config: &SyncConfig, info: &RoundInfo, now_ms: u64) -> Self {
        let mut model = Self::new(config, now_ms);
        let phase_ms = model.schedule.phase_ms(info.phase);
        let elapsed_ms = info
            .millis_into_round
            .saturating_sub(model.schedule.phase_offset_ms(info.phase))
            .min(phase_ms);

        model.current_phase = info.phase;
        model.current_round = info.round_number;
        model.phase_start_ms = now_ms.saturating_sub(elapsed_ms);
        model.schedule_phase_change();
        model
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    /// Applies a replicated command. Returns false when the command was
    /// ignored (a trigger for an unknown cell).
    pub fn apply(&mut self, command: &GameCommand, now_ms: u64) -> bool {
        match command {
            GameCommand::DeployReactor {
                player_id,
                x,
                y,
                reactor_type,
                energy_level,
                tx_hash,
            } => {
                let cell = Cell::new(*x, *y);
                let record = ReactorRecord {
                    player_id: player_id.clone(),
                    cell,
                    reactor_type: *reactor_type,
                    energy: *energy_level,
                    tx_hash: tx_hash.clone(),
                    deployed_at_ms: now_ms,
                    round: self.current_round,
                    triggered: false,
                    triggered_by: None,
                    triggered_at_ms: None,
                    chain: Vec::new(),
                };
                self.reactors.insert(cell, record);
                self.push_event(
                    now_ms,
                    GameEventKind::ReactorDeployed {
                        player_id: player_id.clone(),
                        cell,
                        reactor_type: *reactor_type,
                        energy: *energy_level,
                        tx_hash: tx_hash.clone(),
                    },
                );
                true
            }
            GameCommand::TriggerReactor {
                player_id,
                x,
                y,
                chain_reaction_data,
            } => {
                let cell = Cell::new(*x, *y);
                let Some(record) = self.reactors.get_mut(&cell) else {
                    debug!(%cell, "trigger for empty cell ignored");
                    return false;
                };
                record.triggered = true;
                record.triggered_by = Some(player_id.clone());
                record.triggered_at_ms = Some(now_ms);
                record.chain = chain_reaction_data.clone();
                self.push_event(
                    now_ms,
                    GameEventKind::ReactorTriggered {
                        player_id: player_id.clone(),
                        cell,
                        chain: chain_reaction_data.clone(),
                    },
                );
                true
            }
            GameCommand::PlayerJoined { player_id } => {
                self.connected_players.insert(player_id.clone());
                self.push_event(now_ms, GameEventKind::PlayerJoined { player_id: player_id.clone() });
                true
            }
            GameCommand::PlayerLeft { player_id } => {
                self.connected_players.remove(player_id);
                self.push_event(now_ms, GameEventKind::PlayerLeft { player_id: player_id.clone() });
                true
            }
            GameCommand::UpdateLeaderboard { leaderboard } => {
                self.leaderboard = leaderboard.clone();
                self.push_event(
                    now_ms,
                    GameEventKind::LeaderboardUpdated {
                        entries: leaderboard.len(),
                    },
                );
                true
            }
            GameCommand::PhaseChange { new_phase, round } => {
                self.enter_phase(*new_phase, *round, now_ms);
                true
            }
        }
    }

    /// Fires every scheduled transition due at `now_ms`, in order.
    ///
    /// Each transition happens at its scheduled instant rather than at
    /// `now_ms`, so a late call catches up without drifting the schedule.
    /// Returns the number of transitions fired.
    pub fn advance(&mut self, now_ms: u64) -> usize {
        let mut fired = 0;
        while now_ms >= self.next_transition_ms {
            let at = self.next_transition_ms;
            let next_phase = self.current_phase.next();
            let next_round = if next_phase == Phase::Deploy {
                self.schedule.next_round(self.current_round)
            } else {
                self.current_round
            };
            self.enter_phase(next_phase, Some(next_round), at);
            fired += 1;
        }
        fired
    }

    fn enter_phase(&mut self, new_phase: Phase, round: Option<u32>, now_ms: u64) {
        let target_round = round.unwrap_or(self.current_round);

        if new_phase == Phase::Deploy && self.schedule.is_round_after(self.current_round, target_round) {
            debug!(cleared = self.reactors.len(), round = target_round, "clearing board for new round");
            self.reactors.clear();
        }

        self.current_phase = new_phase;
        self.current_round = target_round;
        self.phase_start_ms = now_ms;
        self.push_event(now_ms, GameEventKind::PhaseChanged { new_phase });
        self.schedule_phase_change();

        info!(round = self.current_round, phase = %self.current_phase, "replica phase change");
    }

    fn schedule_phase_change(&mut self) {
        let duration = self.schedule.phase_ms(self.current_phase).max(1);
        self.next_transition_ms = self.phase_start_ms + duration;
    }

    fn push_event(&mut self, timestamp_ms: u64, kind: GameEventKind) {
        if self.event_log.len() == self.log_capacity {
            self.event_log.pop_front();
        }
        self.event_log.push_back(GameEvent {
            seq: self.next_seq,
            timestamp_ms,
            round: self.current_round,
            kind,
        });
        self.next_seq += 1;
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn current_phase(&self) -> Phase {
        self.current_phase
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn phase_start_ms(&self) -> u64 {
        self.phase_start_ms
    }

    pub fn next_transition_ms(&self) -> u64 {
        self.next_transition_ms
    }

    pub fn schedule(&self) -> &PhaseSchedule {
        &self.schedule
    }

    /// Time left in the current phase by the replica's own reckoning,
    /// clamped at zero.
    pub fn phase_time_remaining_ms(&self, now_ms: u64) -> u64 {
        let elapsed = now_ms.saturating_sub(self.phase_start_ms);
        self.schedule.phase_ms(self.current_phase).saturating_sub(elapsed)
    }

    pub fn reactor_at(&self, cell: Cell) -> Option<&ReactorRecord> {
        self.reactors.get(&cell)
    }

    pub fn reactor_count(&self) -> usize {
        self.reactors.len()
    }

    pub fn current_round_reactors(&self) -> Vec<&ReactorRecord> {
        self.reactors
            .values()
            .filter(|record| record.round == self.current_round)
            .collect()
    }

    pub fn connected_player_count(&self) -> usize {
        self.connected_players.len()
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    /// Sequence number of the newest event, 0 when nothing was logged.
    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    /// Sequence number of the oldest retained event.
    pub fn oldest_seq(&self) -> Option<u64> {
        self.event_log.front().map(|event| event.seq)
    }

    /// Retained events with `seq` greater than `cursor`, oldest first.
    pub fn events_since(&self, cursor: u64) -> impl Iterator<Item = &GameEvent> + '_ {
        self.event_log.iter().filter(move |event| event.seq > cursor)
    }

    pub fn game_state(&self) -> GameStateSnapshot {
        let skip = self.event_log.len().saturating_sub(self.snapshot_events);
        GameStateSnapshot {
            reactors: self.reactors.values().cloned().collect(),
            current_phase: self.current_phase,
            current_round: self.current_round,
            phase_start_ms: self.phase_start_ms,
            leaderboard: self.leaderboard.clone(),
            connected_players: self.connected_players.iter().cloned().collect(),
            recent_events: self.event_log.iter().skip(skip).cloned().collect(),
        }
    }
}
