//! In-memory authoritative ledger with fault injection.
//!
//! Enforces the same rules the contract does: deploys only during Deploy,
//! one active reactor per cell per round, triggers only during Trigger and
//! only by the owner. Phases are judged by the ledger's own clock (the
//! shared virtual clock, without any peer skew).

use crate::context::SimContext;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use synqblast_core::{
    Address, Cell, EnergyLevel, Ledger, LedgerError, Phase, PhaseSchedule, Reactor, ReactorId, ReactorType, TxHash,
};
use synqblast_env::SynqContext;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredReactor {
    reactor: Reactor,
    /// Reads before this instant don't see the reactor yet
    visible_at_ms: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    reactors: Vec<StoredReactor>,
    scores: HashMap<Address, u64>,
    next_id: ReactorId,
    next_tx: u64,

    available: bool,
    /// Writes are acknowledged but never land
    black_hole: bool,
    confirmation_delay_ms: u64,

    stats: LedgerStats,
}

/// Call counters, for scenario metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub reads: u64,
    pub writes: u64,
    pub rejected: u64,
    pub unavailable: u64,
    pub swallowed: u64,
}

pub struct SimLedger {
    context: Arc<SimContext>,
    schedule: PhaseSchedule,
    board_size: u8,
    state: Mutex<LedgerState>,
}

impl SimLedger {
    pub fn new(context: Arc<SimContext>, schedule: PhaseSchedule, board_size: u8) -> Self {
        Self {
            context,
            schedule,
            board_size,
            state: Mutex::new(LedgerState {
                next_id: 1,
                available: true,
                ..LedgerState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // FAULTS
    // ========================================================================

    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    pub fn set_black_hole(&self, enabled: bool) {
        self.state().black_hole = enabled;
    }

    /// Delay between a write being accepted and it showing up in reads.
    pub fn set_confirmation_delay(&self, delay_ms: u64) {
        self.state().confirmation_delay_ms = delay_ms;
    }

    // ========================================================================
    // OPERATIONS
    // ========================================================================

    pub fn read_all(&self) -> Result<Vec<Reactor>, LedgerError> {
        let now_ms = self.context.unix_millis();
        let mut state = self.state();
        if !state.available {
            state.stats.unavailable += 1;
            return Err(LedgerError::unavailable("rpc endpoint down"));
        }
        state.stats.reads += 1;
        Ok(state
            .reactors
            .iter()
            .filter(|stored| stored.visible_at_ms <= now_ms)
            .map(|stored| stored.reactor.clone())
            .collect())
    }

    pub fn score(&self, player: &Address) -> Result<u64, LedgerError> {
        let mut state = self.state();
        if !state.available {
            state.stats.unavailable += 1;
            return Err(LedgerError::unavailable("rpc endpoint down"));
        }
        Ok(state.scores.get(player).copied().unwrap_or(0))
    }

    pub fn deploy(&self, owner: &Address, cell: Cell, energy: EnergyLevel) -> Result<TxHash, LedgerError> {
        let now_ms = self.context.unix_millis();
        let info = self.schedule.compute_at_millis(now_ms);
        let mut state = self.state();

        if !state.available {
            state.stats.unavailable += 1;
            return Err(LedgerError::unavailable("rpc endpoint down"));
        }
        if info.phase != Phase::Deploy {
            state.stats.rejected += 1;
            return Err(LedgerError::rejected(format!("deploy closed during {}", info.phase)));
        }
        if !cell.in_bounds(self.board_size) {
            state.stats.rejected += 1;
            return Err(LedgerError::rejected(format!("cell {} off the board", cell)));
        }
        let occupied = state.reactors.iter().any(|stored| {
            let reactor = &stored.reactor;
            reactor.round == info.round_number && reactor.is_active && reactor.cell() == cell
        });
        if occupied {
            state.stats.rejected += 1;
            return Err(LedgerError::rejected(format!("cell {} occupied", cell)));
        }

        let tx = Self::next_tx(&mut state);
        state.stats.writes += 1;
        if state.black_hole {
            state.stats.swallowed += 1;
            debug!(%cell, %tx, "deploy swallowed");
            return Ok(tx);
        }

        let id = state.next_id;
        state.next_id += 1;
        let visible_at_ms = now_ms + state.confirmation_delay_ms;
        state.reactors.push(StoredReactor {
            reactor: Reactor {
                id,
                x: cell.x,
                y: cell.y,
                energy,
                owner: owner.clone(),
                is_active: true,
                round: info.round_number,
            },
            visible_at_ms,
        });
        debug!(id, %cell, %energy, round = info.round_number, "reactor deployed");
        Ok(tx)
    }

    pub fn trigger(&self, owner: &Address, ids: &[ReactorId]) -> Result<TxHash, LedgerError> {
        let now_ms = self.context.unix_millis();
        let info = self.schedule.compute_at_millis(now_ms);
        let mut state = self.state();

        if !state.available {
            state.stats.unavailable += 1;
            return Err(LedgerError::unavailable("rpc endpoint down"));
        }
        if info.phase != Phase::Trigger {
            state.stats.rejected += 1;
            return Err(LedgerError::rejected(format!("trigger closed during {}", info.phase)));
        }
        if ids.is_empty() {
            state.stats.rejected += 1;
            return Err(LedgerError::rejected("empty batch"));
        }

        // Validate the whole batch before touching anything
        let mut indices = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(index) = state.reactors.iter().position(|stored| stored.reactor.id == *id) else {
                state.stats.rejected += 1;
                return Err(LedgerError::rejected(format!("unknown reactor {}", id)));
            };
            let reactor = &state.reactors[index].reactor;
            if reactor.owner != *owner {
                state.stats.rejected += 1;
                return Err(LedgerError::rejected(format!("reactor {} not owned by caller", id)));
            }
            if !reactor.is_active || reactor.round != info.round_number {
                state.stats.rejected += 1;
                return Err(LedgerError::rejected(format!("reactor {} not live", id)));
            }
            indices.push(index);
        }

        let tx = Self::next_tx(&mut state);
        state.stats.writes += 1;
        if state.black_hole {
            state.stats.swallowed += 1;
            return Ok(tx);
        }

        let mut gained = 0u64;
        for index in indices {
            let reactor = &mut state.reactors[index].reactor;
            reactor.is_active = false;
            gained += u64::from(reactor.energy.value());
        }
        *state.scores.entry(owner.clone()).or_insert(0) += gained;
        debug!(player = %owner, count = ids.len(), gained, "reactors triggered");
        Ok(tx)
    }

    /// Places a reactor directly, bypassing phase rules. Scenario setup only.
    pub fn seed_reactor(&self, owner: &Address, cell: Cell, energy: EnergyLevel, round: u32) -> ReactorId {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        state.reactors.push(StoredReactor {
            reactor: Reactor {
                id,
                x: cell.x,
                y: cell.y,
                energy,
                owner: owner.clone(),
                is_active: true,
                round,
            },
            visible_at_ms: 0,
        });
        id
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    /// Visible active reactors of `round`, the board a converged peer shows.
    pub fn round_reactors(&self, round: u32) -> Vec<Reactor> {
        let now_ms = self.context.unix_millis();
        let mut reactors: Vec<Reactor> = self
            .state()
            .reactors
            .iter()
            .filter(|stored| stored.visible_at_ms <= now_ms)
            .map(|stored| &stored.reactor)
            .filter(|reactor| reactor.round == round && reactor.is_active)
            .cloned()
            .collect();
        reactors.sort_by_key(|reactor| reactor.id);
        reactors
    }

    pub fn reactor_count(&self) -> usize {
        self.state().reactors.len()
    }

    pub fn stats(&self) -> LedgerStats {
        self.state().stats
    }

    pub fn schedule(&self) -> &PhaseSchedule {
        &self.schedule
    }

    fn next_tx(state: &mut LedgerState) -> TxHash {
        state.next_tx += 1;
        TxHash(format!("0x{:064x}", state.next_tx.wrapping_mul(0x9e3779b97f4a7c15)))
    }
}

#[async_trait]
impl Ledger for SimLedger {
    async fn all_reactors(&self) -> Result<Vec<Reactor>, LedgerError> {
        self.read_all()
    }

    async fn player_score(&self, player: &Address) -> Result<u64, LedgerError> {
        self.score(player)
    }

    async fn deploy_reactor(
        &self,
        owner: &Address,
        cell: Cell,
        _reactor_type: ReactorType,
        energy: EnergyLevel,
    ) -> Result<TxHash, LedgerError> {
        self.deploy(owner, cell, energy)
    }

    async fn trigger_reactors(&self, owner: &Address, ids: &[ReactorId]) -> Result<TxHash, LedgerError> {
        self.trigger(owner, ids)
    }
}
