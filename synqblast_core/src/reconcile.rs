//! The "RECONCILE" Engine - one consistent board out of three sources.
//!
//! ```text
//!   Phase Clock ──(round, phase)──┐
//!                                 ▼
//!   Ledger reads ──────────► ┌──────────────┐
//!   Replica events ────────► │  Reconcile   │ ──► DisplayedState
//!   Local writes ──────────► └──────────────┘
//! ```
//!
//! Precedence per cell: ledger, then the local optimistic entry, then
//! replica entries. Within ledger state the highest reactor ID wins.
//!
//! Every ledger call is represented by a ticket stamped with the read
//! generation. Crossing a round boundary bumps the generation, so results
//! of calls issued in the old round are recognised and dropped on arrival.

use crate::board::Cell;
use crate::config::SyncConfig;
use crate::error::{ActionError, SyncError};
use crate::events::{GameCommand, GameEvent, GameEventKind};
use crate::game_model::GameModel;
use crate::identity::Address;
use crate::ledger::{EnergyLevel, LedgerError, Reactor, ReactorId, TxHash};
use crate::markers::RoundMarkers;
use crate::round_clock::{Phase, RoundInfo};
use crate::selection::{Selection, ToggleOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

// ============================================================================
// DISPLAY TYPES
// ============================================================================

/// Which reactors the board shows. Chosen by the caller, not engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewFilter {
    /// Only the local player's reactors
    #[default]
    Private,
    /// Every player's reactors
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Banner {
    /// Last ledger read failed; the board shows the last good state
    LedgerUnavailable(String),
    /// Last ledger write failed
    WriteFailed(String),
}

impl Banner {
    pub fn message(&self) -> &str {
        match self {
            Banner::LedgerUnavailable(msg) | Banner::WriteFailed(msg) => msg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    /// Seen in the replicated event log
    Replica,
    /// Submitted by this client, not yet on the ledger
    Optimistic,
}

/// A reactor shown ahead of ledger confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionalReactor {
    pub cell: Cell,
    pub owner: Address,
    pub energy: EnergyLevel,
    pub round: u32,
    pub source: EntrySource,
    pub observed_at_ms: u64,
    pub tx_hash: Option<TxHash>,
    pub triggered: bool,
}

/// Everything the UI renders. The UI never writes to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayedState {
    pub round: u32,
    pub phase: Phase,
    pub phase_time_remaining: u32,
    /// Confirmed reactors of the current round
    pub reactors: Vec<Reactor>,
    pub provisional: Vec<ProvisionalReactor>,
    /// Cells triggered this round, for chain animations
    pub triggered: Vec<Cell>,
    pub selection: Vec<ReactorId>,
    pub banner: Option<Banner>,
    pub connected_players: usize,
    pub view: ViewFilter,
}

// ============================================================================
// TICKETS & REPORTS
// ============================================================================

/// Handle for an outstanding full-scan ledger read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadTicket {
    seq: u64,
    generation: u64,
    round: u32,
}

impl ReadTicket {
    pub fn round(&self) -> u32 {
        self.round
    }
}

/// Handle for an outstanding deploy write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTicket {
    generation: u64,
    round: u32,
    pub cell: Cell,
    pub energy: EnergyLevel,
}

impl DeployTicket {
    pub fn round(&self) -> u32 {
        self.round
    }
}

/// Handle for an outstanding batch trigger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerTicket {
    generation: u64,
    round: u32,
    pub ids: Vec<ReactorId>,
}

impl TriggerTicket {
    pub fn round(&self) -> u32 {
        self.round
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Applied { reactors: usize, superseded: usize },
    /// Issued before the last round boundary, or older than a read
    /// already applied; dropped
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub info: RoundInfo,
    /// The round changed on this tick and the board was purged
    pub boundary: bool,
    /// A ledger read the caller must perform
    pub read: Option<ReadTicket>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    TimedOut { age_ms: u64 },
    CellTaken { owner: Address },
    Rejected(String),
    LedgerUnavailable(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::TimedOut { age_ms } => write!(f, "not confirmed after {}ms", age_ms),
            FailureReason::CellTaken { owner } => write!(f, "cell taken by {}", owner),
            FailureReason::Rejected(reason) => write!(f, "rejected: {}", reason),
            FailureReason::LedgerUnavailable(msg) => write!(f, "ledger unavailable: {}", msg),
        }
    }
}

/// A local deploy that will not appear on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployFailure {
    pub cell: Cell,
    pub energy: EnergyLevel,
    pub round: u32,
    pub reason: FailureReason,
}

/// A local reactor seen on the ledger for the first time this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfirmation {
    pub id: ReactorId,
    pub cell: Cell,
    pub round: u32,
}

/// Counters for logs, exports and scenario checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub boundaries: u64,
    pub reads_issued: u64,
    pub reads_applied: u64,
    pub read_failures: u64,
    pub stale_reads: u64,
    pub stale_writes: u64,
    pub stale_events: u64,
    pub anomalies: u64,
    pub superseded: u64,
    pub expired_local: u64,
    pub expired_remote: u64,
    pub confirmations: u64,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    config: SyncConfig,
    local: Address,
    round_info: RoundInfo,
    last_known_round: u32,
    generation: u64,

    /// Ledger state for the current round, one reactor per cell
    confirmed: BTreeMap<Cell, Reactor>,
    provisional: BTreeMap<Cell, ProvisionalReactor>,
    triggered: BTreeSet<Cell>,
    selection: Selection,
    markers: RoundMarkers,

    /// Last replica event sequence merged
    event_cursor: u64,
    /// Replica events from a round this engine's clock has not reached
    early_events: Vec<GameEvent>,

    read_seq: u64,
    /// Sequence of the newest read applied to the board
    last_applied_read_seq: u64,
    read_in_flight: Option<ReadTicket>,
    last_read_issued_ms: Option<u64>,
    refresh_requested: bool,
    /// Generation of the batch trigger in flight
    trigger_in_flight: Option<u64>,
    /// Set by a purge, cleared by the tick that reports it
    boundary_pending: bool,

    banner: Option<Banner>,
    connected_players: usize,
    failures: Vec<DeployFailure>,
    confirmations: Vec<DeployConfirmation>,
    stats: EngineStats,
}

impl ReconciliationEngine {
    pub fn new(config: SyncConfig, local: Address, now_ms: u64) -> Self {
        let round_info = config.schedule.compute_at_millis(now_ms);
        let selection = Selection::with_capacity(config.max_selection);
        Self {
            config,
            local,
            round_info,
            last_known_round: round_info.round_number,
            generation: 0,
            confirmed: BTreeMap::new(),
            provisional: BTreeMap::new(),
            triggered: BTreeSet::new(),
            selection,
            markers: RoundMarkers::new(),
            event_cursor: 0,
            early_events: Vec::new(),
            read_seq: 0,
            last_applied_read_seq: 0,
            read_in_flight: None,
            last_read_issued_ms: None,
            refresh_requested: true,
            trigger_in_flight: None,
            boundary_pending: false,
            banner: None,
            connected_players: 0,
            failures: Vec::new(),
            confirmations: Vec::new(),
            stats: EngineStats::default(),
        }
    }

    /// One reconciliation pass.
    ///
    /// On a round change the board is purged and the pass stops there; the
    /// returned read repopulates it. A purge done by an action or a replica
    /// merge between ticks is reported by the next tick.
    pub fn tick(&mut self, now_ms: u64, replica: &GameModel) -> TickOutcome {
        let info = self.observe_clock(now_ms);
        if std::mem::take(&mut self.boundary_pending) {
            let read = self.issue_read(now_ms);
            return TickOutcome {
                info,
                boundary: true,
                read: Some(read),
            };
        }

        self.merge_events(replica);
        self.expire_provisional(now_ms);

        let read = if self.read_due(now_ms) {
            Some(self.issue_read(now_ms))
        } else {
            None
        };
        TickOutcome {
            info,
            boundary: false,
            read,
        }
    }

    /// Purges the board when the clock has moved to another round.
    fn observe_clock(&mut self, now_ms: u64) -> RoundInfo {
        let info = self.config.schedule.compute_at_millis(now_ms);
        self.round_info = info;
        if info.round_number != self.last_known_round {
            self.purge_round(info.round_number);
        }
        info
    }

    fn purge_round(&mut self, new_round: u32) {
        let previous = self.last_known_round;
        let cleared = self.confirmed.len() + self.provisional.len();

        self.confirmed.clear();
        self.provisional.clear();
        self.triggered.clear();
        self.selection.clear();
        self.markers.evict_except(new_round);

        self.generation += 1;
        self.last_known_round = new_round;
        self.read_in_flight = None;
        self.trigger_in_flight = None;
        self.refresh_requested = true;
        self.boundary_pending = true;
        if matches!(self.banner, Some(Banner::WriteFailed(_))) {
            self.banner = None;
        }
        self.stats.boundaries += 1;

        info!(from = previous, to = new_round, cleared, "round boundary, board purged");

        let held = std::mem::take(&mut self.early_events);
        if !held.is_empty() {
            debug!(held = held.len(), round = new_round, "replaying replica events held for this round");
        }
        for event in &held {
            self.merge_event(event);
        }
    }

    fn read_due(&self, now_ms: u64) -> bool {
        let since_last = self
            .last_read_issued_ms
            .map(|issued| now_ms.saturating_sub(issued));

        match self.read_in_flight {
            // A read that never reported back is written off after the confirmation timeout
            Some(_) => since_last.is_some_and(|age| age > self.config.confirmation_timeout_ms),
            None => {
                self.refresh_requested
                    || since_last.map_or(true, |age| age >= self.config.ledger_poll_interval_ms)
            }
        }
    }

    fn issue_read(&mut self, now_ms: u64) -> ReadTicket {
        self.read_seq += 1;
        let ticket = ReadTicket {
            seq: self.read_seq,
            generation: self.generation,
            round: self.last_known_round,
        };
        self.read_in_flight = Some(ticket);
        self.last_read_issued_ms = Some(now_ms);
        self.refresh_requested = false;
        self.stats.reads_issued += 1;
        ticket
    }

    fn ensure_current(&self, generation: u64, round: u32) -> Result<(), SyncError> {
        if generation == self.generation {
            Ok(())
        } else {
            Err(SyncError::StaleRound {
                result_round: round,
                current_round: self.last_known_round,
            })
        }
    }

    // ========================================================================
    // LEDGER READS
    // ========================================================================

    /// Applies a full-scan ledger result.
    pub fn apply_ledger_snapshot(&mut self, ticket: ReadTicket, reactors: Vec<Reactor>) -> ReadOutcome {
        if self.read_in_flight == Some(ticket) {
            self.read_in_flight = None;
        }
        if let Err(err) = self.ensure_current(ticket.generation, ticket.round) {
            self.stats.stale_reads += 1;
            debug!(%err, "discarding ledger read");
            return ReadOutcome::Stale;
        }
        if ticket.seq < self.last_applied_read_seq {
            self.stats.stale_reads += 1;
            debug!(
                seq = ticket.seq,
                applied = self.last_applied_read_seq,
                "discarding ledger read older than the board"
            );
            return ReadOutcome::Stale;
        }

        let round = self.last_known_round;
        let mut latest: BTreeMap<Cell, Reactor> = BTreeMap::new();
        for reactor in reactors {
            if reactor.round != round || !reactor.is_active {
                continue;
            }
            match latest.get(&reactor.cell()) {
                Some(existing) if existing.id >= reactor.id => {}
                _ => {
                    latest.insert(reactor.cell(), reactor);
                }
            }
        }

        let mut superseded = 0;
        for (cell, reactor) in &latest {
            if let Some(entry) = self.provisional.remove(cell) {
                superseded += 1;
                if entry.source == EntrySource::Optimistic && reactor.owner != self.local {
                    warn!(%cell, owner = %reactor.owner, "deploy lost the cell");
                    self.report_failure(
                        entry,
                        FailureReason::CellTaken {
                            owner: reactor.owner.clone(),
                        },
                    );
                }
            }

            if reactor.owner == self.local && self.markers.record_confirmation(&self.local, round, reactor.id) {
                self.stats.confirmations += 1;
                self.confirmations.push(DeployConfirmation {
                    id: reactor.id,
                    cell: *cell,
                    round,
                });
                info!(id = reactor.id, %cell, round, "deploy confirmed");
            }
        }
        self.stats.superseded += superseded as u64;

        let owned: BTreeSet<ReactorId> = latest
            .values()
            .filter(|reactor| reactor.owner == self.local)
            .map(|reactor| reactor.id)
            .collect();
        self.selection.retain(|id| owned.contains(id));

        let provisional = &self.provisional;
        self.triggered
            .retain(|cell| latest.contains_key(cell) || provisional.contains_key(cell));

        let count = latest.len();
        self.confirmed = latest;
        self.last_applied_read_seq = ticket.seq;
        self.stats.reads_applied += 1;

        if matches!(self.banner, Some(Banner::LedgerUnavailable(_))) {
            info!("ledger reachable again");
            self.banner = None;
        }

        ReadOutcome::Applied {
            reactors: count,
            superseded,
        }
    }

    /// Records a failed ledger read. The board keeps its last good state.
    /// Returns false when the read belonged to an earlier round or a newer
    /// read has already been applied.
    pub fn fail_ledger_read(&mut self, ticket: ReadTicket, err: &LedgerError) -> bool {
        if self.read_in_flight == Some(ticket) {
            self.read_in_flight = None;
        }
        if self.ensure_current(ticket.generation, ticket.round).is_err() || ticket.seq < self.last_applied_read_seq {
            self.stats.stale_reads += 1;
            return false;
        }

        self.stats.read_failures += 1;
        warn!(%err, round = self.last_known_round, "ledger read failed, keeping last good state");
        self.banner = Some(Banner::LedgerUnavailable(err.to_string()));
        true
    }

    /// Asks for a full scan on the next tick.
    pub fn request_refresh(&mut self) {
        self.refresh_requested = true;
    }

    // ========================================================================
    // REPLICA
    // ========================================================================

    /// Merges replica events not yet seen.
    ///
    /// The clock is observed first, so a replica that entered the next round
    /// before this engine's tick does not lose that round's events.
    pub fn merge_replica(&mut self, replica: &GameModel, now_ms: u64) {
        self.observe_clock(now_ms);
        self.merge_events(replica);
    }

    fn merge_events(&mut self, replica: &GameModel) {
        if let Some(oldest) = replica.oldest_seq() {
            if oldest > self.event_cursor + 1 {
                debug!(skipped = oldest - self.event_cursor - 1, "replica log wrapped past cursor");
            }
        }

        for event in replica.events_since(self.event_cursor) {
            self.event_cursor = event.seq;
            self.merge_event(event);
        }

        self.connected_players = replica.connected_player_count();
    }

    /// Events of the next round are held and replayed when the clock
    /// reaches it. Events of any other round are dropped as stale.
    fn merge_event(&mut self, event: &GameEvent) {
        if !matches!(
            event.kind,
            GameEventKind::ReactorDeployed { .. } | GameEventKind::ReactorTriggered { .. }
        ) {
            return;
        }

        let round = self.last_known_round;
        if event.round != round {
            if event.round == self.config.schedule.next_round(round) {
                if self.early_events.len() >= self.config.event_log_capacity {
                    self.early_events.remove(0);
                }
                debug!(event_round = event.round, round, seq = event.seq, "replica event ahead of clock, held");
                self.early_events.push(event.clone());
            } else {
                self.stats.stale_events += 1;
            }
            return;
        }

        match &event.kind {
            GameEventKind::ReactorDeployed {
                player_id,
                cell,
                energy,
                tx_hash,
                ..
            } => {
                if !cell.in_bounds(self.config.board_size) || self.confirmed.contains_key(cell) {
                    return;
                }
                let existing = self
                    .provisional
                    .get(cell)
                    .map(|entry| (entry.owner == *player_id, entry.source));
                match existing {
                    Some((true, _)) => {
                        if let Some(entry) = self.provisional.get_mut(cell) {
                            entry.tx_hash.get_or_insert_with(|| tx_hash.clone());
                        }
                    }
                    Some((false, EntrySource::Optimistic)) => {
                        debug!(%cell, other = %player_id, "cell contested, waiting for ledger");
                    }
                    _ => {
                        self.provisional.insert(
                            *cell,
                            ProvisionalReactor {
                                cell: *cell,
                                owner: player_id.clone(),
                                energy: *energy,
                                round,
                                source: EntrySource::Replica,
                                observed_at_ms: event.timestamp_ms,
                                tx_hash: Some(tx_hash.clone()),
                                triggered: false,
                            },
                        );
                    }
                }
            }
            GameEventKind::ReactorTriggered { cell, .. } => {
                if let Some(entry) = self.provisional.get_mut(cell) {
                    entry.triggered = true;
                }
                if self.confirmed.contains_key(cell) || self.provisional.contains_key(cell) {
                    self.triggered.insert(*cell);
                }
            }
            _ => {}
        }
    }

    /// Cross-checks the replica against the phase clock.
    ///
    /// Drift beyond tolerance is logged and counted. The replica is left
    /// as it is; the clock stays authoritative for display.
    pub fn check_replica(&mut self, replica: &GameModel, now_ms: u64) -> Result<(), SyncError> {
        let schedule = self.config.schedule;
        let info = schedule.compute_at_millis(now_ms);
        let round_ms = schedule.round_duration_ms();
        let day_ms = round_ms * u64::from(schedule.rounds_per_day);

        let clock_pos = u64::from(info.round_number - 1) * round_ms + info.millis_into_round;

        let replica_phase = replica.current_phase();
        let elapsed = schedule
            .phase_ms(replica_phase)
            .saturating_sub(replica.phase_time_remaining_ms(now_ms));
        let replica_pos = u64::from(replica.current_round().max(1) - 1) * round_ms
            + schedule.phase_offset_ms(replica_phase)
            + elapsed;

        let raw = clock_pos.abs_diff(replica_pos);
        let drift_ms = raw.min(day_ms.saturating_sub(raw));

        if drift_ms > self.config.divergence_tolerance_ms {
            self.stats.anomalies += 1;
            warn!(
                replica_round = replica.current_round(),
                replica_phase = %replica_phase,
                clock_round = info.round_number,
                clock_phase = %info.phase,
                drift_ms,
                "replica diverged from phase clock"
            );
            return Err(SyncError::ReplicaDivergence {
                replica_round: replica.current_round(),
                replica_phase,
                clock_round: info.round_number,
                clock_phase: info.phase,
                drift_ms,
            });
        }
        Ok(())
    }

    fn expire_provisional(&mut self, now_ms: u64) {
        let timeout = self.config.confirmation_timeout_ms;
        let expired: Vec<Cell> = self
            .provisional
            .iter()
            .filter(|(_, entry)| now_ms.saturating_sub(entry.observed_at_ms) > timeout)
            .map(|(cell, _)| *cell)
            .collect();

        for cell in expired {
            let Some(entry) = self.provisional.remove(&cell) else {
                continue;
            };
            let age_ms = now_ms.saturating_sub(entry.observed_at_ms);
            match entry.source {
                EntrySource::Optimistic => {
                    self.stats.expired_local += 1;
                    warn!(%cell, age_ms, "deploy never confirmed");
                    self.report_failure(entry, FailureReason::TimedOut { age_ms });
                }
                EntrySource::Replica => {
                    self.stats.expired_remote += 1;
                    debug!(%cell, owner = %entry.owner, age_ms, "replica entry expired");
                }
            }
        }
    }

    fn report_failure(&mut self, entry: ProvisionalReactor, reason: FailureReason) {
        self.failures.push(DeployFailure {
            cell: entry.cell,
            energy: entry.energy,
            round: entry.round,
            reason,
        });
    }

    // ========================================================================
    // LOCAL ACTIONS
    // ========================================================================

    /// Records an optimistic deploy and returns the write to perform.
    pub fn begin_deploy(
        &mut self,
        x: u32,
        y: u32,
        energy: EnergyLevel,
        now_ms: u64,
    ) -> Result<DeployTicket, ActionError> {
        let info = self.observe_clock(now_ms);
        if info.phase != Phase::Deploy {
            return Err(ActionError::wrong_phase(Phase::Deploy, info.phase));
        }
        let size = self.config.board_size;
        let cell = Cell::checked(x, y, size).ok_or(ActionError::OutOfBounds { x, y, size })?;
        if self
            .provisional
            .get(&cell)
            .is_some_and(|entry| entry.source == EntrySource::Optimistic)
        {
            return Err(ActionError::CellPending(cell));
        }

        let round = info.round_number;
        self.provisional.insert(
            cell,
            ProvisionalReactor {
                cell,
                owner: self.local.clone(),
                energy,
                round,
                source: EntrySource::Optimistic,
                observed_at_ms: now_ms,
                tx_hash: None,
                triggered: false,
            },
        );
        self.markers.mark_deployed(&self.local, round);
        info!(%cell, %energy, round, "deploy submitted");

        Ok(DeployTicket {
            generation: self.generation,
            round,
            cell,
            energy,
        })
    }

    /// Applies the result of a deploy write. On success returns the command
    /// to publish to the replicas.
    pub fn complete_deploy(
        &mut self,
        ticket: DeployTicket,
        result: Result<TxHash, LedgerError>,
    ) -> Option<GameCommand> {
        if let Err(err) = self.ensure_current(ticket.generation, ticket.round) {
            self.stats.stale_writes += 1;
            debug!(%err, cell = %ticket.cell, "discarding deploy result");
            return None;
        }

        match result {
            Ok(tx_hash) => {
                if let Some(entry) = self.provisional.get_mut(&ticket.cell) {
                    if entry.source == EntrySource::Optimistic {
                        entry.tx_hash = Some(tx_hash.clone());
                    }
                }
                if matches!(self.banner, Some(Banner::WriteFailed(_))) {
                    self.banner = None;
                }
                self.refresh_requested = true;
                Some(GameCommand::DeployReactor {
                    player_id: self.local.clone(),
                    x: ticket.cell.x,
                    y: ticket.cell.y,
                    reactor_type: ticket.energy.reactor_type(),
                    energy_level: ticket.energy,
                    tx_hash,
                })
            }
            Err(err) => {
                if self
                    .provisional
                    .get(&ticket.cell)
                    .is_some_and(|entry| entry.source == EntrySource::Optimistic)
                {
                    self.provisional.remove(&ticket.cell);
                }
                let reason = match &err {
                    LedgerError::Rejected(reason) => FailureReason::Rejected(reason.clone()),
                    LedgerError::Unavailable(msg) => FailureReason::LedgerUnavailable(msg.clone()),
                    LedgerError::Timeout(_) => FailureReason::LedgerUnavailable(err.to_string()),
                };
                warn!(cell = %ticket.cell, %err, "deploy failed");
                self.banner = Some(Banner::WriteFailed(err.to_string()));
                self.failures.push(DeployFailure {
                    cell: ticket.cell,
                    energy: ticket.energy,
                    round: ticket.round,
                    reason,
                });
                None
            }
        }
    }

    /// Adds or removes one of the local player's reactors from the batch.
    pub fn toggle_selection(&mut self, id: ReactorId) -> Result<ToggleOutcome, ActionError> {
        if !self.selection.contains(id) {
            let reactor = self
                .confirmed
                .values()
                .find(|reactor| reactor.id == id)
                .ok_or(ActionError::UnknownReactor(id))?;
            if reactor.owner != self.local {
                return Err(ActionError::NotOwner(id));
            }
        }
        Ok(self.selection.toggle(id))
    }

    /// Packages the selection into one trigger write.
    pub fn begin_trigger(&mut self, now_ms: u64) -> Result<TriggerTicket, ActionError> {
        let info = self.observe_clock(now_ms);
        if self.trigger_in_flight == Some(self.generation) {
            return Err(ActionError::TriggerInFlight);
        }
        let batch = self.selection.submit(info.phase)?;
        self.trigger_in_flight = Some(self.generation);
        info!(count = batch.ids.len(), round = info.round_number, "batch trigger submitted");

        Ok(TriggerTicket {
            generation: self.generation,
            round: info.round_number,
            ids: batch.ids,
        })
    }

    /// Applies the result of a batch trigger. Success clears the selection
    /// and returns one replica command per triggered reactor; failure keeps
    /// the selection for a retry.
    pub fn complete_trigger(
        &mut self,
        ticket: TriggerTicket,
        result: Result<TxHash, LedgerError>,
    ) -> Vec<GameCommand> {
        if self.trigger_in_flight == Some(ticket.generation) {
            self.trigger_in_flight = None;
        }
        if let Err(err) = self.ensure_current(ticket.generation, ticket.round) {
            self.stats.stale_writes += 1;
            debug!(%err, "discarding trigger result");
            return Vec::new();
        }

        match result {
            Ok(tx_hash) => {
                info!(%tx_hash, count = ticket.ids.len(), "batch trigger accepted");
                self.selection.clear();
                self.refresh_requested = true;
                if matches!(self.banner, Some(Banner::WriteFailed(_))) {
                    self.banner = None;
                }

                let mut commands = Vec::with_capacity(ticket.ids.len());
                for id in &ticket.ids {
                    let Some(reactor) = self.confirmed.values().find(|reactor| reactor.id == *id) else {
                        continue;
                    };
                    self.triggered.insert(reactor.cell());
                    commands.push(GameCommand::TriggerReactor {
                        player_id: self.local.clone(),
                        x: reactor.x,
                        y: reactor.y,
                        chain_reaction_data: ticket.ids.clone(),
                    });
                }
                commands
            }
            Err(err) => {
                warn!(%err, count = ticket.ids.len(), "batch trigger failed, selection kept");
                self.banner = Some(Banner::WriteFailed(err.to_string()));
                Vec::new()
            }
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn display(&self, view: ViewFilter) -> DisplayedState {
        let visible = |owner: &Address| view == ViewFilter::Public || *owner == self.local;
        DisplayedState {
            round: self.round_info.round_number,
            phase: self.round_info.phase,
            phase_time_remaining: self.round_info.phase_time_remaining,
            reactors: self
                .confirmed
                .values()
                .filter(|reactor| visible(&reactor.owner))
                .cloned()
                .collect(),
            provisional: self
                .provisional
                .values()
                .filter(|entry| visible(&entry.owner))
                .cloned()
                .collect(),
            triggered: self.triggered.iter().copied().collect(),
            selection: self.selection.ids().to_vec(),
            banner: self.banner.clone(),
            connected_players: self.connected_players,
            view,
        }
    }

    pub fn local(&self) -> &Address {
        &self.local
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn round_info(&self) -> RoundInfo {
        self.round_info
    }

    pub fn last_known_round(&self) -> u32 {
        self.last_known_round
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    pub fn markers(&self) -> &RoundMarkers {
        &self.markers
    }

    pub fn confirmed_reactors(&self) -> impl Iterator<Item = &Reactor> + '_ {
        self.confirmed.values()
    }

    pub fn provisional_at(&self, cell: Cell) -> Option<&ProvisionalReactor> {
        self.provisional.get(&cell)
    }

    pub fn provisional_count(&self) -> usize {
        self.provisional.len()
    }

    pub fn read_in_flight(&self) -> bool {
        self.read_in_flight.is_some()
    }

    pub fn drain_failures(&mut self) -> Vec<DeployFailure> {
        std::mem::take(&mut self.failures)
    }

    pub fn drain_confirmations(&mut self) -> Vec<DeployConfirmation> {
        std::mem::take(&mut self.confirmations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2024-06-01 00:00:00 UTC
    const T0: u64 = 1_717_200_000_000;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    fn me() -> Address {
        addr(1)
    }

    fn reactor(id: ReactorId, x: u8, y: u8, owner: Address, round: u32) -> Reactor {
        Reactor {
            id,
            x,
            y,
            energy: EnergyLevel::Medium,
            owner,
            is_active: true,
            round,
        }
    }

    fn setup(now_ms: u64) -> (ReconciliationEngine, GameModel) {
        let config = SyncConfig::default();
        let info = config.schedule.compute_at_millis(now_ms);
        let model = GameModel::aligned(&config, &info, now_ms);
        let engine = ReconciliationEngine::new(config, me(), now_ms);
        (engine, model)
    }

    fn tick_read(engine: &mut ReconciliationEngine, model: &GameModel, now_ms: u64) -> ReadTicket {
        engine
            .tick(now_ms, model)
            .read
            .expect("tick should request a read")
    }

    #[test]
    fn test_boundary_purges_board_and_selection() {
        let (mut engine, model) = setup(T0 + 10_000);
        let ticket = tick_read(&mut engine, &model, T0 + 10_000);
        engine.apply_ledger_snapshot(ticket, vec![reactor(1, 0, 0, me(), 1), reactor(2, 1, 0, addr(2), 1)]);
        engine.begin_deploy(4, 4, EnergyLevel::Low, T0 + 11_000).unwrap();
        engine.toggle_selection(1).unwrap();
        assert_eq!(engine.display(ViewFilter::Public).reactors.len(), 2);

        let outcome = engine.tick(T0 + 300_000, &model);
        assert!(outcome.boundary);
        assert!(outcome.read.is_some());
        assert_eq!(outcome.info.round_number, 2);

        let display = engine.display(ViewFilter::Public);
        assert_eq!(display.round, 2);
        assert_eq!(display.phase, Phase::Deploy);
        assert!(display.reactors.is_empty());
        assert!(display.provisional.is_empty());
        assert!(display.selection.is_empty());
        assert_eq!(engine.stats().boundaries, 1);
    }

    #[test]
    fn test_read_from_previous_round_is_discarded() {
        let (mut engine, model) = setup(T0 + 299_000);
        let old = tick_read(&mut engine, &model, T0 + 299_000);

        let outcome = engine.tick(T0 + 300_500, &model);
        assert!(outcome.boundary);

        let result = engine.apply_ledger_snapshot(old, vec![reactor(1, 0, 0, me(), 2)]);
        assert_eq!(result, ReadOutcome::Stale);
        assert_eq!(engine.stats().stale_reads, 1);
        assert!(engine.display(ViewFilter::Public).reactors.is_empty());

        // Stale failures do not raise the banner either
        assert!(!engine.fail_ledger_read(old, &LedgerError::unavailable("rpc down")));
        assert!(engine.banner().is_none());
    }

    #[test]
    fn test_snapshot_keeps_current_round_active_only() {
        let (mut engine, model) = setup(T0 + 10_000);
        let ticket = tick_read(&mut engine, &model, T0 + 10_000);
        let mut inactive = reactor(3, 2, 2, me(), 1);
        inactive.is_active = false;

        engine.apply_ledger_snapshot(
            ticket,
            vec![reactor(1, 0, 0, me(), 1), reactor(2, 1, 1, me(), 288), inactive],
        );
        let display = engine.display(ViewFilter::Public);
        assert_eq!(display.reactors.len(), 1);
        assert_eq!(display.reactors[0].id, 1);
    }

    #[test]
    fn test_duplicate_cell_highest_id_wins() {
        let (mut engine, model) = setup(T0 + 10_000);
        let ticket = tick_read(&mut engine, &model, T0 + 10_000);
        engine.apply_ledger_snapshot(
            ticket,
            vec![reactor(9, 3, 3, addr(2), 1), reactor(4, 3, 3, addr(3), 1), reactor(7, 3, 3, addr(4), 1)],
        );
        let display = engine.display(ViewFilter::Public);
        assert_eq!(display.reactors.len(), 1);
        assert_eq!(display.reactors[0].id, 9);
        assert_eq!(display.reactors[0].owner, addr(2));
    }

    #[test]
    fn test_ledger_supersedes_replica_entry() {
        let (mut engine, mut model) = setup(T0 + 10_000);
        model.apply(
            &GameCommand::DeployReactor {
                player_id: addr(2),
                x: 5,
                y: 5,
                reactor_type: EnergyLevel::High.reactor_type(),
                energy_level: EnergyLevel::High,
                tx_hash: TxHash("0xabc".into()),
            },
            T0 + 10_000,
        );

        let ticket = tick_read(&mut engine, &model, T0 + 11_000);
        let display = engine.display(ViewFilter::Public);
        assert_eq!(display.provisional.len(), 1);
        assert_eq!(display.provisional[0].source, EntrySource::Replica);
        assert_eq!(display.provisional[0].owner, addr(2));

        let outcome = engine.apply_ledger_snapshot(ticket, vec![reactor(12, 5, 5, addr(3), 1)]);
        assert_eq!(outcome, ReadOutcome::Applied { reactors: 1, superseded: 1 });

        let display = engine.display(ViewFilter::Public);
        assert!(display.provisional.is_empty());
        assert_eq!(display.reactors[0].owner, addr(3));
        assert_eq!(display.reactors[0].id, 12);
    }

    #[test]
    fn test_unconfirmed_deploy_times_out() {
        let (mut engine, mut model) = setup(T0 + 5_000);
        let ticket = engine.begin_deploy(5, 5, EnergyLevel::Low, T0 + 10_000).unwrap();
        let command = engine
            .complete_deploy(ticket, Ok(TxHash("0x55".into())))
            .expect("success publishes a command");
        model.apply(&command, T0 + 10_100);

        engine.tick(T0 + 25_000, &model);
        assert!(engine.provisional_at(Cell::new(5, 5)).is_some());
        assert!(engine.drain_failures().is_empty());

        engine.tick(T0 + 40_000, &model);
        assert!(engine.provisional_at(Cell::new(5, 5)).is_none());
        let failures = engine.drain_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].cell, Cell::new(5, 5));
        assert!(matches!(failures[0].reason, FailureReason::TimedOut { age_ms } if age_ms == 30_000));
        assert_eq!(engine.stats().expired_local, 1);
    }

    #[test]
    fn test_remote_replica_entry_expires_silently() {
        let (mut engine, mut model) = setup(T0 + 5_000);
        model.apply(
            &GameCommand::DeployReactor {
                player_id: addr(2),
                x: 1,
                y: 1,
                reactor_type: EnergyLevel::Low.reactor_type(),
                energy_level: EnergyLevel::Low,
                tx_hash: TxHash("0x11".into()),
            },
            T0 + 5_000,
        );
        engine.tick(T0 + 6_000, &model);
        assert_eq!(engine.provisional_count(), 1);

        engine.tick(T0 + 35_000, &model);
        assert_eq!(engine.provisional_count(), 0);
        assert!(engine.drain_failures().is_empty());
        assert_eq!(engine.stats().expired_remote, 1);
    }

    #[test]
    fn test_confirmation_reported_once() {
        let (mut engine, model) = setup(T0 + 5_000);
        let deploy = engine.begin_deploy(2, 3, EnergyLevel::Ultra, T0 + 5_000).unwrap();
        engine.complete_deploy(deploy, Ok(TxHash("0x23".into())));

        let first = tick_read(&mut engine, &model, T0 + 6_000);
        engine.apply_ledger_snapshot(first, vec![reactor(40, 2, 3, me(), 1)]);
        let confirmations = engine.drain_confirmations();
        assert_eq!(confirmations.len(), 1);
        assert_eq!(confirmations[0].id, 40);
        assert_eq!(engine.provisional_count(), 0);

        let second = tick_read(&mut engine, &model, T0 + 7_000);
        engine.apply_ledger_snapshot(second, vec![reactor(40, 2, 3, me(), 1)]);
        assert!(engine.drain_confirmations().is_empty());
        assert!(engine.markers().deployed_this_round(&me(), 1));
    }

    #[test]
    fn test_deploy_loses_contested_cell() {
        let (mut engine, model) = setup(T0 + 5_000);
        engine.begin_deploy(2, 2, EnergyLevel::Low, T0 + 5_000).unwrap();

        let ticket = tick_read(&mut engine, &model, T0 + 6_000);
        engine.apply_ledger_snapshot(ticket, vec![reactor(8, 2, 2, addr(9), 1)]);

        let failures = engine.drain_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].reason, FailureReason::CellTaken { owner: addr(9) });
    }

    #[test]
    fn test_deploy_preconditions() {
        let (mut engine, _model) = setup(T0 + 5_000);
        assert_eq!(
            engine.begin_deploy(20, 0, EnergyLevel::Low, T0 + 5_000),
            Err(ActionError::OutOfBounds { x: 20, y: 0, size: 20 })
        );

        engine.begin_deploy(1, 1, EnergyLevel::Low, T0 + 5_000).unwrap();
        assert_eq!(
            engine.begin_deploy(1, 1, EnergyLevel::High, T0 + 6_000),
            Err(ActionError::CellPending(Cell::new(1, 1)))
        );

        assert_eq!(
            engine.begin_deploy(3, 3, EnergyLevel::Low, T0 + 130_000),
            Err(ActionError::wrong_phase(Phase::Deploy, Phase::Trigger))
        );
    }

    #[test]
    fn test_deploy_write_rejected() {
        let (mut engine, _model) = setup(T0 + 5_000);
        let ticket = engine.begin_deploy(7, 7, EnergyLevel::Low, T0 + 5_000).unwrap();
        let command = engine.complete_deploy(ticket, Err(LedgerError::rejected("cell occupied")));

        assert!(command.is_none());
        assert_eq!(engine.provisional_count(), 0);
        assert!(matches!(engine.banner(), Some(Banner::WriteFailed(_))));
        let failures = engine.drain_failures();
        assert_eq!(failures[0].reason, FailureReason::Rejected("cell occupied".into()));
    }

    #[test]
    fn test_write_from_previous_round_is_discarded() {
        let (mut engine, model) = setup(T0 + 119_000);
        let ticket = engine.begin_deploy(7, 7, EnergyLevel::Low, T0 + 119_000).unwrap();
        engine.tick(T0 + 300_000, &model);

        assert!(engine.complete_deploy(ticket, Ok(TxHash("0x77".into()))).is_none());
        assert_eq!(engine.stats().stale_writes, 1);
    }

    fn trigger_ready_engine() -> (ReconciliationEngine, GameModel) {
        let (mut engine, model) = setup(T0 + 5_000);
        let ticket = tick_read(&mut engine, &model, T0 + 5_000);
        let mut reactors: Vec<Reactor> = (0..12u8).map(|i| reactor(u64::from(i) + 1, i, 0, me(), 1)).collect();
        reactors.push(reactor(100, 0, 9, addr(2), 1));
        engine.apply_ledger_snapshot(ticket, reactors);
        (engine, model)
    }

    #[test]
    fn test_batch_trigger_flow() {
        let (mut engine, _model) = trigger_ready_engine();
        for id in 1..=10 {
            assert_eq!(engine.toggle_selection(id), Ok(ToggleOutcome::Added));
        }
        assert_eq!(engine.toggle_selection(11), Ok(ToggleOutcome::Full));

        assert!(matches!(
            engine.begin_trigger(T0 + 60_000),
            Err(ActionError::WrongPhase { .. })
        ));

        let ticket = engine.begin_trigger(T0 + 150_000).unwrap();
        assert_eq!(ticket.ids.len(), 10);
        assert_eq!(engine.begin_trigger(T0 + 151_000), Err(ActionError::TriggerInFlight));

        let commands = engine.complete_trigger(ticket, Ok(TxHash("0xbatch".into())));
        assert_eq!(commands.len(), 10);
        assert!(engine.selection().is_empty());
        assert_eq!(engine.display(ViewFilter::Private).triggered.len(), 10);
    }

    #[test]
    fn test_batch_trigger_failure_keeps_selection() {
        let (mut engine, _model) = trigger_ready_engine();
        engine.toggle_selection(1).unwrap();
        engine.toggle_selection(2).unwrap();

        let ticket = engine.begin_trigger(T0 + 150_000).unwrap();
        let commands = engine.complete_trigger(ticket, Err(LedgerError::unavailable("rpc down")));
        assert!(commands.is_empty());
        assert_eq!(engine.selection().ids(), &[1, 2]);
        assert!(matches!(engine.banner(), Some(Banner::WriteFailed(_))));

        // The failed batch no longer blocks a retry
        assert!(engine.begin_trigger(T0 + 151_000).is_ok());
    }

    #[test]
    fn test_toggle_rejects_unknown_and_foreign() {
        let (mut engine, _model) = trigger_ready_engine();
        assert_eq!(engine.toggle_selection(999), Err(ActionError::UnknownReactor(999)));
        assert_eq!(engine.toggle_selection(100), Err(ActionError::NotOwner(100)));
    }

    #[test]
    fn test_selection_pruned_after_read() {
        let (mut engine, model) = trigger_ready_engine();
        engine.toggle_selection(1).unwrap();
        engine.toggle_selection(2).unwrap();

        let ticket = tick_read(&mut engine, &model, T0 + 8_000);
        engine.apply_ledger_snapshot(ticket, vec![reactor(2, 1, 0, me(), 1)]);
        assert_eq!(engine.selection().ids(), &[2]);
    }

    #[test]
    fn test_view_filter() {
        let (engine, _model) = trigger_ready_engine();
        assert_eq!(engine.display(ViewFilter::Private).reactors.len(), 12);
        assert_eq!(engine.display(ViewFilter::Public).reactors.len(), 13);
    }

    #[test]
    fn test_ledger_outage_keeps_last_good_state() {
        let (mut engine, model) = trigger_ready_engine();

        let failing = tick_read(&mut engine, &model, T0 + 8_000);
        assert!(engine.fail_ledger_read(failing, &LedgerError::unavailable("rpc down")));
        let display = engine.display(ViewFilter::Public);
        assert_eq!(display.reactors.len(), 13);
        assert!(matches!(display.banner, Some(Banner::LedgerUnavailable(_))));

        let recovered = tick_read(&mut engine, &model, T0 + 9_000);
        engine.apply_ledger_snapshot(recovered, vec![reactor(1, 0, 0, me(), 1)]);
        assert!(engine.banner().is_none());
    }

    #[test]
    fn test_no_overlapping_reads() {
        let (mut engine, model) = setup(T0 + 5_000);
        assert!(engine.tick(T0 + 5_000, &model).read.is_some());
        assert!(engine.tick(T0 + 6_000, &model).read.is_none());
        assert!(engine.read_in_flight());

        // A read that never returns is written off after the timeout
        assert!(engine.tick(T0 + 26_000, &model).read.is_some());
    }

    #[test]
    fn test_replica_cross_check() {
        let (mut engine, model) = setup(T0 + 190_000);
        assert!(engine.check_replica(&model, T0 + 191_000).is_ok());

        // A fresh model believes it is round 1 Deploy; the clock says round 1 Trigger
        let stray = GameModel::new(&SyncConfig::default(), T0 + 190_000);
        let err = engine.check_replica(&stray, T0 + 190_000).unwrap_err();
        assert!(matches!(err, SyncError::ReplicaDivergence { drift_ms, .. } if drift_ms == 190_000));
        assert_eq!(engine.stats().anomalies, 1);
    }

    #[test]
    fn test_cross_check_handles_midnight_wrap() {
        let day_end = T0 + 86_400_000 - 500;
        let (mut engine, _) = setup(day_end);
        let config = SyncConfig::default();
        let info = config.schedule.compute_at_millis(T0 + 86_400_000 + 500);
        let ahead = GameModel::aligned(&config, &info, day_end);
        assert!(engine.check_replica(&ahead, day_end).is_ok());
    }

    #[test]
    fn test_replica_events_from_old_round_are_stale() {
        let (mut engine, mut model) = setup(T0 + 299_000);
        engine.tick(T0 + 300_100, &model);

        // Replica has not reached round 2 yet
        model.apply(
            &GameCommand::DeployReactor {
                player_id: addr(2),
                x: 0,
                y: 0,
                reactor_type: EnergyLevel::Low.reactor_type(),
                energy_level: EnergyLevel::Low,
                tx_hash: TxHash("0x00".into()),
            },
            T0 + 300_200,
        );
        engine.merge_replica(&model, T0 + 300_200);
        assert_eq!(engine.provisional_count(), 0);
        assert_eq!(engine.stats().stale_events, 1);
    }

    fn deploy_command(player: Address, x: u8, y: u8) -> GameCommand {
        GameCommand::DeployReactor {
            player_id: player,
            x,
            y,
            reactor_type: EnergyLevel::High.reactor_type(),
            energy_level: EnergyLevel::High,
            tx_hash: TxHash("0x55".into()),
        }
    }

    #[test]
    fn test_new_round_deploy_merged_before_engine_tick() {
        let (mut engine, mut model) = setup(T0 + 299_000);
        tick_read(&mut engine, &model, T0 + 299_500);

        // The replica reaches round 2 and takes a deploy before the engine ticks again
        model.advance(T0 + 300_100);
        assert_eq!(model.current_round(), 2);
        model.apply(&deploy_command(addr(2), 5, 5), T0 + 300_100);
        engine.merge_replica(&model, T0 + 300_100);

        assert_eq!(engine.stats().stale_events, 0);
        assert!(engine.provisional_at(Cell::new(5, 5)).is_some());

        let outcome = engine.tick(T0 + 300_500, &model);
        assert!(outcome.boundary);
        assert!(outcome.read.is_some());
        assert_eq!(engine.provisional_count(), 1);

        engine.tick(T0 + 301_500, &model);
        let entry = engine.provisional_at(Cell::new(5, 5)).unwrap();
        assert_eq!(entry.owner, addr(2));
        assert_eq!(entry.round, 2);
        assert_eq!(engine.stats().stale_events, 0);
        assert_eq!(engine.stats().boundaries, 1);
    }

    #[test]
    fn test_next_round_events_held_until_clock_catches_up() {
        let (mut engine, mut model) = setup(T0 + 299_000);
        tick_read(&mut engine, &model, T0 + 299_000);

        // This client's clock is slightly behind the replica's
        model.advance(T0 + 300_100);
        model.apply(&deploy_command(addr(3), 2, 9), T0 + 300_100);
        engine.merge_replica(&model, T0 + 299_900);
        assert_eq!(engine.provisional_count(), 0);
        assert_eq!(engine.stats().stale_events, 0);

        let outcome = engine.tick(T0 + 300_000, &model);
        assert!(outcome.boundary);
        let entry = engine.provisional_at(Cell::new(2, 9)).unwrap();
        assert_eq!(entry.owner, addr(3));
        assert_eq!(entry.round, 2);
    }

    #[test]
    fn test_written_off_read_does_not_overwrite_newer_one() {
        let (mut engine, model) = setup(T0 + 5_000);
        let older = tick_read(&mut engine, &model, T0 + 5_000);
        let newer = tick_read(&mut engine, &model, T0 + 26_000);
        assert!(newer.seq > older.seq);

        let applied = engine.apply_ledger_snapshot(newer, vec![reactor(7, 3, 3, addr(2), 1)]);
        assert!(matches!(applied, ReadOutcome::Applied { reactors: 1, .. }));

        let late = engine.apply_ledger_snapshot(older, Vec::new());
        assert_eq!(late, ReadOutcome::Stale);
        assert_eq!(engine.confirmed_reactors().count(), 1);
        assert_eq!(engine.stats().stale_reads, 1);

        // A late failure of the older read leaves the board and banner alone
        assert!(!engine.fail_ledger_read(older, &LedgerError::unavailable("rpc down")));
        assert!(engine.banner().is_none());
    }

    #[test]
    fn test_boundary_crossed_by_deploy_reported_on_next_tick() {
        let (mut engine, model) = setup(T0 + 299_000);
        tick_read(&mut engine, &model, T0 + 299_000);

        engine.begin_deploy(1, 1, EnergyLevel::Low, T0 + 300_100).unwrap();
        assert_eq!(engine.stats().boundaries, 1);

        let outcome = engine.tick(T0 + 300_200, &model);
        assert!(outcome.boundary);
        assert!(outcome.read.is_some());
        assert_eq!(outcome.info.round_number, 2);
        // The deploy made after the purge survives
        assert!(engine.provisional_at(Cell::new(1, 1)).is_some());

        assert!(!engine.tick(T0 + 300_300, &model).boundary);
    }

    #[test]
    fn test_boundary_crossed_by_trigger_reported_on_next_tick() {
        let (mut engine, model) = setup(T0 + 299_000);
        tick_read(&mut engine, &model, T0 + 299_000);

        // Nothing selected in the new round, but the purge still happened
        assert!(engine.begin_trigger(T0 + 300_100).is_err());
        let outcome = engine.tick(T0 + 300_200, &model);
        assert!(outcome.boundary);
        assert!(outcome.read.is_some());
    }
}
