//! SimWorld - The simulation harness container.
//!
//! Every peer is a replica plus a reconciliation engine, stepped in lock
//! step on the shared virtual clock. Pub/sub traffic goes through a central
//! router that applies partitions, loss and latency; ledger calls are queued
//! and executed against [`SimLedger`] after the configured latency, so their
//! results can land after a round boundary.

use crate::context::SimContext;
use crate::error::SimError;
use crate::exporter::{PeerFrame, SimEvent, SimFrame};
use crate::ledger::SimLedger;
use crate::network::{NetworkMessage, SimNetworkController, SimPubSub};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use synqblast_core::ledger::rank_scores;
use synqblast_core::reconcile::{DeployConfirmation, DeployTicket, ReadTicket, TriggerTicket};
use synqblast_core::{
    Address, Cell, ConfigError, DeployFailure, DisplayedState, EnergyLevel, GameCommand, GameModel,
    LeaderboardEntry, LedgerError, ReactorId, ReconciliationEngine, RoundInfo, SyncConfig, SyncError, ToggleOutcome,
    ViewFilter,
};
use synqblast_env::{EventEnvelope, NetworkController, PeerId, PubSubTransport, SynqContext};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const ROUTER_CAPACITY: usize = 10_000;
const INBOX_CAPACITY: usize = 1_000;

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of peers to spawn
    pub num_peers: usize,

    /// Settle window scenarios wait for convergence, in seconds
    pub max_duration_secs: f64,

    /// Virtual time per world step
    pub tick_ms: u64,

    /// Pub/sub delivery latency
    pub latency_ms: u64,

    /// Extra uniform latency on top of `latency_ms`
    pub jitter_ms: u64,

    /// Per-delivery loss probability (0.0 - 1.0)
    pub loss_rate: f64,

    /// Each peer's wall clock is offset by up to this much, either way
    pub max_clock_skew_ms: u64,

    /// Time between issuing a ledger call and its result
    pub ledger_latency_ms: u64,

    /// Virtual clock start, in seconds after UTC midnight
    pub start_offset_secs: u64,

    /// Configuration every peer's session runs with
    pub sync: SyncConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_peers: 4,
            max_duration_secs: 30.0,
            tick_ms: 250,
            latency_ms: 40,
            jitter_ms: 0,
            loss_rate: 0.0,
            max_clock_skew_ms: 0,
            ledger_latency_ms: 400,
            start_offset_secs: 0,
            sync: SyncConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sync.validate()?;
        let cells = usize::from(self.sync.board_size).pow(2);
        if self.num_peers == 0 || self.num_peers > cells {
            return Err(ConfigError::invalid(
                "num_peers",
                format!("must be between 1 and {}", cells),
            ));
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::invalid("tick_ms", "must be positive"));
        }
        if !(self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0) {
            return Err(ConfigError::invalid("max_duration_secs", "must be a positive number"));
        }
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(ConfigError::invalid("loss_rate", "must be within 0.0..=1.0"));
        }
        Ok(())
    }
}

/// One simulated client.
pub struct SimPeer {
    pub index: usize,
    pub id: PeerId,
    pub address: Address,
    pub network: Arc<SimPubSub>,
    inbox_tx: mpsc::Sender<(PeerId, EventEnvelope)>,

    pub model: GameModel,
    pub engine: ReconciliationEngine,

    /// Offset of this peer's wall clock from the ledger's
    pub clock_skew_ms: i64,
    next_resync_ms: u64,

    pub failures: Vec<DeployFailure>,
    pub confirmations: Vec<DeployConfirmation>,
    pub divergences: u64,
    pub max_drift_ms: u64,
}

impl SimPeer {
    /// This peer's reading of the wall clock.
    pub fn local_ms(&self, unix_ms: u64) -> u64 {
        unix_ms.saturating_add_signed(self.clock_skew_ms)
    }

    pub fn display(&self, view: ViewFilter) -> DisplayedState {
        self.engine.display(view)
    }

    /// Confirmed board as (cell, id) pairs, every owner included.
    pub fn confirmed_board(&self) -> Vec<(Cell, ReactorId)> {
        self.engine
            .confirmed_reactors()
            .map(|reactor| (reactor.cell(), reactor.id))
            .collect()
    }

    fn collect_reports(&mut self) {
        self.failures.extend(self.engine.drain_failures());
        self.confirmations.extend(self.engine.drain_confirmations());
    }
}

#[derive(Debug)]
enum LedgerOp {
    Read(ReadTicket),
    Deploy(DeployTicket),
    Trigger(TriggerTicket),
    Leaderboard(u32),
}

#[derive(Debug)]
struct PendingOp {
    due_ms: u64,
    seq: u64,
    peer: usize,
    op: LedgerOp,
}

#[derive(Debug)]
struct InTransit {
    deliver_at_ms: u64,
    seq: u64,
    to: usize,
    from: PeerId,
    envelope: EventEnvelope,
}

/// Traffic and ledger counters for the whole world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldMetrics {
    pub published: u64,
    pub delivered: u64,
    pub dropped_partition: u64,
    pub dropped_loss: u64,
    pub ledger_ops: u64,
    pub max_latency_ms: u64,
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// The authoritative ledger
    pub ledger: Arc<SimLedger>,

    /// Network controller for fault injection
    pub network_controller: SimNetworkController,

    pub peers: Vec<SimPeer>,

    /// Central router sender (receives every publish)
    router_tx: mpsc::Sender<NetworkMessage>,

    /// Central router receiver
    router_rx: mpsc::Receiver<NetworkMessage>,

    subscribers: Arc<AtomicUsize>,
    in_transit: Vec<InTransit>,
    pending_ops: Vec<PendingOp>,
    rng: ChaCha8Rng,
    seq: u64,

    /// Current tick count
    tick_count: u64,

    pub metrics: WorldMetrics,
}

impl SimWorld {
    /// Creates a new SimWorld with the given configuration.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;

        // Derive separate seeds for different subsystems
        let context_seed = config.seed;
        let network_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);

        let context = SimContext::shared(context_seed);
        context.set_time(Duration::from_secs(config.start_offset_secs));
        let ledger = Arc::new(SimLedger::new(
            Arc::clone(&context),
            config.sync.schedule,
            config.sync.board_size,
        ));

        let (router_tx, router_rx) = mpsc::channel::<NetworkMessage>(ROUTER_CAPACITY);

        Ok(Self {
            config,
            context,
            ledger,
            network_controller: SimNetworkController::new(),
            peers: Vec::new(),
            router_tx,
            router_rx,
            subscribers: Arc::new(AtomicUsize::new(0)),
            in_transit: Vec::new(),
            pending_ops: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(network_seed),
            seq: 0,
            tick_count: 0,
            metrics: WorldMetrics::default(),
        })
    }

    /// Spawns the configured number of peers and returns their IDs.
    pub fn spawn_peers(&mut self) -> Vec<PeerId> {
        let now = self.context.unix_millis();
        let sync = self.config.sync.clone();
        let max_skew = self.config.max_clock_skew_ms as i64;
        let mut ids = Vec::with_capacity(self.config.num_peers);

        for index in 0..self.config.num_peers {
            let id = PeerId::from_seed(index as u64);
            let address = Address::derive(self.context.as_ref(), index as u64);
            let clock_skew_ms = if max_skew > 0 {
                self.rng.gen_range(-max_skew..=max_skew)
            } else {
                0
            };

            let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
            self.subscribers.fetch_add(1, Ordering::Relaxed);
            let network = Arc::new(SimPubSub::new(
                id,
                self.router_tx.clone(),
                inbox_rx,
                Arc::clone(&self.subscribers),
            ));

            let local = now.saturating_add_signed(clock_skew_ms);
            let info = sync.schedule.compute_at_millis(local);
            let model = GameModel::aligned(&sync, &info, local);
            let engine = ReconciliationEngine::new(sync.clone(), address.clone(), local);

            debug!(index, peer = %id, player = %address, clock_skew_ms, "peer spawned");
            self.peers.push(SimPeer {
                index,
                id,
                address,
                network,
                inbox_tx,
                model,
                engine,
                clock_skew_ms,
                next_resync_ms: local + sync.resync_interval_ms,
                failures: Vec::new(),
                confirmations: Vec::new(),
                divergences: 0,
                max_drift_ms: 0,
            });
            ids.push(id);
        }

        ids
    }

    /// Every peer announces itself on the channel.
    pub async fn join_all(&mut self) -> Result<(), SimError> {
        for index in 0..self.peers.len() {
            let player_id = self.peers[index].address.clone();
            self.broadcast(index, GameCommand::PlayerJoined { player_id }).await?;
        }
        Ok(())
    }

    // ========================================================================
    // STEPPING
    // ========================================================================

    /// Advances the simulation by one tick.
    pub async fn step(&mut self) -> Result<(), SimError> {
        self.context.advance_time(Duration::from_millis(self.config.tick_ms));
        self.tick_count += 1;
        let now = self.context.unix_millis();

        self.process_network(now).await;
        for index in 0..self.peers.len() {
            self.step_peer(index, now);
        }
        self.run_due_ops(now).await
    }

    /// Steps until `offset` after UTC midnight (virtual).
    pub async fn run_until(&mut self, offset: Duration) -> Result<(), SimError> {
        let target_ms = offset.as_millis() as u64;
        while self.context.offset_ms() < target_ms {
            self.step().await?;
        }
        Ok(())
    }

    /// Routes published envelopes and delivers the ones that are due.
    pub async fn process_network(&mut self, now: u64) {
        while let Ok(msg) = self.router_rx.try_recv() {
            for (to, peer) in self.peers.iter().enumerate() {
                if peer.id == msg.from {
                    continue;
                }
                if !self.network_controller.can_communicate(msg.from, peer.id) {
                    self.metrics.dropped_partition += 1;
                    continue;
                }
                let loss = self
                    .network_controller
                    .get_loss(msg.from, peer.id)
                    .unwrap_or(self.config.loss_rate);
                if loss > 0.0 && self.rng.gen_bool(loss) {
                    self.metrics.dropped_loss += 1;
                    continue;
                }
                let base = self
                    .network_controller
                    .get_latency(msg.from, peer.id)
                    .unwrap_or(self.config.latency_ms);
                let jitter = if self.config.jitter_ms > 0 {
                    self.rng.gen_range(0..=self.config.jitter_ms)
                } else {
                    0
                };
                let latency = base + jitter;
                self.metrics.max_latency_ms = self.metrics.max_latency_ms.max(latency);

                self.seq += 1;
                self.in_transit.push(InTransit {
                    deliver_at_ms: now + latency,
                    seq: self.seq,
                    to,
                    from: msg.from,
                    envelope: msg.envelope.clone(),
                });
            }
        }

        let (mut due, waiting): (Vec<InTransit>, Vec<InTransit>) = std::mem::take(&mut self.in_transit)
            .into_iter()
            .partition(|packet| packet.deliver_at_ms <= now);
        self.in_transit = waiting;
        due.sort_by_key(|packet| (packet.deliver_at_ms, packet.seq));

        for packet in due {
            let Some(peer) = self.peers.get(packet.to) else {
                continue;
            };
            if peer.inbox_tx.send((packet.from, packet.envelope)).await.is_ok() {
                self.metrics.delivered += 1;
            }
        }
    }

    fn step_peer(&mut self, index: usize, now: u64) {
        let resync_every = self.config.sync.resync_interval_ms;
        let Some(peer) = self.peers.get_mut(index) else {
            return;
        };
        let local = peer.local_ms(now);

        while let Some((from, envelope)) = peer.network.try_recv() {
            match GameCommand::from_envelope(&envelope) {
                Ok(command) => {
                    peer.model.advance(local);
                    peer.model.apply(&command, local);
                }
                Err(err) => warn!(peer = index, %from, %err, "dropping malformed envelope"),
            }
        }
        peer.model.advance(local);

        let outcome = peer.engine.tick(local, &peer.model);
        let mut ops = Vec::new();
        if outcome.boundary {
            ops.push(LedgerOp::Leaderboard(outcome.info.round_number));
        }
        if let Some(ticket) = outcome.read {
            ops.push(LedgerOp::Read(ticket));
        }

        if local >= peer.next_resync_ms {
            peer.next_resync_ms = local + resync_every;
            match peer.engine.check_replica(&peer.model, local) {
                Ok(()) => {}
                Err(SyncError::ReplicaDivergence { drift_ms, .. }) => {
                    peer.divergences += 1;
                    peer.max_drift_ms = peer.max_drift_ms.max(drift_ms);
                }
                Err(err) => debug!(peer = index, %err, "cross-check failed"),
            }
        }
        peer.collect_reports();

        for op in ops {
            self.schedule_op(index, op);
        }
    }

    fn schedule_op(&mut self, peer: usize, op: LedgerOp) {
        self.seq += 1;
        self.pending_ops.push(PendingOp {
            due_ms: self.context.unix_millis() + self.config.ledger_latency_ms,
            seq: self.seq,
            peer,
            op,
        });
    }

    async fn run_due_ops(&mut self, now: u64) -> Result<(), SimError> {
        let (mut due, waiting): (Vec<PendingOp>, Vec<PendingOp>) = std::mem::take(&mut self.pending_ops)
            .into_iter()
            .partition(|op| op.due_ms <= now);
        self.pending_ops = waiting;
        due.sort_by_key(|op| (op.due_ms, op.seq));

        for PendingOp { peer: index, op, .. } in due {
            self.metrics.ledger_ops += 1;
            match op {
                LedgerOp::Read(ticket) => {
                    let result = self.ledger.read_all();
                    let peer = &mut self.peers[index];
                    match result {
                        Ok(reactors) => {
                            let outcome = peer.engine.apply_ledger_snapshot(ticket, reactors);
                            debug!(peer = index, ?outcome, "ledger read applied");
                        }
                        Err(err) => {
                            peer.engine.fail_ledger_read(ticket, &err);
                        }
                    }
                }
                LedgerOp::Deploy(ticket) => {
                    let owner = self.peers[index].address.clone();
                    let result = self.ledger.deploy(&owner, ticket.cell, ticket.energy);
                    if let Some(command) = self.peers[index].engine.complete_deploy(ticket, result) {
                        self.broadcast(index, command).await?;
                    }
                }
                LedgerOp::Trigger(ticket) => {
                    let owner = self.peers[index].address.clone();
                    let result = self.ledger.trigger(&owner, &ticket.ids);
                    let commands = self.peers[index].engine.complete_trigger(ticket, result);
                    for command in commands {
                        self.broadcast(index, command).await?;
                    }
                }
                LedgerOp::Leaderboard(round) => {
                    if round == self.peers[index].engine.last_known_round() {
                        match self.leaderboard() {
                            Ok(leaderboard) => {
                                self.broadcast(index, GameCommand::UpdateLeaderboard { leaderboard })
                                    .await?;
                            }
                            Err(err) => debug!(peer = index, round, %err, "leaderboard unavailable"),
                        }
                    }
                }
            }
            self.peers[index].collect_reports();
        }
        Ok(())
    }

    /// Applies a command to the peer's own replica, then publishes it.
    pub async fn broadcast(&mut self, index: usize, command: GameCommand) -> Result<usize, SimError> {
        let now = self.context.unix_millis();
        let peer = self.peers.get_mut(index).ok_or(SimError::UnknownPeer(index))?;
        let local = peer.local_ms(now);

        peer.model.advance(local);
        peer.model.apply(&command, local);
        peer.engine.merge_replica(&peer.model, local);

        let envelope = command.to_envelope(local)?;
        let network = Arc::clone(&peer.network);
        let handed = network.publish(envelope).await?;
        self.metrics.published += 1;
        Ok(handed)
    }

    fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let owners: BTreeSet<Address> = self
            .ledger
            .read_all()?
            .into_iter()
            .map(|reactor| reactor.owner)
            .collect();
        let scores = owners
            .into_iter()
            .filter_map(|owner| self.ledger.score(&owner).ok().map(|score| (owner, score)))
            .collect();
        Ok(rank_scores(scores, self.config.sync.leaderboard_size))
    }

    // ========================================================================
    // PLAYER ACTIONS
    // ========================================================================

    pub fn deploy(&mut self, index: usize, x: u32, y: u32, energy: EnergyLevel) -> Result<Cell, SimError> {
        let now = self.context.unix_millis();
        let peer = self.peers.get_mut(index).ok_or(SimError::UnknownPeer(index))?;
        let local = peer.local_ms(now);
        let ticket = peer
            .engine
            .begin_deploy(x, y, energy, local)
            .map_err(|err| SimError::action(index, err))?;
        let cell = ticket.cell;
        self.schedule_op(index, LedgerOp::Deploy(ticket));
        Ok(cell)
    }

    pub fn toggle_selection(&mut self, index: usize, id: ReactorId) -> Result<ToggleOutcome, SimError> {
        let peer = self.peers.get_mut(index).ok_or(SimError::UnknownPeer(index))?;
        peer.engine
            .toggle_selection(id)
            .map_err(|err| SimError::action(index, err))
    }

    pub fn submit_batch(&mut self, index: usize) -> Result<usize, SimError> {
        let now = self.context.unix_millis();
        let peer = self.peers.get_mut(index).ok_or(SimError::UnknownPeer(index))?;
        let local = peer.local_ms(now);
        let ticket = peer
            .engine
            .begin_trigger(local)
            .map_err(|err| SimError::action(index, err))?;
        let count = ticket.ids.len();
        self.schedule_op(index, LedgerOp::Trigger(ticket));
        Ok(count)
    }

    /// Splits the peers into `peers[..split]` and `peers[split..]`.
    pub fn partition_at(&self, split: usize) {
        let (a, b) = self.peers.split_at(split.min(self.peers.len()));
        let group_a: Vec<PeerId> = a.iter().map(|peer| peer.id).collect();
        let group_b: Vec<PeerId> = b.iter().map(|peer| peer.id).collect();
        self.network_controller.partition(&group_a, &group_b);
    }

    pub fn heal(&self) {
        self.network_controller.heal_all();
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Round and phase by the ledger's (unskewed) clock.
    pub fn round_info(&self) -> RoundInfo {
        self.config.sync.schedule.compute_at_millis(self.context.unix_millis())
    }

    /// The current round's board as the ledger has it.
    pub fn ledger_board(&self) -> Vec<(Cell, ReactorId)> {
        let mut board: Vec<(Cell, ReactorId)> = self
            .ledger
            .round_reactors(self.round_info().round_number)
            .into_iter()
            .map(|reactor| (reactor.cell(), reactor.id))
            .collect();
        board.sort();
        board
    }

    /// True when every peer shows exactly the ledger's board and has
    /// nothing left awaiting confirmation.
    pub fn boards_converged(&self) -> bool {
        let ledger = self.ledger_board();
        self.peers
            .iter()
            .all(|peer| peer.confirmed_board() == ledger && peer.engine.provisional_count() == 0)
    }

    pub fn peer(&self, index: usize) -> Option<&SimPeer> {
        self.peers.get(index)
    }

    /// Returns the current simulation time in seconds since the run began.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64() - self.config.start_offset_secs as f64
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn in_flight_ops(&self) -> usize {
        self.pending_ops.len()
    }

    /// Captures every peer's view for the exporter.
    pub fn frame(&self, events: Vec<SimEvent>) -> SimFrame {
        let unix_ms = self.context.unix_millis();
        let info = self.round_info();
        SimFrame {
            time_sec: self.time(),
            utc: SimFrame::utc_label(unix_ms),
            unix_ms,
            round: info.round_number,
            phase: info.phase,
            ledger_reactors: self.ledger_board().len(),
            peers: self
                .peers
                .iter()
                .map(|peer| PeerFrame {
                    index: peer.index,
                    peer_id: peer.id.as_uuid(),
                    address: peer.address.clone(),
                    clock_skew_ms: peer.clock_skew_ms,
                    replica_round: peer.model.current_round(),
                    replica_phase: peer.model.current_phase(),
                    replica_reactors: peer.model.reactor_count(),
                    displayed: peer.display(ViewFilter::Public),
                    stats: peer.engine.stats().clone(),
                })
                .collect(),
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synqblast_core::Phase;

    fn world(num_peers: usize) -> SimWorld {
        let config = SimConfig {
            seed: 42,
            num_peers,
            ..Default::default()
        };
        let mut world = SimWorld::new(config).unwrap();
        world.spawn_peers();
        world
    }

    #[test]
    fn test_sim_world_creation() {
        let world = world(3);
        assert_eq!(world.peer_count(), 3);
        assert_eq!(world.round_info().round_number, 1);
        assert_eq!(world.round_info().phase, Phase::Deploy);
    }

    #[test]
    fn test_config_validation() {
        assert!(SimConfig::default().validate().is_ok());
        let bad = SimConfig {
            num_peers: 0,
            ..Default::default()
        };
        assert!(matches!(SimWorld::new(bad), Err(SimError::Config(_))));
        let lossy = SimConfig {
            loss_rate: 1.5,
            ..Default::default()
        };
        assert!(lossy.validate().is_err());
    }

    #[test]
    fn test_config_from_json_fills_defaults() {
        let config = SimConfig::from_json(r#"{ "num_peers": 2, "loss_rate": 0.1 }"#).unwrap();
        assert_eq!(config.num_peers, 2);
        assert_eq!(config.tick_ms, 250);
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn test_sim_world_determinism() {
        let a = world(3);
        let b = world(3);
        let addrs_a: Vec<_> = a.peers.iter().map(|p| p.address.clone()).collect();
        let addrs_b: Vec<_> = b.peers.iter().map(|p| p.address.clone()).collect();
        assert_eq!(addrs_a, addrs_b);
    }

    #[test]
    fn test_peer_addresses_come_from_context_keys() {
        let world = world(4);
        for (index, peer) in world.peers.iter().enumerate() {
            let key = world.context.derive_signing_key(index as u64);
            assert_eq!(peer.address, Address::from_signing_key(&key));
            for other in &world.peers[index + 1..] {
                assert_ne!(peer.address, other.address);
            }
        }
    }

    #[tokio::test]
    async fn test_join_reaches_every_replica() {
        let mut world = world(3);
        world.join_all().await.unwrap();
        world.run_until(Duration::from_secs(2)).await.unwrap();

        for peer in &world.peers {
            assert_eq!(peer.model.connected_player_count(), 3);
        }
        assert_eq!(world.metrics.published, 3);
        assert_eq!(world.metrics.delivered, 6);
    }

    #[tokio::test]
    async fn test_deploy_is_confirmed_everywhere() {
        let mut world = world(2);
        world.join_all().await.unwrap();
        let cell = world.deploy(0, 4, 7, EnergyLevel::Ultra).unwrap();

        // Optimistic entry shows immediately
        assert!(world.peers[0].engine.provisional_at(cell).is_some());

        world.run_until(Duration::from_secs(5)).await.unwrap();
        assert!(world.boards_converged());
        assert_eq!(world.ledger_board().len(), 1);
        assert_eq!(world.peers[0].confirmations.len(), 1);
        assert_eq!(world.peers[1].model.reactor_count(), 1);
    }

    #[tokio::test]
    async fn test_partition_blocks_delivery() {
        let mut world = world(2);
        world.partition_at(1);
        world.join_all().await.unwrap();
        world.run_until(Duration::from_secs(1)).await.unwrap();

        assert_eq!(world.metrics.delivered, 0);
        assert_eq!(world.metrics.dropped_partition, 2);
        assert_eq!(world.peers[0].model.connected_player_count(), 1);
    }

    #[test]
    fn test_unknown_peer_action() {
        let mut world = world(1);
        assert!(matches!(
            world.deploy(5, 0, 0, EnergyLevel::Low),
            Err(SimError::UnknownPeer(5))
        ));
    }
}
