//! Scenario runner - executes fault-injection test scenarios.

use crate::error::SimError;
use crate::exporter::{SimEvent, SimExport};
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use serde::{Deserialize, Serialize};
use synqblast_core::{Banner, Cell, EnergyLevel, FailureReason, Phase, ReactorId, ViewFilter};
use tracing::{debug, info, warn};

/// Pass, or the reason the scenario failed its assertions.
type Verdict = Result<(), String>;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Reactors ever written to the ledger
    pub final_reactor_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    pub envelopes_published: u64,
    pub envelopes_delivered: u64,
    pub envelopes_dropped: u64,
    pub ledger_reads: u64,
    pub ledger_writes: u64,
    pub stale_reads: u64,
    pub stale_writes: u64,
    pub boundaries: u64,
    pub anomalies: u64,
    pub confirmations: u64,
    pub deploy_failures: u64,
    pub max_drift_ms: u64,
}

impl ScenarioMetrics {
    fn collect(world: &SimWorld) -> Self {
        let ledger = world.ledger.stats();
        let mut metrics = ScenarioMetrics {
            envelopes_published: world.metrics.published,
            envelopes_delivered: world.metrics.delivered,
            envelopes_dropped: world.metrics.dropped_partition + world.metrics.dropped_loss,
            ledger_reads: ledger.reads,
            ledger_writes: ledger.writes,
            ..Default::default()
        };
        for peer in &world.peers {
            let stats = peer.engine.stats();
            metrics.stale_reads += stats.stale_reads;
            metrics.stale_writes += stats.stale_writes;
            metrics.boundaries += stats.boundaries;
            metrics.anomalies += stats.anomalies;
            metrics.confirmations += stats.confirmations;
            metrics.deploy_failures += peer.failures.len() as u64;
            metrics.max_drift_ms = metrics.max_drift_ms.max(peer.max_drift_ms);
        }
        metrics
    }
}

/// Collects export frames while a scenario runs.
struct Recorder {
    export: Option<SimExport>,
    every_ticks: u64,
    events: Vec<SimEvent>,
}

impl Recorder {
    fn new(export: Option<SimExport>, every_ticks: u64) -> Self {
        Self {
            export,
            every_ticks: every_ticks.max(1),
            events: Vec::new(),
        }
    }

    fn note(&mut self, event: SimEvent) {
        debug!(message = %event.message, "scenario event");
        if self.export.is_some() {
            self.events.push(event);
        }
    }

    fn capture(&mut self, world: &SimWorld) {
        if let Some(export) = self.export.as_mut() {
            if world.tick_count() % self.every_ticks == 0 || !self.events.is_empty() {
                export.add_frame(world.frame(std::mem::take(&mut self.events)));
            }
        }
    }
}

/// Steps until `offset_secs` after UTC midnight.
async fn advance_to(world: &mut SimWorld, rec: &mut Recorder, offset_secs: f64) -> Result<(), SimError> {
    let target_ms = (offset_secs * 1000.0) as u64;
    while world.context.offset_ms() < target_ms {
        world.step().await?;
        rec.capture(world);
    }
    Ok(())
}

/// Steps until `done` holds or the deadline passes. Returns whether it held.
async fn wait_for<F>(world: &mut SimWorld, rec: &mut Recorder, deadline_secs: f64, done: F) -> Result<bool, SimError>
where
    F: Fn(&SimWorld) -> bool,
{
    let deadline_ms = (deadline_secs * 1000.0) as u64;
    loop {
        if done(world) {
            return Ok(true);
        }
        if world.context.offset_ms() >= deadline_ms {
            return Ok(false);
        }
        world.step().await?;
        rec.capture(world);
    }
}

fn now_secs(world: &SimWorld) -> f64 {
    world.context.offset_ms() as f64 / 1000.0
}

/// A distinct cell per peer index.
fn spread(index: usize, board_size: u8) -> (u32, u32) {
    let size = usize::from(board_size).max(1);
    ((index % size) as u32, (index / size) as u32)
}

fn owned_ids(world: &SimWorld, index: usize) -> Vec<ReactorId> {
    let peer = &world.peers[index];
    peer.engine
        .confirmed_reactors()
        .filter(|reactor| reactor.owner == peer.address)
        .map(|reactor| reactor.id)
        .collect()
}

fn deploy_all(world: &mut SimWorld, rec: &mut Recorder) -> Result<(), SimError> {
    let size = world.config.sync.board_size;
    for index in 0..world.peer_count() {
        let (x, y) = spread(index, size);
        world.deploy(index, x, y, EnergyLevel::ALL[index % EnergyLevel::ALL.len()])?;
    }
    rec.note(SimEvent::info(format!("{} deploys submitted", world.peer_count())));
    Ok(())
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Number of peers
    num_peers: usize,

    /// Settle window override in seconds
    max_duration_secs: Option<f64>,

    /// Starting point for every scenario's config
    base: SimConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_peers: usize) -> Self {
        Self {
            seed,
            num_peers,
            max_duration_secs: None,
            base: SimConfig::default(),
        }
    }

    /// Sets how long scenarios wait for convergence.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = Some(secs);
        self
    }

    /// Uses `config` as the base; seed and peer count still come from the runner.
    pub fn with_config(mut self, config: SimConfig) -> Self {
        self.base = config;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, None).0
    }

    /// Runs a scenario, sampling a frame every `every_ticks` ticks.
    pub fn run_with_export(&self, scenario: ScenarioId, every_ticks: u64) -> (ScenarioResult, SimExport) {
        let (result, export) = self.execute(scenario, Some(every_ticks));
        let export = export.unwrap_or_else(|| SimExport::new(scenario.name(), self.seed));
        (result, export)
    }

    /// The config a scenario runs with.
    pub fn config_for(&self, scenario: ScenarioId) -> SimConfig {
        let mut config = self.base.clone();
        config.seed = self.seed;
        config.num_peers = self.num_peers;
        if let Some(secs) = self.max_duration_secs {
            config.max_duration_secs = secs;
        }

        match scenario {
            ScenarioId::SplitBrain => {
                config.num_peers = config.num_peers.max(2);
            }
            ScenarioId::StaleRead => {
                config.ledger_latency_ms = 3_000;
                config.start_offset_secs = 285;
                config.max_clock_skew_ms = 0;
            }
            ScenarioId::LossyChannel => {
                config.loss_rate = 0.3;
                config.jitter_ms = 200;
            }
            _ => {}
        }
        config
    }

    fn execute(&self, scenario: ScenarioId, export_every: Option<u64>) -> (ScenarioResult, Option<SimExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let runtime = match tokio::runtime::Builder::new_current_thread().build() {
            Ok(runtime) => runtime,
            Err(err) => return (self.aborted(scenario, SimError::Runtime(err)), None),
        };
        runtime.block_on(self.execute_async(scenario, export_every))
    }

    async fn execute_async(
        &self,
        scenario: ScenarioId,
        export_every: Option<u64>,
    ) -> (ScenarioResult, Option<SimExport>) {
        let mut world = match SimWorld::new(self.config_for(scenario)) {
            Ok(world) => world,
            Err(err) => return (self.aborted(scenario, err), None),
        };
        world.spawn_peers();

        let export = export_every.map(|_| SimExport::new(scenario.name(), self.seed));
        let mut rec = Recorder::new(export, export_every.unwrap_or(1));

        let outcome = self.drive(scenario, &mut world, &mut rec).await;
        let (passed, failure_reason) = match outcome {
            Ok(Ok(())) => (true, None),
            Ok(Err(reason)) => (false, Some(reason)),
            Err(err) => (false, Some(err.to_string())),
        };
        if let Some(reason) = &failure_reason {
            warn!(scenario = scenario.name(), %reason, "scenario failed");
        }

        let mut export = rec.export.take();
        if let Some(export) = export.as_mut() {
            export.add_frame(world.frame(std::mem::take(&mut rec.events)));
            export.finalize(passed, failure_reason.clone());
        }

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: world.tick_count(),
            final_time_secs: world.time(),
            final_reactor_count: world.ledger.reactor_count(),
            failure_reason,
            metrics: ScenarioMetrics::collect(&world),
        };
        (result, export)
    }

    fn aborted(&self, scenario: ScenarioId, err: SimError) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            final_reactor_count: 0,
            failure_reason: Some(err.to_string()),
            metrics: ScenarioMetrics::default(),
        }
    }

    async fn drive(&self, scenario: ScenarioId, world: &mut SimWorld, rec: &mut Recorder) -> Result<Verdict, SimError> {
        world.join_all().await?;
        match scenario {
            ScenarioId::ReplicaConvergence => self.run_replica_convergence(world, rec).await,
            ScenarioId::RoundBoundary => self.run_round_boundary(world, rec).await,
            ScenarioId::OptimisticTimeout => self.run_optimistic_timeout(world, rec).await,
            ScenarioId::LedgerOutage => self.run_ledger_outage(world, rec).await,
            ScenarioId::SplitBrain => self.run_split_brain(world, rec).await,
            ScenarioId::StaleRead => self.run_stale_read(world, rec).await,
            ScenarioId::BatchTrigger => self.run_batch_trigger(world, rec).await,
            ScenarioId::LossyChannel => self.run_lossy_channel(world, rec).await,
        }
    }

    /// SYN-001: ReplicaConvergence.
    ///
    /// **Assertion**: every replica holds every deploy, every board equals
    /// the ledger, and no replica drifted from the phase clock.
    async fn run_replica_convergence(&self, world: &mut SimWorld, rec: &mut Recorder) -> Result<Verdict, SimError> {
        info!("SYN-001: ReplicaConvergence");
        let n = world.peer_count();
        advance_to(world, rec, 2.0).await?;
        deploy_all(world, rec)?;

        let deadline = (2.0 + world.config.max_duration_secs).min(115.0);
        let converged = wait_for(world, rec, deadline, |w| {
            w.boards_converged()
                && w.ledger_board().len() == n
                && w.peers.iter().all(|peer| peer.model.reactor_count() == n)
        })
        .await?;
        if !converged {
            return Ok(Err(format!("peers did not converge on {} reactors by {:.0}s", n, deadline)));
        }

        for peer in &world.peers {
            if peer.model.connected_player_count() != n {
                return Ok(Err(format!(
                    "peer {} sees {} players, expected {}",
                    peer.index,
                    peer.model.connected_player_count(),
                    n
                )));
            }
            if peer.confirmations.len() != 1 {
                return Ok(Err(format!(
                    "peer {} reported {} confirmations",
                    peer.index,
                    peer.confirmations.len()
                )));
            }
            if peer.divergences > 0 {
                return Ok(Err(format!("peer {} replica drifted {}ms", peer.index, peer.max_drift_ms)));
            }
        }
        Ok(Ok(()))
    }

    /// SYN-002: RoundBoundary.
    ///
    /// **Assertion**: after the boundary every board, selection and marker
    /// of the old round is gone, while the ledger keeps its history.
    async fn run_round_boundary(&self, world: &mut SimWorld, rec: &mut Recorder) -> Result<Verdict, SimError> {
        info!("SYN-002: RoundBoundary");
        let n = world.peer_count();
        advance_to(world, rec, 2.0).await?;
        deploy_all(world, rec)?;

        let deadline = (2.0 + world.config.max_duration_secs).min(115.0);
        if !wait_for(world, rec, deadline, |w| w.boards_converged() && w.ledger_board().len() == n).await? {
            return Ok(Err("boards never converged before the boundary".to_string()));
        }

        // Leave something selected so the purge has to clear it
        if let Some(id) = owned_ids(world, 0).first().copied() {
            world.toggle_selection(0, id)?;
        }

        let round_secs = f64::from(world.config.sync.schedule.round_duration_secs());
        advance_to(world, rec, round_secs + 3.0).await?;
        rec.note(SimEvent::info("crossed into round 2"));

        for peer in &world.peers {
            let shown = peer.display(ViewFilter::Public);
            if shown.round != 2 || shown.phase != Phase::Deploy {
                return Ok(Err(format!(
                    "peer {} shows round {} {}",
                    peer.index, shown.round, shown.phase
                )));
            }
            if !shown.reactors.is_empty() || !shown.provisional.is_empty() {
                return Ok(Err(format!(
                    "peer {} still shows {} reactors from the old round",
                    peer.index,
                    shown.reactors.len() + shown.provisional.len()
                )));
            }
            if !shown.selection.is_empty() || !shown.triggered.is_empty() {
                return Ok(Err(format!("peer {} kept selection or triggers", peer.index)));
            }
            if peer.engine.stats().boundaries != 1 {
                return Ok(Err(format!(
                    "peer {} saw {} boundaries",
                    peer.index,
                    peer.engine.stats().boundaries
                )));
            }
            if peer.model.current_round() != 2 || peer.model.reactor_count() != 0 {
                return Ok(Err(format!("peer {} replica not reset", peer.index)));
            }
            if peer.engine.markers().get(&peer.address, 1).is_some() {
                return Ok(Err(format!("peer {} kept round 1 markers", peer.index)));
            }
        }

        if world.ledger.reactor_count() != n {
            return Ok(Err("ledger lost history".to_string()));
        }
        Ok(Ok(()))
    }

    /// SYN-003: OptimisticTimeout.
    ///
    /// **Assertion**: the local entry is evicted and reported as timed out;
    /// replica copies elsewhere expire silently.
    async fn run_optimistic_timeout(&self, world: &mut SimWorld, rec: &mut Recorder) -> Result<Verdict, SimError> {
        info!("SYN-003: OptimisticTimeout");
        world.ledger.set_black_hole(true);
        rec.note(SimEvent::warn("ledger swallowing writes"));

        advance_to(world, rec, 2.0).await?;
        let cell = world.deploy(0, 3, 3, EnergyLevel::High)?;

        let timeout_secs = world.config.sync.confirmation_timeout_ms as f64 / 1000.0;
        advance_to(world, rec, 2.0 + timeout_secs + 3.0).await?;

        let owner = &world.peers[0];
        let timed_out = owner
            .failures
            .iter()
            .any(|failure| failure.cell == cell && matches!(failure.reason, FailureReason::TimedOut { .. }));
        if !timed_out {
            return Ok(Err(format!("no timeout reported for {}", cell)));
        }
        if !owner.confirmed_board().is_empty() {
            return Ok(Err("swallowed deploy appeared on the board".to_string()));
        }

        for peer in &world.peers {
            if peer.engine.provisional_count() != 0 {
                return Ok(Err(format!("peer {} still shows a provisional entry", peer.index)));
            }
            if peer.index > 0 && peer.engine.stats().expired_remote == 0 {
                return Ok(Err(format!("peer {} never saw the replica entry", peer.index)));
            }
        }
        Ok(Ok(()))
    }

    /// SYN-004: LedgerOutage.
    ///
    /// **Assertion**: during the outage boards keep their last good state
    /// under a banner; after it the banner clears and boards converge.
    async fn run_ledger_outage(&self, world: &mut SimWorld, rec: &mut Recorder) -> Result<Verdict, SimError> {
        info!("SYN-004: LedgerOutage");
        let n = world.peer_count();
        advance_to(world, rec, 2.0).await?;
        deploy_all(world, rec)?;

        let deadline = (2.0 + world.config.max_duration_secs).min(90.0);
        if !wait_for(world, rec, deadline, |w| w.boards_converged() && w.ledger_board().len() == n).await? {
            return Ok(Err("boards never converged before the outage".to_string()));
        }
        let before: Vec<Vec<(Cell, ReactorId)>> = world.peers.iter().map(|peer| peer.confirmed_board()).collect();

        world.ledger.set_available(false);
        rec.note(SimEvent::warn("ledger down"));
        let outage_start = now_secs(world);
        advance_to(world, rec, outage_start + 5.0).await?;

        for (peer, board) in world.peers.iter().zip(&before) {
            if !matches!(peer.engine.banner(), Some(Banner::LedgerUnavailable(_))) {
                return Ok(Err(format!("peer {} shows no outage banner", peer.index)));
            }
            if peer.confirmed_board() != *board {
                return Ok(Err(format!("peer {} lost its last good board", peer.index)));
            }
        }

        advance_to(world, rec, outage_start + 10.0).await?;
        world.ledger.set_available(true);
        rec.note(SimEvent::info("ledger restored"));

        let deadline = (now_secs(world) + world.config.max_duration_secs).min(115.0);
        let recovered = wait_for(world, rec, deadline, |w| {
            w.boards_converged() && w.peers.iter().all(|peer| peer.engine.banner().is_none())
        })
        .await?;
        if !recovered {
            return Ok(Err("banner or boards did not recover".to_string()));
        }
        Ok(Ok(()))
    }

    /// SYN-005: SplitBrain.
    ///
    /// **Assertion**: while the channel is split, replicas only know their
    /// own half but every board still equals the ledger; after healing, new
    /// deploys reach every replica.
    async fn run_split_brain(&self, world: &mut SimWorld, rec: &mut Recorder) -> Result<Verdict, SimError> {
        info!("SYN-005: SplitBrain");
        let n = world.peer_count();
        let half = n / 2;
        world.partition_at(half);
        rec.note(SimEvent::warn(format!("partition {} | {}", half, n - half)));

        advance_to(world, rec, 3.0).await?;
        deploy_all(world, rec)?;
        advance_to(world, rec, 15.0).await?;

        if !world.boards_converged() {
            return Ok(Err("boards diverged during the partition".to_string()));
        }
        let first = world.peers[0].model.reactor_count();
        let last = world.peers[n - 1].model.reactor_count();
        if first != half || last != n - half {
            return Ok(Err(format!(
                "partition leaked: replicas hold {} and {} reactors",
                first, last
            )));
        }

        world.heal();
        rec.note(SimEvent::info("partition healed"));
        advance_to(world, rec, 20.0).await?;

        let size = world.config.sync.board_size;
        if n >= usize::from(size).pow(2) {
            return Ok(Ok(()));
        }
        let (x, y) = spread(n, size);
        let cell = world.deploy(0, x, y, EnergyLevel::Low)?;

        let deadline = (20.0 + world.config.max_duration_secs).min(115.0);
        let healed = wait_for(world, rec, deadline, |w| {
            w.boards_converged() && w.peers.iter().all(|peer| peer.model.reactor_at(cell).is_some())
        })
        .await?;
        if !healed {
            return Ok(Err("post-heal deploy did not reach every replica".to_string()));
        }
        Ok(Ok(()))
    }

    /// SYN-006: StaleRead.
    ///
    /// **Assertion**: reads issued in round 1 that complete in round 2 are
    /// counted stale and never repopulate the purged board.
    async fn run_stale_read(&self, world: &mut SimWorld, rec: &mut Recorder) -> Result<Verdict, SimError> {
        info!("SYN-006: StaleRead");
        let n = world.peer_count();
        let size = world.config.sync.board_size;
        let owners: Vec<_> = world.peers.iter().map(|peer| peer.address.clone()).collect();
        for (index, owner) in owners.iter().enumerate() {
            let (x, y) = spread(index, size);
            world.ledger.seed_reactor(owner, Cell::new(x as u8, y as u8), EnergyLevel::Medium, 1);
        }
        rec.note(SimEvent::info(format!("{} round 1 reactors seeded", n)));

        advance_to(world, rec, 297.0).await?;
        for peer in &world.peers {
            if peer.confirmed_board().len() != n {
                return Ok(Err(format!(
                    "peer {} shows {} of {} reactors before the boundary",
                    peer.index,
                    peer.confirmed_board().len(),
                    n
                )));
            }
        }

        advance_to(world, rec, 310.0).await?;
        for peer in &world.peers {
            let stats = peer.engine.stats();
            if stats.stale_reads == 0 {
                return Ok(Err(format!("peer {} never dropped a stale read", peer.index)));
            }
            let shown = peer.display(ViewFilter::Public);
            if shown.round != 2 || !shown.reactors.is_empty() {
                return Ok(Err(format!(
                    "peer {} shows {} reactors in round {}",
                    peer.index,
                    shown.reactors.len(),
                    shown.round
                )));
            }
        }
        Ok(Ok(()))
    }

    /// SYN-007: BatchTrigger.
    ///
    /// **Assertion**: one write triggers the whole selection, the owner is
    /// credited the summed energy, the selection clears, and every replica
    /// marks the cells triggered.
    async fn run_batch_trigger(&self, world: &mut SimWorld, rec: &mut Recorder) -> Result<Verdict, SimError> {
        info!("SYN-007: BatchTrigger");
        let plan = [
            (0, 0, EnergyLevel::Low),
            (1, 0, EnergyLevel::High),
            (2, 0, EnergyLevel::Ultra),
        ];
        let expected_score: u64 = plan.iter().map(|(_, _, energy)| u64::from(energy.value())).sum();

        advance_to(world, rec, 2.0).await?;
        let mut cells = Vec::with_capacity(plan.len());
        for (x, y, energy) in plan {
            cells.push(world.deploy(0, x, y, energy)?);
        }

        let deadline = (2.0 + world.config.max_duration_secs).min(115.0);
        if !wait_for(world, rec, deadline, |w| owned_ids(w, 0).len() == plan.len()).await? {
            return Ok(Err("deploys never confirmed".to_string()));
        }

        let trigger_opens = world.config.sync.schedule.phase_offset_ms(Phase::Trigger) as f64 / 1000.0;
        advance_to(world, rec, trigger_opens + 5.0).await?;

        for id in owned_ids(world, 0) {
            world.toggle_selection(0, id)?;
        }
        let count = world.submit_batch(0)?;
        rec.note(SimEvent::info(format!("batch of {} submitted", count)));

        let owner = world.peers[0].address.clone();
        let deadline = (now_secs(world) + world.config.max_duration_secs)
            .min(trigger_opens + f64::from(world.config.sync.schedule.trigger_secs));
        let settled = wait_for(world, rec, deadline, |w| {
            w.ledger.score(&owner).ok() == Some(expected_score)
                && w.peers[0].engine.selection().is_empty()
                && w.boards_converged()
                && w.peers.iter().all(|peer| {
                    cells
                        .iter()
                        .all(|cell| peer.model.reactor_at(*cell).is_some_and(|record| record.triggered))
                })
        })
        .await?;
        if !settled {
            return Ok(Err(format!(
                "trigger did not settle: score {:?}, expected {}",
                world.ledger.score(&owner).ok(),
                expected_score
            )));
        }
        Ok(Ok(()))
    }

    /// SYN-008: LossyChannel.
    ///
    /// **Assertion**: with a third of deliveries lost, ledger reads alone
    /// bring every board to the ledger's state.
    async fn run_lossy_channel(&self, world: &mut SimWorld, rec: &mut Recorder) -> Result<Verdict, SimError> {
        info!("SYN-008: LossyChannel");
        let n = world.peer_count();
        advance_to(world, rec, 2.0).await?;
        deploy_all(world, rec)?;

        let deadline = (2.0 + world.config.max_duration_secs).min(115.0);
        if !wait_for(world, rec, deadline, |w| w.boards_converged() && w.ledger_board().len() == n).await? {
            return Ok(Err("boards did not converge under loss".to_string()));
        }
        debug!(
            dropped = world.metrics.dropped_loss,
            delivered = world.metrics.delivered,
            "lossy channel converged"
        );
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_for_overrides() {
        let runner = ScenarioRunner::new(9, 1).with_duration(12.0);

        let split = runner.config_for(ScenarioId::SplitBrain);
        assert_eq!(split.num_peers, 2);
        assert_eq!(split.seed, 9);
        assert_eq!(split.max_duration_secs, 12.0);

        let stale = runner.config_for(ScenarioId::StaleRead);
        assert_eq!(stale.start_offset_secs, 285);
        assert_eq!(stale.ledger_latency_ms, 3_000);

        let lossy = runner.config_for(ScenarioId::LossyChannel);
        assert_eq!(lossy.loss_rate, 0.3);
    }

    #[test]
    fn test_invalid_config_aborts() {
        let config = SimConfig {
            tick_ms: 0,
            ..Default::default()
        };
        let result = ScenarioRunner::new(1, 2)
            .with_config(config)
            .run(ScenarioId::ReplicaConvergence);
        assert!(!result.passed);
        assert_eq!(result.total_ticks, 0);
        assert!(result.failure_reason.unwrap().contains("tick_ms"));
    }

    #[test]
    fn test_spread_is_distinct() {
        let cells: std::collections::BTreeSet<_> = (0..60).map(|i| spread(i, 20)).collect();
        assert_eq!(cells.len(), 60);
        assert_eq!(spread(21, 20), (1, 1));
    }

    #[test]
    fn test_export_samples_frames() {
        let runner = ScenarioRunner::new(3, 2).with_duration(10.0);
        let (result, export) = runner.run_with_export(ScenarioId::ReplicaConvergence, 4);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(!export.frames.is_empty());
        assert!(export.passed);
        assert_eq!(export.frames[0].peers.len(), 2);
    }
}
