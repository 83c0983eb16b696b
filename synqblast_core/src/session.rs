//! Game Session - drives one replica and one reconciliation engine from the
//! environment context.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        GameSession                          │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │              Context: SynqContext                    │   │
//! │  │  • unix_millis() → phase clock input                 │   │
//! │  │  • sleep() → tick / cross-check / transition timers  │   │
//! │  │  • spawn() → ledger calls                            │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                              │                              │
//! │   pub/sub ──► ┌─────────┐  events  ┌───────────────┐        │
//! │               │ REPLICA │ ───────► │   RECONCILE   │ ──► UI │
//! │   intents ──► └─────────┘          └───────────────┘        │
//! │                                          ▲                  │
//! │   ledger completions ────────────────────┘                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on one task. Ledger calls are spawned and report back
//! through a channel, tagged with the ticket that requested them, so a
//! round boundary processed in the meantime invalidates them.
//!
//! # Usage
//!
//! ```ignore
//! let (mut session, handle) = GameSession::new(ctx, net, ledger, SyncConfig::default(), address)?;
//! tokio::spawn(async move { session.run().await });
//!
//! handle.intents.send(UserIntent::Deploy { x: 5, y: 5, energy: EnergyLevel::High }).await?;
//! let board = handle.display.borrow().clone();
//! ```

use crate::config::SyncConfig;
use crate::error::{ActionError, SyncError};
use crate::events::GameCommand;
use crate::game_model::GameModel;
use crate::identity::Address;
use crate::ledger::{build_leaderboard, EnergyLevel, LeaderboardEntry, Ledger, LedgerError, Reactor, ReactorId, TxHash};
use crate::reconcile::{
    DeployConfirmation, DeployFailure, DeployTicket, DisplayedState, ReadTicket, ReconciliationEngine, TriggerTicket,
    ViewFilter,
};
use std::sync::Arc;
use std::time::Duration;
use synqblast_env::{EventEnvelope, PeerId, PubSubTransport, SynqContext};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Input from the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    ToggleSelection(ReactorId),
    Deploy { x: u32, y: u32, energy: EnergyLevel },
    SubmitBatch,
    SetView(ViewFilter),
    /// Ask for a ledger scan on the next tick
    Refresh,
}

/// One-off events for the UI (toasts, sounds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    RoundStarted { round: u32 },
    DeployConfirmed(DeployConfirmation),
    DeployFailed(DeployFailure),
    TriggerAccepted { count: usize },
    ReplicaDiverged { drift_ms: u64 },
    ActionRejected(ActionError),
}

enum LedgerCompletion {
    Read(ReadTicket, Result<Vec<Reactor>, LedgerError>),
    Deploy(DeployTicket, Result<TxHash, LedgerError>),
    Trigger(TriggerTicket, Result<TxHash, LedgerError>),
    Leaderboard(u32, Result<Vec<LeaderboardEntry>, LedgerError>),
}

/// The UI's side of a session.
pub struct SessionHandle {
    pub intents: mpsc::Sender<UserIntent>,
    pub display: watch::Receiver<DisplayedState>,
    pub notices: mpsc::Receiver<SessionNotice>,
    shutdown: watch::Sender<bool>,
}

impl SessionHandle {
    /// Stops the session loop after its current handler.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// A connected client.
///
/// Generic over the context, transport and ledger so the same loop runs
/// in production or inside the simulation harness.
pub struct GameSession<Ctx, Net, Led>
where
    Ctx: SynqContext,
    Net: PubSubTransport,
    Led: Ledger,
{
    pub peer_id: PeerId,
    context: Arc<Ctx>,
    network: Arc<Net>,
    ledger: Arc<Led>,
    config: SyncConfig,

    model: GameModel,
    engine: ReconciliationEngine,
    view: ViewFilter,

    intents_rx: mpsc::Receiver<UserIntent>,
    completions_tx: mpsc::Sender<LedgerCompletion>,
    completions_rx: mpsc::Receiver<LedgerCompletion>,
    display_tx: watch::Sender<DisplayedState>,
    notices_tx: mpsc::Sender<SessionNotice>,
    shutdown_rx: watch::Receiver<bool>,

    tick_count: u64,
}

impl<Ctx, Net, Led> GameSession<Ctx, Net, Led>
where
    Ctx: SynqContext,
    Net: PubSubTransport,
    Led: Ledger,
{
    /// Creates a session whose replica starts aligned with the phase clock.
    pub fn new(
        context: Arc<Ctx>,
        network: Arc<Net>,
        ledger: Arc<Led>,
        config: SyncConfig,
        local: Address,
    ) -> Result<(Self, SessionHandle), SyncError> {
        config.validate()?;

        let now_ms = context.unix_millis();
        let info = config.schedule.compute_at_millis(now_ms);
        let model = GameModel::aligned(&config, &info, now_ms);
        let engine = ReconciliationEngine::new(config.clone(), local, now_ms);
        let view = ViewFilter::default();

        let (intents_tx, intents_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (completions_tx, completions_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (display_tx, display_rx) = watch::channel(engine.display(view));
        let (notices_tx, notices_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let session = Self {
            peer_id: network.local_id(),
            context,
            network,
            ledger,
            config,
            model,
            engine,
            view,
            intents_rx,
            completions_tx,
            completions_rx,
            display_tx,
            notices_tx,
            shutdown_rx,
            tick_count: 0,
        };
        let handle = SessionHandle {
            intents: intents_tx,
            display: display_rx,
            notices: notices_rx,
            shutdown: shutdown_tx,
        };
        Ok((session, handle))
    }

    pub fn model(&self) -> &GameModel {
        &self.model
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Runs until shutdown, until the UI drops its handle, or until the
    /// pub/sub channel closes.
    pub async fn run(&mut self) {
        info!(
            peer = %self.peer_id,
            player = %self.engine.local(),
            round = self.model.current_round(),
            phase = %self.model.current_phase(),
            "session starting"
        );
        let joined = GameCommand::PlayerJoined {
            player_id: self.engine.local().clone(),
        };
        if let Err(err) = self.broadcast(joined).await {
            warn!(%err, "failed to announce join");
        }

        let tick_every = self.config.tick_interval();
        let resync_every = self.config.resync_interval();
        let mut next_tick = self.context.now();
        let mut next_resync = next_tick + resync_every;

        loop {
            let now = self.context.now();
            let until_transition = Duration::from_millis(
                self.model
                    .next_transition_ms()
                    .saturating_sub(self.context.unix_millis()),
            );
            let wait = next_tick
                .min(next_resync)
                .saturating_sub(now)
                .min(until_transition);

            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                Some(completion) = self.completions_rx.recv() => {
                    self.handle_completion(completion).await;
                }
                inbound = self.network.recv() => match inbound {
                    Some((from, envelope)) => self.handle_inbound(from, &envelope),
                    None => {
                        warn!("pub/sub channel closed");
                        break;
                    }
                },
                intent = self.intents_rx.recv() => match intent {
                    Some(intent) => self.handle_intent(intent),
                    None => break,
                },
                _ = self.context.sleep(wait) => {
                    let now = self.context.now();
                    self.model.advance(self.context.unix_millis());
                    if now >= next_tick {
                        self.on_tick();
                        while next_tick <= now {
                            next_tick += tick_every;
                        }
                    }
                    if now >= next_resync {
                        self.on_resync();
                        while next_resync <= now {
                            next_resync += resync_every;
                        }
                    }
                }
            }

            self.forward_reports();
            self.publish_display();
        }

        let left = GameCommand::PlayerLeft {
            player_id: self.engine.local().clone(),
        };
        if let Err(err) = self.broadcast(left).await {
            debug!(%err, "failed to announce leave");
        }
        info!(ticks = self.tick_count, "session stopped");
    }

    fn on_tick(&mut self) {
        self.tick_count += 1;
        let outcome = self.engine.tick(self.context.unix_millis(), &self.model);

        if outcome.boundary {
            let round = outcome.info.round_number;
            self.notify(SessionNotice::RoundStarted { round });
            self.spawn_leaderboard(round);
        }
        if let Some(ticket) = outcome.read {
            self.spawn_read(ticket);
        }
    }

    fn on_resync(&mut self) {
        match self.engine.check_replica(&self.model, self.context.unix_millis()) {
            Ok(()) => {}
            Err(SyncError::ReplicaDivergence { drift_ms, .. }) => {
                self.notify(SessionNotice::ReplicaDiverged { drift_ms });
            }
            Err(err) => debug!(%err, "cross-check failed"),
        }
    }

    fn handle_inbound(&mut self, from: PeerId, envelope: &EventEnvelope) {
        match GameCommand::from_envelope(envelope) {
            Ok(command) => {
                let now_ms = self.context.unix_millis();
                debug!(%from, kind = command.kind(), "inbound command");
                self.model.advance(now_ms);
                self.model.apply(&command, now_ms);
                self.engine.merge_replica(&self.model, now_ms);
            }
            Err(err) => warn!(%from, %err, "dropping malformed envelope"),
        }
    }

    fn handle_intent(&mut self, intent: UserIntent) {
        let now_ms = self.context.unix_millis();
        let result = match intent {
            UserIntent::ToggleSelection(id) => self.engine.toggle_selection(id).map(|outcome| {
                debug!(id, ?outcome, "selection toggled");
            }),
            UserIntent::Deploy { x, y, energy } => match self.engine.begin_deploy(x, y, energy, now_ms) {
                Ok(ticket) => {
                    self.spawn_deploy(ticket);
                    Ok(())
                }
                Err(err) => Err(err),
            },
            UserIntent::SubmitBatch => match self.engine.begin_trigger(now_ms) {
                Ok(ticket) => {
                    self.spawn_trigger(ticket);
                    Ok(())
                }
                Err(err) => Err(err),
            },
            UserIntent::SetView(view) => {
                self.view = view;
                Ok(())
            }
            UserIntent::Refresh => {
                self.engine.request_refresh();
                Ok(())
            }
        };

        if let Err(err) = result {
            debug!(%err, "intent rejected");
            self.notify(SessionNotice::ActionRejected(err));
        }
    }

    async fn handle_completion(&mut self, completion: LedgerCompletion) {
        match completion {
            LedgerCompletion::Read(ticket, Ok(reactors)) => {
                let outcome = self.engine.apply_ledger_snapshot(ticket, reactors);
                debug!(?outcome, "ledger read applied");
            }
            LedgerCompletion::Read(ticket, Err(err)) => {
                self.engine.fail_ledger_read(ticket, &err);
            }
            LedgerCompletion::Deploy(ticket, result) => {
                if let Some(command) = self.engine.complete_deploy(ticket, result) {
                    if let Err(err) = self.broadcast(command).await {
                        warn!(%err, "failed to publish deploy");
                    }
                }
            }
            LedgerCompletion::Trigger(ticket, result) => {
                let count = ticket.ids.len();
                let accepted = result.is_ok() && ticket.round() == self.engine.last_known_round();
                let commands = self.engine.complete_trigger(ticket, result);
                if accepted {
                    self.notify(SessionNotice::TriggerAccepted { count });
                }
                for command in commands {
                    if let Err(err) = self.broadcast(command).await {
                        warn!(%err, "failed to publish trigger");
                    }
                }
            }
            LedgerCompletion::Leaderboard(round, Ok(leaderboard)) => {
                if round == self.engine.last_known_round() {
                    let command = GameCommand::UpdateLeaderboard { leaderboard };
                    if let Err(err) = self.broadcast(command).await {
                        warn!(%err, "failed to publish leaderboard");
                    }
                }
            }
            LedgerCompletion::Leaderboard(round, Err(err)) => {
                debug!(round, %err, "leaderboard unavailable");
            }
        }
    }

    /// Applies a command to the local replica, then publishes it.
    async fn broadcast(&mut self, command: GameCommand) -> Result<usize, SyncError> {
        let now_ms = self.context.unix_millis();
        self.model.advance(now_ms);
        self.model.apply(&command, now_ms);
        self.engine.merge_replica(&self.model, now_ms);

        let envelope = command.to_envelope(now_ms)?;
        let delivered = self.network.publish(envelope).await?;
        debug!(kind = command.kind(), delivered, "published");
        Ok(delivered)
    }

    fn spawn_read(&self, ticket: ReadTicket) {
        let ledger = Arc::clone(&self.ledger);
        let tx = self.completions_tx.clone();
        self.context.spawn("ledger-read", async move {
            let result = ledger.all_reactors().await;
            let _ = tx.send(LedgerCompletion::Read(ticket, result)).await;
        });
    }

    fn spawn_deploy(&self, ticket: DeployTicket) {
        let ledger = Arc::clone(&self.ledger);
        let tx = self.completions_tx.clone();
        let owner = self.engine.local().clone();
        self.context.spawn("ledger-deploy", async move {
            let result = ledger
                .deploy_reactor(&owner, ticket.cell, ticket.energy.reactor_type(), ticket.energy)
                .await;
            let _ = tx.send(LedgerCompletion::Deploy(ticket, result)).await;
        });
    }

    fn spawn_trigger(&self, ticket: TriggerTicket) {
        let ledger = Arc::clone(&self.ledger);
        let tx = self.completions_tx.clone();
        let owner = self.engine.local().clone();
        self.context.spawn("ledger-trigger", async move {
            let result = ledger.trigger_reactors(&owner, &ticket.ids).await;
            let _ = tx.send(LedgerCompletion::Trigger(ticket, result)).await;
        });
    }

    fn spawn_leaderboard(&self, round: u32) {
        let ledger = Arc::clone(&self.ledger);
        let tx = self.completions_tx.clone();
        let limit = self.config.leaderboard_size;
        self.context.spawn("ledger-leaderboard", async move {
            let result = build_leaderboard(ledger.as_ref(), limit).await;
            let _ = tx.send(LedgerCompletion::Leaderboard(round, result)).await;
        });
    }

    fn forward_reports(&mut self) {
        for failure in self.engine.drain_failures() {
            self.notify(SessionNotice::DeployFailed(failure));
        }
        for confirmation in self.engine.drain_confirmations() {
            self.notify(SessionNotice::DeployConfirmed(confirmation));
        }
    }

    fn notify(&self, notice: SessionNotice) {
        if let Err(err) = self.notices_tx.try_send(notice) {
            debug!(%err, "notice dropped");
        }
    }

    fn publish_display(&self) {
        let next = self.engine.display(self.view);
        self.display_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
