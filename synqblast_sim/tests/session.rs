//! The production session loop running on the simulated clock, channel and ledger.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use synqblast_core::{
    ActionError, Address, Cell, EnergyLevel, GameSession, Phase, SessionNotice, SyncConfig, UserIntent,
};
use synqblast_env::PeerId;
use synqblast_sim::{SimContext, SimLedger, SimPubSub};
use tokio::sync::mpsc;

struct Harness {
    context: Arc<SimContext>,
    ledger: Arc<SimLedger>,
    network: Arc<SimPubSub>,
    // Kept alive so the session's channel stays open
    _router: mpsc::Receiver<synqblast_sim::NetworkMessage>,
    _inbox: mpsc::Sender<(PeerId, synqblast_env::EventEnvelope)>,
}

fn harness(start: Duration) -> Harness {
    let config = SyncConfig::default();
    let context = SimContext::shared(11);
    context.set_time(start);
    let ledger = Arc::new(SimLedger::new(
        Arc::clone(&context),
        config.schedule,
        config.board_size,
    ));

    let (router_tx, router_rx) = mpsc::channel(64);
    let (inbox_tx, inbox_rx) = mpsc::channel(64);
    let network = Arc::new(SimPubSub::new(
        PeerId::from_seed(0),
        router_tx,
        inbox_rx,
        Arc::new(AtomicUsize::new(1)),
    ));

    Harness {
        context,
        ledger,
        network,
        _router: router_rx,
        _inbox: inbox_tx,
    }
}

#[tokio::test]
async fn test_session_deploy_is_confirmed() {
    let h = harness(Duration::ZERO);
    let player = Address::derive(h.context.as_ref(), 0);
    let (mut session, mut handle) = GameSession::new(
        Arc::clone(&h.context),
        Arc::clone(&h.network),
        Arc::clone(&h.ledger),
        SyncConfig::default(),
        player.clone(),
    )
    .unwrap();

    let driver = async {
        handle
            .intents
            .send(UserIntent::Deploy {
                x: 4,
                y: 7,
                energy: EnergyLevel::High,
            })
            .await
            .unwrap();

        let confirmed = loop {
            match handle.notices.recv().await {
                Some(SessionNotice::DeployConfirmed(confirmation)) => break confirmation,
                Some(SessionNotice::DeployFailed(failure)) => panic!("deploy failed: {}", failure.reason),
                Some(_) => continue,
                None => panic!("session ended early"),
            }
        };
        let shown = handle.display.borrow().clone();
        handle.shutdown();
        (confirmed, shown)
    };

    let ((), (confirmed, shown)) = tokio::join!(session.run(), driver);

    assert_eq!(confirmed.cell, Cell::new(4, 7));
    assert_eq!(confirmed.round, 1);
    assert_eq!(shown.reactors.len(), 1);
    assert_eq!(shown.reactors[0].owner, player);
    assert!(shown.provisional.is_empty());
    assert_eq!(h.ledger.reactor_count(), 1);
    assert_eq!(session.engine().stats().confirmations, 1);
    assert_eq!(session.model().reactor_count(), 1);
}

#[tokio::test]
async fn test_session_rejects_deploy_outside_phase() {
    // 130s into round 1 is the trigger phase
    let h = harness(Duration::from_secs(130));
    let player = Address::derive(h.context.as_ref(), 0);
    let (mut session, mut handle) = GameSession::new(
        Arc::clone(&h.context),
        Arc::clone(&h.network),
        Arc::clone(&h.ledger),
        SyncConfig::default(),
        player,
    )
    .unwrap();

    let driver = async {
        handle
            .intents
            .send(UserIntent::Deploy {
                x: 1,
                y: 1,
                energy: EnergyLevel::Low,
            })
            .await
            .unwrap();

        let rejected = loop {
            match handle.notices.recv().await {
                Some(SessionNotice::ActionRejected(err)) => break err,
                Some(_) => continue,
                None => panic!("session ended early"),
            }
        };
        handle.shutdown();
        rejected
    };

    let ((), rejected) = tokio::join!(session.run(), driver);

    assert_eq!(rejected, ActionError::wrong_phase(Phase::Deploy, Phase::Trigger));
    assert_eq!(h.ledger.reactor_count(), 0);
    assert_eq!(session.engine().provisional_count(), 0);
}
