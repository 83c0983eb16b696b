//! Simulated pub/sub channel with fault injection.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use synqblast_env::{EnvError, EventEnvelope, NetworkController, PeerId, PubSubTransport};
use tokio::sync::mpsc;

/// Simulated channel endpoint for one peer.
pub struct SimPubSub {
    /// This peer's ID
    local_id: PeerId,

    /// Sender to central router
    tx: mpsc::Sender<NetworkMessage>,

    /// Receiver for delivered envelopes (behind tokio mutex for async)
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<(PeerId, EventEnvelope)>>>,

    /// Peers subscribed to the channel, this one included
    subscribers: Arc<AtomicUsize>,
}

/// Internal message to the router: one publish, fanned out later.
#[derive(Debug, Clone)]
pub struct NetworkMessage {
    pub from: PeerId,
    pub envelope: EventEnvelope,
}

impl SimPubSub {
    /// Creates a new simulated endpoint.
    pub fn new(
        local_id: PeerId,
        tx: mpsc::Sender<NetworkMessage>,
        rx: mpsc::Receiver<(PeerId, EventEnvelope)>,
        subscribers: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            local_id,
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            subscribers,
        }
    }

    /// Creates a stub endpoint with nobody else on the channel.
    pub fn new_stub(local_id: PeerId) -> Self {
        let (tx, _) = mpsc::channel(1);
        let (_, rx) = mpsc::channel(1);
        Self {
            local_id,
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            subscribers: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// Takes one delivered envelope without waiting.
    ///
    /// Used by the synchronous world loop; sessions use `recv()`.
    pub fn try_recv(&self) -> Option<(PeerId, EventEnvelope)> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }
}

#[async_trait]
impl PubSubTransport for SimPubSub {
    async fn publish(&self, envelope: EventEnvelope) -> Result<usize, EnvError> {
        let msg = NetworkMessage {
            from: self.local_id,
            envelope,
        };

        self.tx
            .send(msg)
            .await
            .map_err(|_| EnvError::network("router closed"))?;
        Ok(self.subscribers.load(Ordering::Relaxed).saturating_sub(1))
    }

    async fn recv(&self) -> Option<(PeerId, EventEnvelope)> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    fn local_id(&self) -> PeerId {
        self.local_id
    }
}

/// Network controller for fault injection.
pub struct SimNetworkController {
    /// Per-link latency in milliseconds
    link_latency: Arc<Mutex<HashMap<(PeerId, PeerId), u64>>>,

    /// Per-link packet loss rate (0.0 - 1.0)
    link_loss: Arc<Mutex<HashMap<(PeerId, PeerId), f64>>>,

    /// Active partitions (peers that cannot communicate)
    partitions: Arc<Mutex<Vec<(Vec<PeerId>, Vec<PeerId>)>>>,
}

impl SimNetworkController {
    /// Creates a new network controller.
    pub fn new() -> Self {
        Self {
            link_latency: Arc::new(Mutex::new(HashMap::new())),
            link_loss: Arc::new(Mutex::new(HashMap::new())),
            partitions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Checks if two peers can communicate (not partitioned).
    pub fn can_communicate(&self, from: PeerId, to: PeerId) -> bool {
        let partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);

        !partitions.iter().any(|(group_a, group_b)| {
            let from_in_a = group_a.contains(&from);
            let from_in_b = group_b.contains(&from);
            let to_in_a = group_a.contains(&to);
            let to_in_b = group_b.contains(&to);

            (from_in_a && to_in_b) || (from_in_b && to_in_a)
        })
    }

    /// Returns true while any partition is active.
    pub fn is_partitioned(&self) -> bool {
        !self.partitions.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    /// Gets the latency override for a link, if any.
    pub fn get_latency(&self, from: PeerId, to: PeerId) -> Option<u64> {
        let latencies = self.link_latency.lock().unwrap_or_else(PoisonError::into_inner);
        latencies.get(&(from, to)).copied()
    }

    /// Gets the loss override for a link, if any.
    pub fn get_loss(&self, from: PeerId, to: PeerId) -> Option<f64> {
        let losses = self.link_loss.lock().unwrap_or_else(PoisonError::into_inner);
        losses.get(&(from, to)).copied()
    }
}

impl NetworkController for SimNetworkController {
    fn partition(&self, group_a: &[PeerId], group_b: &[PeerId]) {
        let mut partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        partitions.push((group_a.to_vec(), group_b.to_vec()));
    }

    fn heal_all(&self) {
        let mut partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        partitions.clear();
    }

    fn set_link_latency(&self, from: PeerId, to: PeerId, latency_ms: u64) {
        let mut latencies = self.link_latency.lock().unwrap_or_else(PoisonError::into_inner);
        latencies.insert((from, to), latency_ms);
    }

    fn set_link_loss(&self, from: PeerId, to: PeerId, loss_rate: f64) {
        let mut losses = self.link_loss.lock().unwrap_or_else(PoisonError::into_inner);
        losses.insert((from, to), loss_rate.clamp(0.0, 1.0));
    }
}

impl Default for SimNetworkController {
    fn default() -> Self {
        Self::new()
    }
}
