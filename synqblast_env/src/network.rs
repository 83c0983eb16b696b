//! Pub/sub transport abstraction for game sessions.

use crate::error::EnvError;
use crate::types::{EventEnvelope, PeerId};
use async_trait::async_trait;

/// Abstraction over the real-time pub/sub channel that mirrors the
/// replicated model between peers.
///
/// # Delivery
///
/// At-most-once, no ordering guarantee across publishers. A publisher does
/// not receive its own envelopes back; sessions apply their own commands
/// locally before publishing.
///
/// ```text
/// Peer A                    Channel                    Peer B
///   |                          |                          |
///   |-- publish(envelope) ---->|                          |
///   |                          |-- [latency/loss] ------->|
///   |                          |                          |-- recv() -> envelope
/// ```
#[async_trait]
pub trait PubSubTransport: Send + Sync + 'static {
    /// Publishes an envelope to every other subscribed peer.
    ///
    /// Returns the number of peers the envelope was handed to. Success does
    /// not guarantee delivery.
    async fn publish(&self, envelope: EventEnvelope) -> Result<usize, EnvError>;

    /// Receives the next envelope addressed to this peer.
    ///
    /// Returns `None` once the channel is closed.
    async fn recv(&self) -> Option<(PeerId, EventEnvelope)>;

    /// Returns this peer's ID.
    fn local_id(&self) -> PeerId;
}

/// Fault injection for simulated channels.
pub trait NetworkController: Send + Sync {
    /// Creates a partition between two peer sets.
    fn partition(&self, group_a: &[PeerId], group_b: &[PeerId]);

    /// Heals all partitions.
    fn heal_all(&self);

    /// Sets latency for a specific link.
    fn set_link_latency(&self, from: PeerId, to: PeerId, latency_ms: u64);

    /// Sets loss probability for a link (0.0 - 1.0).
    fn set_link_loss(&self, from: PeerId, to: PeerId, loss_rate: f64);
}
