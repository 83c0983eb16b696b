//! Common types for the environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The only pub/sub channel a game session publishes on.
pub const GAME_CHANNEL: &str = "game";

/// Unique identifier for a connected peer (one per session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Creates a new random PeerId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic PeerId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 chars are enough to tell peers apart in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Envelope for events carried over the pub/sub channel.
///
/// The payload is opaque to the transport; the receiving session decodes
/// it into a game command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Channel the event was published on
    pub channel: String,

    /// Encoded command bytes
    pub payload: Vec<u8>,

    /// Publisher's wall clock at publish time
    pub timestamp_ms: u64,

    /// Relay count, incremented by forwarding transports
    pub hop_count: u8,
}

impl EventEnvelope {
    /// Creates an envelope on the game channel.
    pub fn new(payload: Vec<u8>, timestamp_ms: u64) -> Self {
        Self {
            channel: GAME_CHANNEL.to_string(),
            payload,
            timestamp_ms,
            hop_count: 0,
        }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_game_event(&self) -> bool {
        self.channel == GAME_CHANNEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_from_seed_is_stable() {
        assert_eq!(PeerId::from_seed(7), PeerId::from_seed(7));
        assert_ne!(PeerId::from_seed(7), PeerId::from_seed(8));
        assert_eq!(PeerId::from_seed(7).to_string().len(), 8);
    }

    #[test]
    fn test_envelope_defaults_to_game_channel() {
        let envelope = EventEnvelope::new(vec![1, 2, 3], 42);
        assert!(envelope.is_game_event());
        assert_eq!(envelope.size(), 3);
        assert_eq!(envelope.hop_count, 0);
    }
}
