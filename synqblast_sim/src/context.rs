//! Simulation context implementing SynqContext for deterministic testing.

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use synqblast_env::SynqContext;

/// 2024-06-01 00:00:00 UTC. Virtual time zero is the start of round 1.
pub const SIM_EPOCH_SECS: u64 = 1_717_200_000;

/// Simulation context backed by a virtual clock.
///
/// This implements `SynqContext` using:
/// - A virtual clock that only moves when advanced (or slept on)
/// - A seeded ChaCha8 RNG for deterministic key generation
/// - An epoch pinned to a UTC midnight, so round numbers are predictable
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: SystemTime,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(SIM_EPOCH_SECS),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.virtual_time_ns.lock().unwrap_or_else(PoisonError::into_inner);
        *time += duration.as_nanos() as u64;
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, offset: Duration) {
        let mut time = self.virtual_time_ns.lock().unwrap_or_else(PoisonError::into_inner);
        *time = offset.as_nanos() as u64;
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.virtual_time_ns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Virtual milliseconds since the epoch, i.e. since the start of round 1.
    pub fn offset_ms(&self) -> u64 {
        self.time_ns() / 1_000_000
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl SynqContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        // Jump the clock, then let every other ready task run against it
        self.advance_time(duration);
        tokio::task::yield_now().await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::trace!(task = name, "spawning sim task");
        tokio::spawn(future);
    }

    fn derive_signing_key(&self, seed_extension: u64) -> SigningKey {
        let combined_seed = self.seed.wrapping_mul(0x517cc1b727220a95) ^ seed_extension;
        let mut key_rng = ChaCha8Rng::seed_from_u64(combined_seed);
        SigningKey::generate(&mut key_rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synqblast_core::{compute_round_info_at, Phase};

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
        assert_eq!(ctx.offset_ms(), 1500);
    }

    #[test]
    fn test_epoch_is_start_of_round_one() {
        let ctx = SimContext::new(1);
        let info = compute_round_info_at(ctx.unix_millis());
        assert_eq!(info.round_number, 1);
        assert_eq!(info.phase, Phase::Deploy);
        assert_eq!(info.phase_time_remaining, 120);

        ctx.set_time(Duration::from_secs(125));
        let info = compute_round_info_at(ctx.unix_millis());
        assert_eq!(info.phase, Phase::Trigger);
        assert_eq!(info.phase_time_remaining, 115);
    }

    #[test]
    fn test_sim_context_deterministic_keys() {
        let ctx1 = SimContext::new(42);
        let ctx2 = SimContext::new(42);

        let key1 = ctx1.derive_signing_key(1);
        let key2 = ctx2.derive_signing_key(1);
        assert_eq!(key1.to_bytes(), key2.to_bytes());

        let key3 = ctx1.derive_signing_key(2);
        assert_ne!(key1.to_bytes(), key3.to_bytes());
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));
        assert_eq!(ctx1.now(), ctx2.now());
    }

    #[tokio::test]
    async fn test_sleep_advances_virtual_clock() {
        let ctx = SimContext::new(7);
        ctx.sleep(Duration::from_secs(3)).await;
        assert_eq!(ctx.now(), Duration::from_secs(3));
    }
}
