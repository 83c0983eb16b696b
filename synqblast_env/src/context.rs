//! Core environment context trait for game sessions.

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The central interface for environment interaction.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, `OsRng`
/// - **Simulation**: `SimContext` - virtual clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// Everything that would normally introduce non-determinism (wall clock,
/// key generation) is owned by the implementation.
#[async_trait]
pub trait SynqContext: Send + Sync + 'static {
    /// Monotonic time since context creation.
    ///
    /// Drives the session's tick and cross-check timers.
    fn now(&self) -> Duration;

    /// Wall-clock time. The phase clock is derived from this.
    fn system_time(&self) -> SystemTime;

    /// Wall-clock time as milliseconds since the Unix epoch.
    fn unix_millis(&self) -> u64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task (ledger calls run here).
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Derives a signing key from the context seed and `seed_extension`.
    ///
    /// Player addresses in the harness come from these keys, so the same
    /// seed always produces the same players.
    fn derive_signing_key(&self, seed_extension: u64) -> SigningKey;
}
