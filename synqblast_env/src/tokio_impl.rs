//! Production implementation of SynqContext using Tokio.

use crate::SynqContext;
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Production context backed by Tokio and OS entropy.
///
/// The monotonic clock uses `tokio::time::Instant` so paused-time tests
/// drive the session timers.
pub struct TokioContext {
    start: Instant,
}

impl TokioContext {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynqContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::trace!(task = name, "spawning");
        tokio::spawn(future);
    }

    fn derive_signing_key(&self, _seed_extension: u64) -> SigningKey {
        use rand::rngs::OsRng;
        SigningKey::generate(&mut OsRng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_tokio_context_unix_millis() {
        let ctx = TokioContext::new();
        // Any date after 2024-01-01
        assert!(ctx.unix_millis() > 1_704_067_200_000);
    }

    #[tokio::test]
    async fn test_tokio_context_keys_are_random() {
        let ctx = TokioContext::new();
        let key1 = ctx.derive_signing_key(1);
        let key2 = ctx.derive_signing_key(1);

        assert_ne!(key1.to_bytes(), key2.to_bytes());
    }
}
