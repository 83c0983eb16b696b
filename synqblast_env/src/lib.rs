//! Synqblast Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the round-sync engines
//! run unchanged in **Production** (tokio, wall clock) and in the
//! **Simulation** harness (virtual clock, seeded entropy).
//!
//! # Core Concept: The Reactor Pattern
//!
//! Every source of non-determinism a game session touches is intercepted:
//! - Time (`now()`, `unix_millis()`, `sleep()`)
//! - Pub/Sub (`publish()`, `recv()`)
//! - Identity (`derive_signing_key()`)
//!
//! Deriving all of it from one 64-bit seed makes a failing run
//! reproducible from its seed number.
//!
//! # Example
//!
//! ```ignore
//! use synqblast_env::{SynqContext, PubSubTransport};
//!
//! async fn session_loop<Ctx: SynqContext, Net: PubSubTransport>(
//!     ctx: &Ctx,
//!     net: &Net,
//! ) {
//!     loop {
//!         tokio::select! {
//!             envelope = net.recv() => apply(envelope),
//!             _ = ctx.sleep(Duration::from_secs(1)) => tick(ctx.unix_millis()),
//!         }
//!     }
//! }
//! ```

mod context;
mod error;
mod network;
mod tokio_impl;
mod types;

pub use context::SynqContext;
pub use error::EnvError;
pub use network::{NetworkController, PubSubTransport};
pub use tokio_impl::TokioContext;
pub use types::{EventEnvelope, PeerId, GAME_CHANNEL};
